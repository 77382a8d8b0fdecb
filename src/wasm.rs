use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::prelude::*;

use crate::config::GameConfig;
use crate::error::MoveSourceError;
use crate::game::{CpuMove, Game, MoveOrigin};
use crate::oracle::llm::{ChatRequest, suggestion_from_body};
use crate::types::{Position, Side};

#[derive(Serialize)]
struct CpuTurnRequest {
    generation: u64,
    request_id: u64,
    side: Side,
    grid: String,
    legal_moves: Vec<Position>,
    url: String,
    body: ChatRequest,
    think_delay_ms: u64,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct CpuTurnOutcome {
    position: Position,
    fallback_reason: Option<String>,
}

impl From<CpuMove> for CpuTurnOutcome {
    fn from(mv: CpuMove) -> Self {
        Self {
            position: mv.position,
            fallback_reason: match mv.origin {
                MoveOrigin::Oracle => None,
                MoveOrigin::Fallback { reason } => Some(reason.to_string()),
            },
        }
    }
}

/// Browser handle. The page performs the completions fetch itself
/// between `beginCpuTurn` and `resolveCpuTurn`.
#[wasm_bindgen]
pub struct WasmGame {
    game: Game,
}

#[wasm_bindgen]
impl WasmGame {
    /// `config` may be `undefined`; `seed` fixes the fallback choices.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, seed: Option<u32>) -> Result<WasmGame, JsError> {
        let config: GameConfig = if config.is_undefined() || config.is_null() {
            GameConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        let game = match seed {
            Some(seed) => Game::with_seed(config, seed.into()),
            None => Game::new(config),
        };
        Ok(Self { game })
    }

    pub fn state(&self) -> Result<JsValue, JsError> {
        to_js(&self.game.state())
    }

    #[wasm_bindgen(js_name = legalMoves)]
    pub fn legal_moves(&self) -> Result<JsValue, JsError> {
        to_js(&self.game.legal_moves())
    }

    /// Result of a finished game, `null` while it is running.
    pub fn result(&self) -> Result<JsValue, JsError> {
        to_js(&self.game.result())
    }

    pub fn place(&mut self, row: u8, col: u8) -> Result<JsValue, JsError> {
        self.game.propose_move(row, col)?;
        self.state()
    }

    pub fn reset(&mut self) -> Result<JsValue, JsError> {
        self.game.reset();
        self.state()
    }

    #[wasm_bindgen(js_name = beginCpuTurn)]
    pub fn begin_cpu_turn(&mut self) -> Result<JsValue, JsError> {
        let request = self.game.begin_cpu_turn()?;
        let config = self.game.config();
        let payload = CpuTurnRequest {
            url: config.oracle.completions_url(),
            body: ChatRequest::for_move(&config.oracle, &request),
            think_delay_ms: config.think_delay_ms,
            timeout_ms: config.oracle.timeout_ms,
            generation: request.generation,
            request_id: request.request_id,
            side: request.side,
            grid: request.grid,
            legal_moves: request.legal_moves,
        };
        to_js(&payload)
    }

    /// `body` is the raw completions response, or `undefined` when the
    /// fetch failed or timed out. The ids come from `beginCpuTurn`.
    #[wasm_bindgen(js_name = resolveCpuTurn)]
    pub fn resolve_cpu_turn(
        &mut self,
        generation: f64,
        request_id: f64,
        body: Option<String>,
    ) -> Result<JsValue, JsError> {
        let reply = match body {
            Some(body) => suggestion_from_body(&body),
            None => Err(MoveSourceError::Unavailable("fetch failed".to_string())),
        };
        let mv = self.game.resolve_request(generation as u64, request_id as u64, reply)?;
        to_js(&CpuTurnOutcome::from(mv))
    }
}

#[wasm_bindgen]
pub fn wasm_ready() -> bool {
    true
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsError> {
    Ok(value.serialize(&Serializer::json_compatible())?)
}
