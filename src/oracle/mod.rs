pub mod llm;
pub mod parse;
pub mod prompt;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};
use web_time::Instant;

use crate::error::MoveSourceError;
use crate::types::{Position, Side};

/// Everything the automated side is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRequest {
    pub generation: u64,
    /// Unique within a game; a reply is only accepted for the newest request.
    pub request_id: u64,
    pub side: Side,
    /// Eight rows of `B`, `W` and `.`.
    pub grid: String,
    /// Row-major; never empty.
    pub legal_moves: Vec<Position>,
}

impl MoveRequest {
    pub fn prompt(&self) -> String {
        prompt::render(self)
    }
}

/// A move as reported by the source. Untrusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(deserialize_with = "whole_number")]
    pub row: i64,
    #[serde(deserialize_with = "whole_number")]
    pub col: i64,
}

/// Any JSON number without a fractional part, so `2.0` reads as `2`.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(value) = number.as_i64() {
        return Ok(value);
    }
    match number.as_f64() {
        Some(value) if value.fract() == 0.0 && value.abs() <= i64::MAX as f64 => Ok(value as i64),
        _ => Err(serde::de::Error::custom(format!(
            "expected a whole number, got {number}"
        ))),
    }
}

impl Suggestion {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }

    /// The coordinate when both parts lie on the board.
    pub fn position(&self) -> Option<Position> {
        let row = u8::try_from(self.row).ok()?;
        let col = u8::try_from(self.col).ok()?;
        let pos = Position::new(row, col);
        pos.in_bounds().then_some(pos)
    }
}

#[async_trait(?Send)]
pub trait MoveSource {
    async fn request_move(&self, request: &MoveRequest) -> Result<Suggestion, MoveSourceError>;
}

/// Accepts a suggestion only if it names one of `legal`.
pub fn validate(suggestion: Suggestion, legal: &[Position]) -> Result<Position, MoveSourceError> {
    let pos = suggestion.position().ok_or_else(|| {
        MoveSourceError::Malformed(format!(
            "({}, {}) is off the board",
            suggestion.row, suggestion.col
        ))
    })?;
    if !legal.contains(&pos) {
        return Err(MoveSourceError::Malformed(format!(
            "{pos} is not a legal move"
        )));
    }
    Ok(pos)
}

/// Asks `source` and gives up after `timeout`.
///
/// Natively the pending request is dropped when the deadline passes. In the
/// browser the host's fetch runs to completion and a late answer is
/// reported as a timeout.
pub async fn ask<S: MoveSource + ?Sized>(
    source: &S,
    request: &MoveRequest,
    timeout: Duration,
) -> Result<Suggestion, MoveSourceError> {
    let started = Instant::now();
    let timeout_ms = timeout.as_millis() as u64;

    #[cfg(not(target_arch = "wasm32"))]
    let reply = tokio::time::timeout(timeout, source.request_move(request))
        .await
        .map_err(|_| MoveSourceError::Timeout(timeout_ms))
        .and_then(|reply| reply);

    #[cfg(target_arch = "wasm32")]
    let reply = match source.request_move(request).await {
        Ok(_) if started.elapsed() > timeout => Err(MoveSourceError::Timeout(timeout_ms)),
        other => other,
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &reply {
        Ok(suggestion) => debug!(
            generation = request.generation,
            request_id = request.request_id,
            elapsed_ms,
            row = suggestion.row,
            col = suggestion.col,
            "move source answered"
        ),
        Err(err) => warn!(
            generation = request.generation,
            request_id = request.request_id,
            elapsed_ms,
            %err,
            "move source failed"
        ),
    }
    reply
}
