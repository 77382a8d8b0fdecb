use thiserror::Error;

use crate::types::{Position, Side};

/// Errors raised by the board engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("position {0} is off the board")]
    OutOfRange(Position),

    #[error("illegal move at {position} for {side}")]
    IllegalMove { position: Position, side: Side },

    /// A square cannot hold both colors.
    #[error("black and white masks overlap: {0:#018x}")]
    OverlappingStones(u64),

    #[error("cannot parse grid text: {0}")]
    Parse(String),
}

/// Rejections from the turn controller. None of them changes game state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("illegal move at ({row}, {col})")]
    InvalidMoveRejected { row: u8, col: u8 },

    #[error("game is already over")]
    GameOver,

    #[error("it is not {0}'s turn")]
    NotYourTurn(Side),

    #[error("waiting for the automated side's move")]
    AwaitingOracle,

    #[error("no automated move request is outstanding")]
    NoPendingRequest,

    /// The request belongs to a game that has since been reset.
    #[error("stale move request from generation {requested} (current {current})")]
    StaleRequest { requested: u64, current: u64 },

    /// Another request was issued after this one in the same game.
    #[error("move request {requested} was superseded by request {current}")]
    SupersededRequest { requested: u64, current: u64 },

    #[error("{0} has no legal move to fall back on")]
    NoLegalMove(Side),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Failures of the external move source. Always recovered by the random fallback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoveSourceError {
    #[error("move source unavailable: {0}")]
    Unavailable(String),

    #[error("move source timed out after {0} ms")]
    Timeout(u64),

    #[error("malformed move source response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for MoveSourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MoveSourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
