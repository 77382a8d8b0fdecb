pub mod board;
pub mod config;
pub mod error;
pub mod game;
pub mod oracle;
pub mod types;
pub mod wasm;

pub use board::{Board, Placement};
pub use config::{GameConfig, OracleConfig};
pub use error::{EngineError, GameError, MoveSourceError};
pub use game::{CpuMove, Game, MoveOrigin, Phase};
pub use oracle::{MoveRequest, MoveSource, Suggestion};
pub use types::{Cell, GameResult, GameState, Outcome, Position, Side};
