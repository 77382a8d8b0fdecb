use std::fmt;

use serde::{Deserialize, Serialize};

pub const BOARD_WIDTH: usize = 8;
pub const NUM_SQUARES: usize = BOARD_WIDTH * BOARD_WIDTH;

/// One of the two players. Black moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Black,
    White,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Self::Black => Self::White,
            Self::White => Self::Black,
        }
    }

    /// Single-letter form used in the grid text.
    pub fn letter(self) -> char {
        match self {
            Self::Black => 'B',
            Self::White => 'W',
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Black => f.write_str("black"),
            Self::White => f.write_str("white"),
        }
    }
}

/// Content of a single square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cell {
    Empty,
    Black,
    White,
}

impl Cell {
    /// Presentation code: 0=empty, 1=black, 2=white.
    pub fn code(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Black => 1,
            Self::White => 2,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::Empty => '.',
            Self::Black => 'B',
            Self::White => 'W',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            '.' => Some(Self::Empty),
            'B' => Some(Self::Black),
            'W' => Some(Self::White),
            _ => None,
        }
    }
}

/// A board coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: u8,
    pub col: u8,
}

impl Position {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(self) -> bool {
        (self.row as usize) < BOARD_WIDTH && (self.col as usize) < BOARD_WIDTH
    }

    /// Row-major square index, `None` when off the board.
    pub fn index(self) -> Option<usize> {
        self.in_bounds()
            .then(|| self.row as usize * BOARD_WIDTH + self.col as usize)
    }

    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < NUM_SQUARES);
        Self {
            row: (index / BOARD_WIDTH) as u8,
            col: (index % BOARD_WIDTH) as u8,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Public game state emitted after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameState {
    pub board: Vec<u8>,
    /// `None` once the game is over.
    pub current_player: Option<Side>,
    pub black_count: u8,
    pub white_count: u8,
    pub is_game_over: bool,
    /// Contract:
    /// - `true` when the side that would have moved next had to pass.
    /// - `false` after an ordinary alternation.
    pub is_pass: bool,
    /// Contract:
    /// - Normal move: list of flipped positions (0..=63).
    /// - Fresh game: empty list.
    pub flipped: Vec<u8>,
    pub last_move: Option<Position>,
    pub generation: u64,
    /// `true` while the automated side's request is outstanding.
    pub awaiting_oracle: bool,
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "side", rename_all = "lowercase")]
pub enum Outcome {
    Winner(Side),
    Draw,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Winner(side) => write!(f, "{side} wins"),
            Self::Draw => f.write_str("draw"),
        }
    }
}

/// Final result after game over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameResult {
    pub outcome: Outcome,
    pub black_count: u8,
    pub white_count: u8,
}

impl GameResult {
    /// Winner has strictly more stones; equal counts are a draw.
    pub fn from_counts(black_count: u8, white_count: u8) -> Self {
        let outcome = if black_count > white_count {
            Outcome::Winner(Side::Black)
        } else if white_count > black_count {
            Outcome::Winner(Side::White)
        } else {
            Outcome::Draw
        };
        Self {
            outcome,
            black_count,
            white_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_index_rejects_off_board_coordinates() {
        assert_eq!(Position::new(2, 3).index(), Some(19));
        assert_eq!(Position::new(8, 0).index(), None);
        assert_eq!(Position::new(0, 99).index(), None);
        assert_eq!(Position::from_index(63), Position::new(7, 7));
    }

    #[test]
    fn result_from_counts_reports_strict_winner_or_draw() {
        assert_eq!(
            GameResult::from_counts(40, 24).outcome,
            Outcome::Winner(Side::Black)
        );
        assert_eq!(
            GameResult::from_counts(10, 54).outcome,
            Outcome::Winner(Side::White)
        );
        assert_eq!(GameResult::from_counts(32, 32).outcome, Outcome::Draw);
    }

    #[test]
    fn state_serializes_sides_in_lowercase() {
        let json = serde_json::to_value(Side::White).unwrap();
        assert_eq!(json, serde_json::json!("white"));

        let outcome = serde_json::to_value(Outcome::Winner(Side::Black)).unwrap();
        assert_eq!(outcome, serde_json::json!({"kind": "winner", "side": "black"}));
    }
}
