use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;
use crate::types::{BOARD_WIDTH, Cell, NUM_SQUARES, Position, Side};

const DIRECTIONS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Reversi board state represented by two bitboards.
///
/// The masks never overlap, so every square holds exactly one of
/// empty, black or white.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    black: u64,
    white: u64,
}

/// A board produced by a legal move, together with the stones it turned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub board: Board,
    pub flips: u64,
}

impl Placement {
    /// Flipped squares as row-major indices, ascending.
    pub fn flipped_indices(&self) -> Vec<u8> {
        bitmask_to_indices(self.flips)
    }
}

impl Board {
    /// Creates the initial board:
    /// d4=white, e4=black, d5=black, e5=white.
    pub fn new() -> Self {
        Self {
            black: bit(28) | bit(35),
            white: bit(27) | bit(36),
        }
    }

    pub fn from_bitboards(black: u64, white: u64) -> Result<Self, EngineError> {
        let overlap = black & white;
        if overlap != 0 {
            return Err(EngineError::OverlappingStones(overlap));
        }
        Ok(Self { black, white })
    }

    /// Stone mask of one side.
    pub fn stones(&self, side: Side) -> u64 {
        match side {
            Side::Black => self.black,
            Side::White => self.white,
        }
    }

    pub fn cell(&self, pos: Position) -> Option<Cell> {
        pos.index().map(|idx| self.cell_at(idx))
    }

    /// True iff the square is empty and at least one direction brackets
    /// a run of opponent stones. Off-board coordinates are never legal.
    pub fn is_valid_move(&self, pos: Position, side: Side) -> bool {
        let Some(idx) = pos.index() else {
            return false;
        };
        let (me, opp) = self.split(side);
        Self::collect_flips(idx, me, opp) != 0
    }

    /// Returns legal move mask for the given side.
    pub fn legal_moves(&self, side: Side) -> u64 {
        let (me, opp) = self.split(side);
        let occupied = me | opp;
        let mut legal = 0u64;

        for pos in 0..NUM_SQUARES {
            let move_bit = bit(pos);
            if (occupied & move_bit) != 0 {
                continue;
            }
            if Self::collect_flips(pos, me, opp) != 0 {
                legal |= move_bit;
            }
        }

        legal
    }

    /// Legal moves in row-major order.
    pub fn legal_positions(&self, side: Side) -> Vec<Position> {
        bitmask_to_indices(self.legal_moves(side))
            .into_iter()
            .map(|idx| Position::from_index(idx as usize))
            .collect()
    }

    /// Row-major scan that stops at the first legal move.
    pub fn has_any_valid_move(&self, side: Side) -> bool {
        let (me, opp) = self.split(side);
        (0..NUM_SQUARES).any(|pos| Self::collect_flips(pos, me, opp) != 0)
    }

    /// Places one stone and flips every bracketed run.
    ///
    /// Flips are computed from `self` before anything changes; the receiver
    /// is left untouched and the new position is returned.
    pub fn apply_move(&self, pos: Position, side: Side) -> Result<Placement, EngineError> {
        let idx = pos.index().ok_or(EngineError::OutOfRange(pos))?;
        let (me, opp) = self.split(side);

        let flips = Self::collect_flips(idx, me, opp);
        if flips == 0 {
            return Err(EngineError::IllegalMove {
                position: pos,
                side,
            });
        }

        let next_me = me | bit(idx) | flips;
        let next_opp = opp & !flips;
        let board = match side {
            Side::Black => Self {
                black: next_me,
                white: next_opp,
            },
            Side::White => Self {
                black: next_opp,
                white: next_me,
            },
        };

        Ok(Placement { board, flips })
    }

    /// Returns `(black_count, white_count)`.
    pub fn count(&self) -> (u8, u8) {
        (self.black.count_ones() as u8, self.white.count_ones() as u8)
    }

    pub fn count_pieces(&self, side: Side) -> u8 {
        self.stones(side).count_ones() as u8
    }

    /// Returns the number of empty squares.
    pub fn empty_count(&self) -> u8 {
        let (black_count, white_count) = self.count();
        NUM_SQUARES as u8 - black_count - white_count
    }

    pub fn is_full(&self) -> bool {
        self.empty_count() == 0
    }

    /// Neither side can move. A full board short-circuits the scan.
    pub fn is_terminal(&self) -> bool {
        self.is_full()
            || (!self.has_any_valid_move(Side::Black) && !self.has_any_valid_move(Side::White))
    }

    /// Same position with every stone's color exchanged.
    pub fn swap_colors(&self) -> Self {
        Self {
            black: self.white,
            white: self.black,
        }
    }

    /// Converts board to `[u8; 64]` where 0=empty, 1=black, 2=white.
    pub fn to_array(&self) -> [u8; NUM_SQUARES] {
        let mut board = [0u8; NUM_SQUARES];
        for (pos, cell) in board.iter_mut().enumerate() {
            *cell = self.cell_at(pos).code();
        }
        board
    }

    /// Eight newline-terminated rows of `B`, `W` and `.`.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(NUM_SQUARES + BOARD_WIDTH);
        for pos in 0..NUM_SQUARES {
            out.push(self.cell_at(pos).letter());
            if pos % BOARD_WIDTH == BOARD_WIDTH - 1 {
                out.push('\n');
            }
        }
        out
    }

    fn cell_at(&self, pos: usize) -> Cell {
        let square = bit(pos);
        if (self.black & square) != 0 {
            Cell::Black
        } else if (self.white & square) != 0 {
            Cell::White
        } else {
            Cell::Empty
        }
    }

    fn split(&self, side: Side) -> (u64, u64) {
        match side {
            Side::Black => (self.black, self.white),
            Side::White => (self.white, self.black),
        }
    }

    fn collect_flips(pos: usize, me: u64, opp: u64) -> u64 {
        if pos >= NUM_SQUARES {
            return 0;
        }

        let move_bit = bit(pos);
        if ((me | opp) & move_bit) != 0 {
            return 0;
        }

        let (row, col) = pos_to_row_col(pos);
        let mut flips = 0u64;

        for (dr, dc) in DIRECTIONS {
            let mut r = row + dr;
            let mut c = col + dc;
            let mut line = 0u64;

            while in_bounds(r, c) {
                let square = bit((r as usize) * BOARD_WIDTH + c as usize);
                if (opp & square) != 0 {
                    line |= square;
                } else {
                    // Bracketed only when at least one opponent stone came first.
                    if (me & square) != 0 {
                        flips |= line;
                    }
                    break;
                }

                r += dr;
                c += dc;
            }
        }

        flips
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Board {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rows: Vec<&str> = s
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if rows.len() != BOARD_WIDTH {
            return Err(EngineError::Parse(format!(
                "expected {BOARD_WIDTH} rows, got {}",
                rows.len()
            )));
        }

        let mut black = 0u64;
        let mut white = 0u64;
        for (row, line) in rows.iter().enumerate() {
            let cells: Vec<char> = line.chars().collect();
            if cells.len() != BOARD_WIDTH {
                return Err(EngineError::Parse(format!(
                    "row {row}: expected {BOARD_WIDTH} cells, got {}",
                    cells.len()
                )));
            }
            for (col, letter) in cells.into_iter().enumerate() {
                let square = bit(row * BOARD_WIDTH + col);
                match Cell::from_letter(letter) {
                    Some(Cell::Black) => black |= square,
                    Some(Cell::White) => white |= square,
                    Some(Cell::Empty) => {}
                    None => {
                        return Err(EngineError::Parse(format!(
                            "row {row}, col {col}: unexpected {letter:?}"
                        )));
                    }
                }
            }
        }

        Self::from_bitboards(black, white)
    }
}

pub(crate) fn bitmask_to_indices(mask: u64) -> Vec<u8> {
    let mut bits = mask;
    let mut out = Vec::new();

    while bits != 0 {
        let idx = bits.trailing_zeros() as u8;
        out.push(idx);
        bits &= bits - 1;
    }

    out
}

fn bit(pos: usize) -> u64 {
    if pos < NUM_SQUARES { 1u64 << pos } else { 0 }
}

fn pos_to_row_col(pos: usize) -> (i32, i32) {
    ((pos / BOARD_WIDTH) as i32, (pos % BOARD_WIDTH) as i32)
}

fn in_bounds(row: i32, col: i32) -> bool {
    (0..BOARD_WIDTH as i32).contains(&row) && (0..BOARD_WIDTH as i32).contains(&col)
}
