use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument, warn};

use crate::board::Board;
use crate::config::GameConfig;
use crate::error::{GameError, MoveSourceError};
use crate::oracle::{self, MoveRequest, MoveSource, Suggestion};
use crate::types::{GameResult, GameState, Position, Side};

/// Where the turn currently stands. A pass is resolved on the spot and
/// only remembered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingMove(Side),
    Terminal,
}

/// Why the automated side's stone went where it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOrigin {
    Oracle,
    Fallback { reason: MoveSourceError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuMove {
    pub position: Position,
    pub origin: MoveOrigin,
}

/// Outstanding automated-side request. While it exists no other move is accepted.
#[derive(Debug, Clone)]
struct PendingRequest {
    request_id: u64,
    side: Side,
    legal: Vec<Position>,
}

/// Turn controller: sequences moves, passes and the end of the game.
#[derive(Debug)]
pub struct Game {
    board: Board,
    phase: Phase,
    config: GameConfig,
    last_passed: Option<Side>,
    last_move: Option<Position>,
    flipped: Vec<u8>,
    generation: u64,
    next_request_id: u64,
    pending: Option<PendingRequest>,
    rng: ChaCha8Rng,
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        Self::from_rng(config, ChaCha8Rng::from_entropy())
    }

    /// Deterministic fallback choices for a given seed.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::from_rng(config, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Starts from an arbitrary position with `to_move` on turn. If that
    /// side cannot move it passes immediately.
    pub fn from_position(config: GameConfig, board: Board, to_move: Side, seed: u64) -> Self {
        let mut game = Self::with_seed(config, seed);
        game.board = board;
        game.enter_turn(to_move);
        game
    }

    fn from_rng(config: GameConfig, rng: ChaCha8Rng) -> Self {
        Self {
            board: Board::new(),
            phase: Phase::AwaitingMove(Side::Black),
            config,
            last_passed: None,
            last_move: None,
            flipped: Vec::new(),
            generation: 0,
            next_request_id: 0,
            pending: None,
            rng,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_side(&self) -> Option<Side> {
        match self.phase {
            Phase::AwaitingMove(side) => Some(side),
            Phase::Terminal => None,
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == Phase::Terminal
    }

    pub fn is_awaiting_oracle(&self) -> bool {
        self.pending.is_some()
    }

    /// Side whose last turn was skipped, if the latest transition involved a pass.
    pub fn last_passed(&self) -> Option<Side> {
        self.last_passed
    }

    /// Legal moves of the side on turn; empty once the game is over.
    pub fn legal_moves(&self) -> Vec<Position> {
        self.current_side()
            .map(|side| self.board.legal_positions(side))
            .unwrap_or_default()
    }

    /// Discards the current game and starts over. Any outstanding request
    /// becomes stale.
    pub fn reset(&mut self) {
        self.board = Board::new();
        self.phase = Phase::AwaitingMove(Side::Black);
        self.last_passed = None;
        self.last_move = None;
        self.flipped.clear();
        self.pending = None;
        self.generation += 1;
        info!(generation = self.generation, "game reset");
    }

    /// Human move for the side not played by the move source.
    pub fn propose_move(&mut self, row: u8, col: u8) -> Result<(), GameError> {
        let side = self.side_on_turn()?;
        if self.pending.is_some() {
            return Err(GameError::AwaitingOracle);
        }
        if side == self.config.cpu_side {
            return Err(GameError::NotYourTurn(side.opponent()));
        }

        let pos = Position::new(row, col);
        if !self.board.is_valid_move(pos, side) {
            debug!(%pos, %side, "rejected move");
            return Err(GameError::InvalidMoveRejected { row, col });
        }

        self.commit(pos, side)
    }

    /// Opens an automated turn and closes the gate for every other move
    /// until [`Game::resolve_cpu_turn`] is called.
    pub fn begin_cpu_turn(&mut self) -> Result<MoveRequest, GameError> {
        let side = self.side_on_turn()?;
        if self.pending.is_some() {
            return Err(GameError::AwaitingOracle);
        }
        if side != self.config.cpu_side {
            return Err(GameError::NotYourTurn(self.config.cpu_side));
        }

        let legal = self.board.legal_positions(side);
        debug_assert!(!legal.is_empty(), "side on turn always has a move");

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = MoveRequest {
            generation: self.generation,
            request_id,
            side,
            grid: self.board.to_text(),
            legal_moves: legal.clone(),
        };
        self.pending = Some(PendingRequest {
            request_id,
            side,
            legal,
        });
        debug!(generation = self.generation, request_id, %side, "requested automated move");
        Ok(request)
    }

    /// Completes an automated turn with whatever the source produced.
    ///
    /// A reply to anything but the outstanding request is discarded. An
    /// error or a suggestion outside the legal list captured by
    /// `begin_cpu_turn` falls back to a uniformly random legal move, so the
    /// turn always completes.
    pub fn resolve_cpu_turn(
        &mut self,
        request: &MoveRequest,
        reply: Result<Suggestion, MoveSourceError>,
    ) -> Result<CpuMove, GameError> {
        self.resolve_request(request.generation, request.request_id, reply)
    }

    /// Same as [`Game::resolve_cpu_turn`] for hosts that only kept the ids.
    pub fn resolve_request(
        &mut self,
        generation: u64,
        request_id: u64,
        reply: Result<Suggestion, MoveSourceError>,
    ) -> Result<CpuMove, GameError> {
        if generation != self.generation {
            warn!(
                requested = generation,
                current = self.generation,
                "discarding reply for a reset game"
            );
            return Err(GameError::StaleRequest {
                requested: generation,
                current: self.generation,
            });
        }
        let pending = self.pending.as_ref().ok_or(GameError::NoPendingRequest)?;
        if pending.request_id != request_id {
            warn!(
                requested = request_id,
                current = pending.request_id,
                "discarding late reply to an earlier request"
            );
            return Err(GameError::SupersededRequest {
                requested: request_id,
                current: pending.request_id,
            });
        }

        let (position, origin) = match reply.and_then(|s| oracle::validate(s, &pending.legal)) {
            Ok(position) => (position, MoveOrigin::Oracle),
            Err(reason) => {
                debug_assert!(!pending.legal.is_empty(), "side on turn always has a move");
                let Some(&position) = pending.legal.choose(&mut self.rng) else {
                    return Err(GameError::NoLegalMove(pending.side));
                };
                warn!(%reason, %position, "falling back to a random legal move");
                (position, MoveOrigin::Fallback { reason })
            }
        };

        let side = pending.side;
        self.pending = None;
        self.commit(position, side)?;
        Ok(CpuMove { position, origin })
    }

    /// Runs a whole automated turn against `source`.
    #[instrument(skip_all, fields(generation = self.generation))]
    pub async fn play_cpu_turn<S: MoveSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<CpuMove, GameError> {
        let request = self.begin_cpu_turn()?;
        let reply = oracle::ask(source, &request, self.config.oracle.timeout()).await;
        self.resolve_cpu_turn(&request, reply)
    }

    pub fn state(&self) -> GameState {
        let (black_count, white_count) = self.board.count();
        GameState {
            board: self.board.to_array().to_vec(),
            current_player: self.current_side(),
            black_count,
            white_count,
            is_game_over: self.is_game_over(),
            is_pass: self.last_passed.is_some(),
            flipped: self.flipped.clone(),
            last_move: self.last_move,
            generation: self.generation,
            awaiting_oracle: self.pending.is_some(),
        }
    }

    /// Final counts and winner; `None` while the game is running.
    pub fn result(&self) -> Option<GameResult> {
        if !self.is_game_over() {
            return None;
        }
        let (black_count, white_count) = self.board.count();
        Some(GameResult::from_counts(black_count, white_count))
    }

    fn side_on_turn(&self) -> Result<Side, GameError> {
        self.current_side().ok_or(GameError::GameOver)
    }

    fn commit(&mut self, pos: Position, side: Side) -> Result<(), GameError> {
        let placement = self.board.apply_move(pos, side)?;
        self.board = placement.board;
        self.flipped = placement.flipped_indices();
        self.last_move = Some(pos);
        debug!(%pos, %side, flipped = self.flipped.len(), "applied move");

        self.enter_turn(side.opponent());
        Ok(())
    }

    fn enter_turn(&mut self, side: Side) {
        self.last_passed = None;
        if self.board.is_full() {
            self.finish();
            return;
        }
        if self.board.has_any_valid_move(side) {
            self.phase = Phase::AwaitingMove(side);
            return;
        }

        info!(%side, "no legal move, passing");
        self.last_passed = Some(side);
        let other = side.opponent();
        if self.board.has_any_valid_move(other) {
            self.phase = Phase::AwaitingMove(other);
        } else {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Terminal;
        let (black_count, white_count) = self.board.count();
        let result = GameResult::from_counts(black_count, white_count);
        info!(
            outcome = %result.outcome,
            black_count,
            white_count,
            "game over"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::types::Outcome;

    const FULL_BOARD: u64 = u64::MAX;

    struct Fixed(Suggestion);

    #[async_trait(?Send)]
    impl MoveSource for Fixed {
        async fn request_move(&self, _request: &MoveRequest) -> Result<Suggestion, MoveSourceError> {
            Ok(self.0)
        }
    }

    struct Failing;

    #[async_trait(?Send)]
    impl MoveSource for Failing {
        async fn request_move(&self, _request: &MoveRequest) -> Result<Suggestion, MoveSourceError> {
            Err(MoveSourceError::Unavailable("connection refused".to_string()))
        }
    }

    struct Stalled;

    #[async_trait(?Send)]
    impl MoveSource for Stalled {
        async fn request_move(&self, request: &MoveRequest) -> Result<Suggestion, MoveSourceError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let first = request.legal_moves[0];
            Ok(Suggestion::new(first.row.into(), first.col.into()))
        }
    }

    /// Echoes back a move from the offered list, so it is always legal.
    struct LastOffered;

    #[async_trait(?Send)]
    impl MoveSource for LastOffered {
        async fn request_move(&self, request: &MoveRequest) -> Result<Suggestion, MoveSourceError> {
            let mv = request.legal_moves[request.legal_moves.len() - 1];
            Ok(Suggestion::new(mv.row.into(), mv.col.into()))
        }
    }

    fn bit(row: usize, col: usize) -> u64 {
        1u64 << (row * 8 + col)
    }

    fn cpu_plays(side: Side) -> GameConfig {
        GameConfig {
            cpu_side: side,
            ..GameConfig::default()
        }
    }

    fn fast_timeout(mut config: GameConfig, ms: u64) -> GameConfig {
        config.oracle.timeout_ms = ms;
        config
    }

    #[test]
    fn initial_state_is_correct() {
        let game = Game::with_seed(GameConfig::default(), 1);
        let state = game.state();

        assert_eq!(state.current_player, Some(Side::Black));
        assert_eq!(state.black_count, 2);
        assert_eq!(state.white_count, 2);
        assert!(!state.is_game_over);
        assert!(!state.is_pass);
        assert!(!state.awaiting_oracle);
        assert!(state.flipped.is_empty());
        assert_eq!(state.last_move, None);
        assert_eq!(game.legal_moves().len(), 4);
        assert_eq!(game.result(), None);
    }

    #[test]
    fn t02_illegal_player_move_is_rejected_without_change() {
        let mut game = Game::with_seed(GameConfig::default(), 1);
        let before = game.state();

        assert_eq!(
            game.propose_move(0, 0),
            Err(GameError::InvalidMoveRejected { row: 0, col: 0 })
        );
        assert_eq!(
            game.propose_move(3, 3),
            Err(GameError::InvalidMoveRejected { row: 3, col: 3 })
        );
        assert_eq!(
            game.propose_move(99, 99),
            Err(GameError::InvalidMoveRejected { row: 99, col: 99 })
        );
        assert_eq!(game.state(), before);
    }

    #[test]
    fn human_move_flips_bracketed_stone_and_hands_over_turn() {
        let mut game = Game::with_seed(GameConfig::default(), 1);

        game.propose_move(2, 3).unwrap();
        let state = game.state();

        assert_eq!(state.flipped, vec![27]);
        assert_eq!(state.last_move, Some(Position::new(2, 3)));
        assert_eq!((state.black_count, state.white_count), (4, 1));
        assert_eq!(state.current_player, Some(Side::White));
        assert!(!state.is_pass);
    }

    #[test]
    fn human_cannot_move_on_automated_turn() {
        let mut game = Game::with_seed(GameConfig::default(), 1);
        game.propose_move(2, 3).unwrap();

        // White is the automated side; its legal squares are still refused.
        assert_eq!(
            game.propose_move(2, 2),
            Err(GameError::NotYourTurn(Side::Black))
        );
        assert_eq!(game.current_side(), Some(Side::White));
    }

    #[test]
    fn gate_blocks_all_moves_while_request_is_outstanding() {
        let mut game = Game::with_seed(cpu_plays(Side::Black), 1);

        let request = game.begin_cpu_turn().unwrap();
        assert!(game.state().awaiting_oracle);
        assert_eq!(request.legal_moves.len(), 4);
        assert_eq!(request.grid, Board::new().to_text());

        assert_eq!(game.begin_cpu_turn(), Err(GameError::AwaitingOracle));
        assert_eq!(game.propose_move(2, 3), Err(GameError::AwaitingOracle));

        let mv = game
            .resolve_cpu_turn(&request, Ok(Suggestion::new(2, 3)))
            .unwrap();
        assert_eq!(mv.position, Position::new(2, 3));
        assert_eq!(mv.origin, MoveOrigin::Oracle);
        assert!(!game.state().awaiting_oracle);
        assert_eq!(game.current_side(), Some(Side::White));
    }

    #[test]
    fn cpu_turn_cannot_begin_on_human_turn() {
        let mut game = Game::with_seed(GameConfig::default(), 1);
        assert_eq!(
            game.begin_cpu_turn(),
            Err(GameError::NotYourTurn(Side::White))
        );
        assert!(!game.is_awaiting_oracle());
    }

    #[test]
    fn out_of_range_suggestion_falls_back_to_legal_move() {
        let mut game = Game::with_seed(cpu_plays(Side::Black), 7);
        let request = game.begin_cpu_turn().unwrap();

        let mv = game
            .resolve_cpu_turn(&request, Ok(Suggestion::new(99, 99)))
            .unwrap();

        assert!(request.legal_moves.contains(&mv.position));
        assert!(matches!(
            mv.origin,
            MoveOrigin::Fallback {
                reason: MoveSourceError::Malformed(_)
            }
        ));
        assert_eq!(game.state().black_count, 4);
    }

    #[test]
    fn fallback_choice_is_deterministic_per_seed_and_covers_all_moves() {
        let pick = |seed| {
            let mut game = Game::with_seed(cpu_plays(Side::Black), seed);
            let request = game.begin_cpu_turn().unwrap();
            game.resolve_cpu_turn(
                &request,
                Err(MoveSourceError::Timeout(1)),
            )
            .unwrap()
            .position
        };

        assert_eq!(pick(11), pick(11));

        let seen: HashSet<Position> = (0..64).map(pick).collect();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn reply_after_reset_is_discarded() {
        let mut game = Game::with_seed(cpu_plays(Side::Black), 1);
        let request = game.begin_cpu_turn().unwrap();

        game.reset();
        let fresh = game.state();

        assert_eq!(
            game.resolve_cpu_turn(&request, Ok(Suggestion::new(2, 3))),
            Err(GameError::StaleRequest {
                requested: 0,
                current: 1
            })
        );
        assert_eq!(game.state(), fresh);
        assert_eq!(game.board(), &Board::new());
        assert!(!game.is_awaiting_oracle());
    }

    #[test]
    fn late_reply_to_earlier_request_is_discarded() {
        let mut game = Game::with_seed(GameConfig::default(), 5);
        game.propose_move(2, 3).unwrap();

        let first = game.begin_cpu_turn().unwrap();
        game.resolve_cpu_turn(&first, Err(MoveSourceError::Timeout(30_000)))
            .unwrap();

        assert_eq!(game.current_side(), Some(Side::Black));
        let mv = game.legal_moves()[0];
        game.propose_move(mv.row, mv.col).unwrap();

        let second = game.begin_cpu_turn().unwrap();
        assert_eq!(second.generation, first.generation);
        assert_ne!(second.request_id, first.request_id);
        let before = game.state();

        let offered = second.legal_moves[0];
        let late = Suggestion::new(offered.row.into(), offered.col.into());
        assert_eq!(
            game.resolve_cpu_turn(&first, Ok(late)),
            Err(GameError::SupersededRequest {
                requested: first.request_id,
                current: second.request_id
            })
        );
        assert_eq!(game.state(), before);
        assert!(game.is_awaiting_oracle());

        let mv = game.resolve_cpu_turn(&second, Ok(late)).unwrap();
        assert_eq!(mv.position, offered);
        assert_eq!(mv.origin, MoveOrigin::Oracle);
        assert!(!game.is_awaiting_oracle());
    }

    #[test]
    fn reply_without_request_is_rejected() {
        let mut game = Game::with_seed(cpu_plays(Side::Black), 1);
        let request = game.begin_cpu_turn().unwrap();
        game.resolve_cpu_turn(&request, Ok(Suggestion::new(2, 3)))
            .unwrap();

        assert_eq!(
            game.resolve_cpu_turn(&request, Ok(Suggestion::new(2, 2))),
            Err(GameError::NoPendingRequest)
        );
    }

    #[test]
    fn t03_side_without_moves_passes_on_entry() {
        let black = bit(0, 1);
        let white = FULL_BOARD ^ bit(0, 0) ^ black;
        let board = Board::from_bitboards(black, white).unwrap();

        let game = Game::from_position(GameConfig::default(), board, Side::Black, 1);

        assert_eq!(game.phase(), Phase::AwaitingMove(Side::White));
        assert_eq!(game.last_passed(), Some(Side::Black));
        assert!(game.state().is_pass);
        assert_eq!(game.legal_moves(), vec![Position::new(0, 0)]);
    }

    #[test]
    fn pass_after_move_returns_turn_to_mover() {
        let board: Board = "
            BWWWWWW.
            ........
            ........
            ........
            ........
            ........
            ........
            .WBBBBBB
        "
        .parse()
        .unwrap();
        let mut game = Game::from_position(GameConfig::default(), board, Side::Black, 1);

        game.propose_move(0, 7).unwrap();
        let state = game.state();
        assert!(state.is_pass);
        assert_eq!(game.last_passed(), Some(Side::White));
        assert_eq!(state.current_player, Some(Side::Black));

        game.propose_move(7, 0).unwrap();
        assert!(game.is_game_over());
        let result = game.result().unwrap();
        assert_eq!(result.outcome, Outcome::Winner(Side::Black));
        assert_eq!((result.black_count, result.white_count), (16, 0));
    }

    #[test]
    fn t04_both_sides_stuck_ends_game_with_winner_by_count() {
        let black = FULL_BOARD ^ bit(0, 0);
        let board = Board::from_bitboards(black, 0).unwrap();

        let mut game = Game::from_position(GameConfig::default(), board, Side::Black, 1);

        assert!(game.is_game_over());
        assert_eq!(game.current_side(), None);
        let result = game.result().unwrap();
        assert_eq!(result.outcome, Outcome::Winner(Side::Black));
        assert_eq!((result.black_count, result.white_count), (63, 0));

        assert_eq!(game.propose_move(0, 0), Err(GameError::GameOver));
        assert_eq!(game.begin_cpu_turn(), Err(GameError::GameOver));
        assert!(game.legal_moves().is_empty());
    }

    #[test]
    fn stuck_position_with_equal_counts_is_a_draw() {
        let board = Board::from_bitboards(bit(0, 0), bit(7, 7)).unwrap();

        let game = Game::from_position(GameConfig::default(), board, Side::White, 1);

        assert!(game.is_game_over());
        assert_eq!(game.result().unwrap().outcome, Outcome::Draw);
    }

    #[tokio::test]
    async fn t05_full_board_after_move_sets_game_over() {
        let black = bit(0, 1);
        let white = FULL_BOARD ^ bit(0, 0) ^ black;
        let board = Board::from_bitboards(black, white).unwrap();
        let mut game = Game::from_position(GameConfig::default(), board, Side::White, 1);

        let mv = game.play_cpu_turn(&Fixed(Suggestion::new(0, 0))).await.unwrap();
        let state = game.state();

        assert_eq!(mv.origin, MoveOrigin::Oracle);
        assert!(state.is_game_over);
        assert_eq!(state.current_player, None);
        assert_eq!(state.black_count, 0);
        assert_eq!(state.white_count, 64);
        assert_eq!(state.flipped, vec![1]);
    }

    #[tokio::test]
    async fn unavailable_source_still_completes_the_turn() {
        let mut game = Game::with_seed(GameConfig::default(), 3);
        game.propose_move(2, 3).unwrap();

        let mv = game.play_cpu_turn(&Failing).await.unwrap();

        assert!(matches!(
            mv.origin,
            MoveOrigin::Fallback {
                reason: MoveSourceError::Unavailable(_)
            }
        ));
        assert_eq!(game.current_side(), Some(Side::Black));
        assert_eq!(game.state().black_count + game.state().white_count, 6);
    }

    #[tokio::test]
    async fn stalled_source_times_out_into_fallback() {
        let mut game = Game::with_seed(fast_timeout(cpu_plays(Side::Black), 20), 3);

        let mv = game.play_cpu_turn(&Stalled).await.unwrap();

        assert_eq!(
            mv.origin,
            MoveOrigin::Fallback {
                reason: MoveSourceError::Timeout(20)
            }
        );
        assert!(!game.is_awaiting_oracle());
    }

    #[tokio::test]
    async fn full_game_against_source_reaches_terminal_state() {
        for seed in 0..8 {
            let mut game = Game::with_seed(GameConfig::default(), seed);
            let mut plies = 0;

            while let Some(side) = game.current_side() {
                if side == Side::White {
                    let source: &dyn MoveSource = if seed % 2 == 0 { &LastOffered } else { &Failing };
                    game.play_cpu_turn(source).await.unwrap();
                } else {
                    let mv = game.legal_moves()[0];
                    game.propose_move(mv.row, mv.col).unwrap();
                }
                plies += 1;
                assert!(plies <= 60);
            }

            let result = game.result().unwrap();
            let (black, white) = game.board().count();
            assert_eq!((result.black_count, result.white_count), (black, white));
            assert!(game.board().is_terminal());
        }
    }
}
