// =============================================================================
// Chess AI Engine
//
// Fixed-depth minimax search with alpha-beta pruning. The search drives the
// Game state machine directly: every candidate is applied with `Game::apply`,
// searched, and taken back with `Game::undo`, so the game is left exactly as
// it was found. Moves are ordered by MVV-LVA (captures of high-value pieces
// first) and promotions so that alpha-beta prunes aggressively.
//
// Scores are always from the AI's point of view: the side to move at the
// root maximizes, the opponent minimizes.
// =============================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::{Game, GameStatus};
use crate::moves::Move;
use crate::piece::{Color, PieceType};

// =============================================================================
// Configuration
// =============================================================================

/// Deepest search accepted, in plies.
pub const MAX_DEPTH: u32 = 6;

/// Controls the search depth, tie-breaking and which search helpers are on.
/// Missing fields take their defaults when read from JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Search depth in plies (1–6).
    pub depth: u32,
    /// Seed for choosing among equally scored moves. `None` picks a fresh
    /// seed per search, so play varies from game to game.
    pub seed: Option<u64>,
    /// Score checkmate as ±MATE_SCORE (sooner mates scoring higher) and every
    /// draw as 0. Off, terminal positions are scored on material alone.
    pub mate_module: bool,
    /// Search promotions and captures first.
    pub move_ordering: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AiConfig {
    pub fn new() -> Self {
        AiConfig {
            depth: 3,
            seed: None,
            mate_module: true,
            move_ordering: true,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// `depth` forced into the supported range.
    pub fn effective_depth(&self) -> u32 {
        self.depth.clamp(1, MAX_DEPTH)
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Far above any material balance. Mates found with plies to spare score a
/// little higher so the engine takes the shortest one.
pub const MATE_SCORE: i32 = 1_000_000;

/// Centipawn values. The king is weighted high enough to dominate every other
/// term; both kings are always on the board so it cancels out.
pub fn piece_value(pt: PieceType) -> i32 {
    match pt {
        PieceType::Pawn => 100,
        PieceType::Knight => 320,
        PieceType::Bishop => 330,
        PieceType::Rook => 500,
        PieceType::Queen => 900,
        PieceType::King => 20_000,
    }
}

/// Material balance from `ai_color`'s side: its pieces minus the opponent's.
fn eval_material(game: &Game, ai_color: Color) -> i32 {
    game.board()
        .pieces()
        .map(|(_, p)| {
            let v = piece_value(p.piece_type);
            if p.color == ai_color { v } else { -v }
        })
        .sum()
}

/// Static score of the position for `ai_color`.
pub fn evaluate(game: &Game, ai_color: Color, config: &AiConfig) -> i32 {
    score_position(game, ai_color, config, 0)
}

fn score_position(game: &Game, ai_color: Color, config: &AiConfig, plies_left: u32) -> i32 {
    if config.mate_module {
        match game.status() {
            GameStatus::Checkmate => {
                // The side to move has been mated
                let mate = MATE_SCORE + plies_left as i32;
                return if game.current_turn() == ai_color { -mate } else { mate };
            }
            status if status.is_draw() => return 0,
            _ => {}
        }
    }
    eval_material(game, ai_color)
}

// =============================================================================
// Move ordering
// =============================================================================

/// Priority of a move for search ordering, higher first:
///   1. promotions (queen highest)
///   2. captures by MVV-LVA, e.g. pawn takes queen before queen takes queen
///   3. quiet moves (0)
fn move_priority(game: &Game, mv: &Move) -> i32 {
    let board = game.board();
    let mut score = 0;

    if let Some(promo) = mv.promotion {
        score += 10_000 + piece_value(promo);
    }

    let Some(attacker) = board.piece_at(mv.from) else {
        return score;
    };
    let victim = match board.piece_at(mv.to) {
        Some(p) => Some(p.piece_type),
        // a pawn stepping diagonally onto an empty square takes en passant
        None if attacker.piece_type == PieceType::Pawn && mv.from.1 != mv.to.1 => Some(PieceType::Pawn),
        None => None,
    };
    if let Some(victim) = victim {
        // king capped at queen value so it never outweighs the victim
        let value = |pt| piece_value(pt).min(piece_value(PieceType::Queen)) / 10;
        score += 1_000 + value(victim) * 10 - value(attacker.piece_type);
    }

    score
}

fn order_moves(game: &Game, moves: &mut [Move]) {
    moves.sort_by_key(|mv| std::cmp::Reverse(move_priority(game, mv)));
}

// =============================================================================
// Search
// =============================================================================

/// The chosen move with its minimax score and the number of positions the
/// search visited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PickResult {
    pub mv: Move,
    pub score: i32,
    pub nodes: u64,
}

/// A search player. Holds the configuration and the tie-break RNG; the game is
/// borrowed per call and handed back unchanged.
pub struct Search {
    config: AiConfig,
    rng: StdRng,
    nodes: u64,
}

impl Search {
    pub fn new(config: AiConfig) -> Self {
        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        Search {
            config,
            rng: StdRng::seed_from_u64(seed),
            nodes: 0,
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// Choose a move for the side to move without playing it. Returns `None`
    /// when the game is over or waiting on a promotion choice.
    ///
    /// Every root move is searched to the configured depth; among the moves
    /// sharing the best score one is picked at random.
    pub fn pick_move(&mut self, game: &mut Game) -> Option<PickResult> {
        let status = game.status();
        if status.is_terminal() || status == GameStatus::PromotionPending {
            return None;
        }

        let ai_color = game.current_turn();
        let depth = self.config.effective_depth();
        let mut moves = game.legal_move_list();
        if moves.is_empty() {
            return None;
        }
        if self.config.move_ordering {
            order_moves(game, &mut moves);
        }

        self.nodes = 0;
        let mut best_score = i32::MIN;
        let mut best_moves: Vec<Move> = Vec::new();
        for mv in moves {
            // Narrowest window that still reports ties with the best exactly
            let alpha = if best_moves.is_empty() { i32::MIN } else { best_score - 1 };
            if !game.apply(&mv) {
                debug_assert!(false, "generated move {} was rejected", mv.to_uci());
                continue;
            }
            let score = self.minimax(game, depth - 1, alpha, i32::MAX, ai_color);
            game.undo();

            if score > best_score {
                best_score = score;
                best_moves.clear();
                best_moves.push(mv);
            } else if score == best_score {
                best_moves.push(mv);
            }
        }

        if best_moves.is_empty() {
            return None;
        }
        let mv = best_moves[self.rng.gen_range(0..best_moves.len())];
        debug!(
            mv = %mv.to_uci(),
            score = best_score,
            nodes = self.nodes,
            tied = best_moves.len(),
            "search finished"
        );
        Some(PickResult {
            mv,
            score: best_score,
            nodes: self.nodes,
        })
    }

    /// Pick a move and play it on `game`. Exactly one move is applied.
    pub fn make_move(&mut self, game: &mut Game) -> Option<PickResult> {
        let result = self.pick_move(game)?;
        if game.apply(&result.mv) {
            Some(result)
        } else {
            debug_assert!(false, "chosen move {} was rejected", result.mv.to_uci());
            None
        }
    }

    /// Minimax with alpha-beta pruning. The AI's turns maximize, the
    /// opponent's minimize; a branch is abandoned once `beta <= alpha`.
    fn minimax(&mut self, game: &mut Game, depth: u32, mut alpha: i32, mut beta: i32, ai_color: Color) -> i32 {
        self.nodes += 1;
        if depth == 0 || game.status().is_terminal() {
            return score_position(game, ai_color, &self.config, depth);
        }

        let mut moves = game.legal_move_list();
        if moves.is_empty() {
            return score_position(game, ai_color, &self.config, depth);
        }
        if self.config.move_ordering {
            order_moves(game, &mut moves);
        }

        let maximizing = game.current_turn() == ai_color;
        let mut best = if maximizing { i32::MIN } else { i32::MAX };
        for mv in &moves {
            if !game.apply(mv) {
                continue;
            }
            let score = self.minimax(game, depth - 1, alpha, beta, ai_color);
            game.undo();

            if maximizing {
                best = best.max(score);
                alpha = alpha.max(best);
            } else {
                best = best.min(score);
                beta = beta.min(best);
            }
            if beta <= alpha {
                break;
            }
        }

        best
    }
}
