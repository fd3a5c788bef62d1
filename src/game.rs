// =============================================================================
// Game state machine
//
// Owns the board and everything a position string needs beyond piece
// placement: side to move, castling rights, en-passant target and clocks.
// Moves go through a two-step protocol (select a piece, then pick one of its
// cached legal destinations). Every applied move is recorded with enough
// information for `undo` to invert it exactly, so search and perft can
// explore by mutating in place and backing out.
//
// Legality is decided by trial: each candidate destination is played on the
// board, the mover's king is tested for attack, and the board is put back.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::board::{Board, Square};
use crate::error::{ChessError, ChessResult};
use crate::moves::{parse_square, square_name, CastleSide, Move, MoveRecord, RookShift};
use crate::piece::{Color, Piece, PieceType};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingRights {
    pub fn all() -> Self {
        CastlingRights {
            white_kingside: true,
            white_queenside: true,
            black_kingside: true,
            black_queenside: true,
        }
    }

    pub fn none() -> Self {
        CastlingRights {
            white_kingside: false,
            white_queenside: false,
            black_kingside: false,
            black_queenside: false,
        }
    }

    pub fn get(&self, color: Color, side: CastleSide) -> bool {
        match (color, side) {
            (Color::White, CastleSide::Kingside) => self.white_kingside,
            (Color::White, CastleSide::Queenside) => self.white_queenside,
            (Color::Black, CastleSide::Kingside) => self.black_kingside,
            (Color::Black, CastleSide::Queenside) => self.black_queenside,
        }
    }

    pub fn revoke(&mut self, color: Color, side: CastleSide) {
        match (color, side) {
            (Color::White, CastleSide::Kingside) => self.white_kingside = false,
            (Color::White, CastleSide::Queenside) => self.white_queenside = false,
            (Color::Black, CastleSide::Kingside) => self.black_kingside = false,
            (Color::Black, CastleSide::Queenside) => self.black_queenside = false,
        }
    }

    /// Castling field of a position string: a subset of `KQkq`, or `-`.
    pub fn to_field(&self) -> String {
        let mut s = String::new();
        if self.white_kingside { s.push('K'); }
        if self.white_queenside { s.push('Q'); }
        if self.black_kingside { s.push('k'); }
        if self.black_queenside { s.push('q'); }
        if s.is_empty() {
            s.push('-');
        }
        s
    }

    pub fn from_field(field: &str) -> ChessResult<Self> {
        let mut rights = CastlingRights::none();
        if field == "-" {
            return Ok(rights);
        }
        for c in field.chars() {
            match c {
                'K' => rights.white_kingside = true,
                'Q' => rights.white_queenside = true,
                'k' => rights.black_kingside = true,
                'q' => rights.black_queenside = true,
                _ => return Err(ChessError::fen(format!("bad castling field '{field}'"))),
            }
        }
        Ok(rights)
    }
}

/// Square a pawn skipped with its double step, tagged with that pawn's color.
/// Only a pawn of the other color may capture onto it.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct EnPassantTarget {
    pub color: Color,
    pub square: Square,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum GameStatus {
    Active,
    Check,
    Checkmate,
    Stalemate,
    DrawFiftyMove,
    DrawInsufficientMaterial,
    DrawThreefoldRepetition,
    /// A pawn stands on its last rank waiting for `finish_promotion`.
    PromotionPending,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GameStatus::Checkmate
                | GameStatus::Stalemate
                | GameStatus::DrawFiftyMove
                | GameStatus::DrawInsufficientMaterial
                | GameStatus::DrawThreefoldRepetition
        )
    }

    pub fn is_draw(self) -> bool {
        self.is_terminal() && self != GameStatus::Checkmate
    }
}

/// A game in progress. Not reentrant: legality probes and search mutate the
/// board in place and restore it before returning, so one caller at a time.
/// Clone it to give another thread its own copy.
#[derive(Clone, Debug)]
pub struct Game {
    board: Board,
    current_turn: Color,
    selected: Option<Square>,
    possible_moves: Vec<Square>,
    move_history: Vec<MoveRecord>,
    en_passant_target: Option<EnPassantTarget>,
    castling_rights: CastlingRights,
    halfmove_clock: u32,
    fullmove_number: u32,
    repetition_count: HashMap<String, u32>,
    game_status: GameStatus,
    kings: [Square; 2],
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    pub fn new() -> Self {
        let board = Board::new();
        Self::from_parts(board, Color::White, CastlingRights::all(), None, 0, 1)
    }

    fn from_parts(
        board: Board,
        current_turn: Color,
        castling_rights: CastlingRights,
        en_passant_target: Option<EnPassantTarget>,
        halfmove_clock: u32,
        fullmove_number: u32,
    ) -> Self {
        let kings = [
            board.find_king(Color::White).unwrap_or((0, 4)),
            board.find_king(Color::Black).unwrap_or((7, 4)),
        ];
        let mut game = Game {
            board,
            current_turn,
            selected: None,
            possible_moves: Vec::new(),
            move_history: Vec::new(),
            en_passant_target,
            castling_rights,
            halfmove_clock,
            fullmove_number,
            repetition_count: HashMap::new(),
            game_status: GameStatus::Active,
            kings,
        };
        game.repetition_count.insert(game.position_key(), 1);
        game.game_status = game.compute_status();
        game
    }

    /// Load a position string. The clock fields may be omitted and default to
    /// `0 1`.
    pub fn from_fen(text: &str) -> ChessResult<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 4 && fields.len() != 6 {
            return Err(ChessError::fen(format!(
                "expected 4 or 6 fields, found {}",
                fields.len()
            )));
        }

        let board = Board::from_placement(fields[0])?;
        for color in [Color::White, Color::Black] {
            let kings = board
                .pieces()
                .filter(|(_, p)| p.piece_type == PieceType::King && p.color == color)
                .count();
            if kings != 1 {
                return Err(ChessError::fen(format!("{color:?} has {kings} kings")));
            }
        }

        let current_turn = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(ChessError::fen(format!("bad side to move '{other}'"))),
        };

        let castling_rights = CastlingRights::from_field(fields[2])?;

        let en_passant_target = match fields[3] {
            "-" => None,
            name => {
                let square = parse_square(name)
                    .map_err(|_| ChessError::fen(format!("bad en-passant square '{name}'")))?;
                let advanced = current_turn.opposite();
                let expected_rank = (advanced.pawn_start_rank() as i32 + advanced.pawn_direction()) as usize;
                if square.0 != expected_rank {
                    return Err(ChessError::fen(format!("en-passant square '{name}' on wrong rank")));
                }
                Some(EnPassantTarget {
                    color: advanced,
                    square,
                })
            }
        };

        let (halfmove_clock, fullmove_number) = if fields.len() == 6 {
            let half = fields[4]
                .parse::<u32>()
                .map_err(|_| ChessError::fen(format!("bad halfmove clock '{}'", fields[4])))?;
            let full = fields[5]
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| ChessError::fen(format!("bad fullmove number '{}'", fields[5])))?;
            (half, full)
        } else {
            (0, 1)
        };

        let game = Self::from_parts(
            board,
            current_turn,
            castling_rights,
            en_passant_target,
            halfmove_clock,
            fullmove_number,
        );
        // The side that just moved may not have left its king attacked
        if game.is_in_check(current_turn.opposite(), None) {
            return Err(ChessError::fen(format!(
                "{:?} king is attacked with {current_turn:?} to move",
                current_turn.opposite()
            )));
        }
        Ok(game)
    }

    // -------------------------------------------------------------------------
    // Read access
    // -------------------------------------------------------------------------

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current_turn(&self) -> Color {
        self.current_turn
    }

    pub fn status(&self) -> GameStatus {
        self.game_status
    }

    pub fn selected(&self) -> Option<Square> {
        self.selected
    }

    pub fn possible_moves(&self) -> &[Square] {
        &self.possible_moves
    }

    pub fn move_history(&self) -> &[MoveRecord] {
        &self.move_history
    }

    pub fn last_move(&self) -> Option<&MoveRecord> {
        self.move_history.last()
    }

    pub fn en_passant_target(&self) -> Option<EnPassantTarget> {
        self.en_passant_target
    }

    pub fn castling_rights(&self) -> CastlingRights {
        self.castling_rights
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    pub fn king_square(&self, color: Color) -> Square {
        self.kings[color.index()]
    }

    /// How many times the position with this key has occurred.
    pub fn repetitions(&self, key: &str) -> u32 {
        self.repetition_count.get(key).copied().unwrap_or(0)
    }

    // -------------------------------------------------------------------------
    // Position strings
    // -------------------------------------------------------------------------

    /// Placement, side to move, castling rights and en-passant target. Two
    /// positions with the same key count as repetitions of each other.
    pub fn position_key(&self) -> String {
        let side = match self.current_turn {
            Color::White => "w",
            Color::Black => "b",
        };
        let ep = self
            .en_passant_target
            .map(|t| square_name(t.square))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} {side} {} {ep}",
            self.board.placement(),
            self.castling_rights.to_field()
        )
    }

    /// Full six-field position string.
    pub fn fen(&self) -> String {
        format!(
            "{} {} {}",
            self.position_key(),
            self.halfmove_clock,
            self.fullmove_number
        )
    }

    // -------------------------------------------------------------------------
    // Selection and legal moves
    // -------------------------------------------------------------------------

    /// Select the piece on `square` if it belongs to the side to move, caching
    /// its legal destinations. Refused while a promotion is pending.
    pub fn select(&mut self, square: Square) -> bool {
        if self.game_status == GameStatus::PromotionPending {
            trace!(square = %square_name(square), "selection refused: promotion pending");
            return false;
        }
        match self.board.piece_at(square) {
            Some(p) if p.color == self.current_turn => {
                self.selected = Some(square);
                self.possible_moves = self.legal_moves(square);
                true
            }
            _ => {
                trace!(square = %square_name(square), "selection refused");
                false
            }
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.possible_moves.clear();
    }

    /// Legal destinations for the piece on `from`, including en passant and
    /// castling. Every candidate is tried on the board and kept only if the
    /// mover's king is safe afterwards; the board is restored after each try.
    pub fn legal_moves(&mut self, from: Square) -> Vec<Square> {
        let Some(piece) = self.board.piece_at(from) else {
            return Vec::new();
        };

        let mut candidates = piece.moves(&self.board, from);
        if let Some(to) = self.en_passant_destination(piece, from) {
            candidates.push(to);
        }
        if piece.piece_type == PieceType::King {
            candidates.extend(self.castling_destinations(piece.color, from));
        }

        candidates
            .into_iter()
            .filter(|&to| self.leaves_king_safe(piece, from, to))
            .collect()
    }

    /// Destination of an en-passant capture available to this pawn, if any.
    fn en_passant_destination(&self, piece: Piece, from: Square) -> Option<Square> {
        let target = self.en_passant_target?;
        if piece.piece_type != PieceType::Pawn || target.color == piece.color {
            return None;
        }
        let (tr, tc) = target.square;
        let forward = from.0 as i32 + piece.color.pawn_direction();
        if tr as i32 == forward && tc.abs_diff(from.1) == 1 {
            Some(target.square)
        } else {
            None
        }
    }

    fn is_en_passant(&self, piece: Piece, from: Square, to: Square) -> bool {
        self.en_passant_destination(piece, from) == Some(to) && self.board.piece_at(to).is_none()
    }

    fn castling_destinations(&self, color: Color, from: Square) -> Vec<Square> {
        let rank = color.back_rank();
        if from != (rank, 4) {
            return Vec::new();
        }

        let mut moves = Vec::new();
        for side in [CastleSide::Kingside, CastleSide::Queenside] {
            if !self.castling_rights.get(color, side) {
                continue;
            }
            let rook_home = (rank, side.rook_from_file());
            let has_rook = self
                .board
                .piece_at(rook_home)
                .map(|p| p.piece_type == PieceType::Rook && p.color == color)
                .unwrap_or(false);
            if !has_rook {
                continue;
            }

            let between = match side {
                CastleSide::Kingside => 5..=6,
                CastleSide::Queenside => 1..=3,
            };
            if between.into_iter().any(|f| self.board.piece_at((rank, f)).is_some()) {
                continue;
            }

            // King may not start on, pass through or land on an attacked square
            let king_path = match side {
                CastleSide::Kingside => [4, 5, 6],
                CastleSide::Queenside => [4, 3, 2],
            };
            if king_path.iter().any(|&f| self.is_in_check(color, Some((rank, f)))) {
                continue;
            }

            moves.push((rank, side.king_file()));
        }
        moves
    }

    /// Play `from -> to` on the board, test the mover's king, and put
    /// everything back.
    fn leaves_king_safe(&mut self, piece: Piece, from: Square, to: Square) -> bool {
        let idx = piece.color.index();
        let ep_square = if piece.piece_type == PieceType::Pawn && self.is_en_passant(piece, from, to) {
            Some((from.0, to.1))
        } else {
            None
        };

        let ep_captured = ep_square.and_then(|sq| self.board.remove(sq));
        let captured = self.board.move_piece(from, to);
        let saved_king = self.kings[idx];
        if piece.piece_type == PieceType::King {
            self.kings[idx] = to;
        }

        let safe = !self.is_in_check(piece.color, None);

        self.kings[idx] = saved_king;
        self.board.move_piece(to, from);
        self.board.set(to, captured);
        if let Some(sq) = ep_square {
            self.board.set(sq, ep_captured);
        }
        safe
    }

    /// Whether `color`'s king, or the hypothetical `square` if given, is
    /// attacked by the other side.
    pub fn is_in_check(&self, color: Color, square: Option<Square>) -> bool {
        let target = square.unwrap_or(self.kings[color.index()]);
        self.board.is_square_attacked_by(target, color.opposite())
    }

    /// Every piece of the side to move that has at least one legal move, with
    /// its destinations.
    pub fn all_legal_moves(&mut self) -> Vec<(Square, Piece, Vec<Square>)> {
        if self.game_status == GameStatus::PromotionPending {
            return Vec::new();
        }
        let color = self.current_turn;
        self.squares_of(color)
            .into_iter()
            .filter_map(|sq| {
                let piece = self.board.piece_at(sq)?;
                let moves = self.legal_moves(sq);
                (!moves.is_empty()).then_some((sq, piece, moves))
            })
            .collect()
    }

    /// `all_legal_moves` flattened into concrete moves, one per promotion
    /// kind where a pawn reaches its last rank.
    pub fn legal_move_list(&mut self) -> Vec<Move> {
        let mut list = Vec::new();
        for (from, piece, dests) in self.all_legal_moves() {
            for to in dests {
                if piece.piece_type == PieceType::Pawn && to.0 == piece.color.promotion_rank() {
                    for kind in PieceType::PROMOTIONS {
                        list.push(Move {
                            from,
                            to,
                            promotion: Some(kind),
                        });
                    }
                } else {
                    list.push(Move::new(from, to));
                }
            }
        }
        list
    }

    fn squares_of(&self, color: Color) -> Vec<Square> {
        self.board
            .pieces()
            .filter(|(_, p)| p.color == color)
            .map(|(sq, _)| sq)
            .collect()
    }

    fn has_any_legal_move(&mut self, color: Color) -> bool {
        self.squares_of(color)
            .into_iter()
            .any(|sq| !self.legal_moves(sq).is_empty())
    }

    // -------------------------------------------------------------------------
    // Making and unmaking moves
    // -------------------------------------------------------------------------

    /// Move the selected piece to `to`. Returns false if nothing is selected or
    /// `to` is not one of its legal destinations.
    ///
    /// A pawn reaching its last rank is moved but the turn is not finished:
    /// the status becomes `PromotionPending`, this returns false, and the
    /// caller completes the move with `finish_promotion`.
    pub fn make_move(&mut self, to: Square) -> bool {
        let Some(from) = self.selected else {
            trace!(to = %square_name(to), "move refused: nothing selected");
            return false;
        };
        if self.game_status == GameStatus::PromotionPending || !self.possible_moves.contains(&to) {
            trace!(from = %square_name(from), to = %square_name(to), "move refused: not legal");
            return false;
        }
        let Some(piece) = self.board.piece_at(from) else {
            return false;
        };
        let color = piece.color;

        let castling_before = self.castling_rights;
        let en_passant_before = self.en_passant_target;
        let halfmove_clock_before = self.halfmove_clock;

        // Captures, including the en-passant case where the victim is beside `from`
        let (captured, captured_square) = if piece.piece_type == PieceType::Pawn
            && self.is_en_passant(piece, from, to)
        {
            let sq = (from.0, to.1);
            (self.board.remove(sq), Some(sq))
        } else {
            let victim = self.board.piece_at(to);
            (victim, victim.map(|_| to))
        };

        // Castling moves the rook first
        let castle = if piece.piece_type == PieceType::King && from.1 == 4 && to.1.abs_diff(4) == 2 {
            Some(if to.1 == 6 {
                CastleSide::Kingside
            } else {
                CastleSide::Queenside
            })
        } else {
            None
        };
        let rook_shift = castle.and_then(|side| {
            let rook_from = (from.0, side.rook_from_file());
            let rook_to = (from.0, side.rook_to_file());
            let rook = self.board.piece_at(rook_from)?;
            self.board.move_piece(rook_from, rook_to);
            Some(RookShift {
                rook,
                from: rook_from,
                to: rook_to,
            })
        });

        if piece.piece_type == PieceType::Pawn || captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }
        if color == Color::Black {
            self.fullmove_number += 1;
        }

        self.update_castling_rights(piece, from, captured, captured_square);

        self.en_passant_target =
            if piece.piece_type == PieceType::Pawn && from.0.abs_diff(to.0) == 2 {
                Some(EnPassantTarget {
                    color,
                    square: ((from.0 + to.0) / 2, from.1),
                })
            } else {
                None
            };

        self.board.move_piece(from, to);
        if piece.piece_type == PieceType::King {
            self.kings[color.index()] = to;
        }

        self.move_history.push(MoveRecord {
            piece,
            from,
            to,
            captured,
            captured_square,
            halfmove_clock_before,
            castling_before,
            en_passant_before,
            next_id_before: self.board.next_id(),
            promotion: None,
            castle,
            rook_shift,
        });

        if piece.piece_type == PieceType::Pawn && to.0 == color.promotion_rank() {
            self.game_status = GameStatus::PromotionPending;
            self.clear_selection();
            debug!(from = %square_name(from), to = %square_name(to), "promotion pending");
            return false;
        }

        debug!(
            from = %square_name(from),
            to = %square_name(to),
            capture = captured.is_some(),
            "move applied"
        );
        self.complete_turn();
        true
    }

    fn update_castling_rights(
        &mut self,
        piece: Piece,
        from: Square,
        captured: Option<Piece>,
        captured_square: Option<Square>,
    ) {
        let color = piece.color;
        match piece.piece_type {
            PieceType::King => {
                self.castling_rights.revoke(color, CastleSide::Kingside);
                self.castling_rights.revoke(color, CastleSide::Queenside);
            }
            PieceType::Rook => {
                if let Some(side) = Self::rook_home_side(color, from) {
                    self.castling_rights.revoke(color, side);
                }
            }
            _ => {}
        }

        // A rook captured on its home square takes its side's right with it
        if let (Some(victim), Some(sq)) = (captured, captured_square) {
            if victim.piece_type == PieceType::Rook {
                if let Some(side) = Self::rook_home_side(victim.color, sq) {
                    self.castling_rights.revoke(victim.color, side);
                }
            }
        }
    }

    fn rook_home_side(color: Color, square: Square) -> Option<CastleSide> {
        if square.0 != color.back_rank() {
            return None;
        }
        match square.1 {
            0 => Some(CastleSide::Queenside),
            7 => Some(CastleSide::Kingside),
            _ => None,
        }
    }

    /// Replace the pawn waiting on its last rank with a `kind` piece and finish
    /// the turn. Does nothing and returns false when no promotion is pending
    /// or `kind` is not a piece a pawn may become.
    pub fn finish_promotion(&mut self, kind: PieceType) -> bool {
        if self.game_status != GameStatus::PromotionPending || !PieceType::PROMOTIONS.contains(&kind) {
            trace!(?kind, "finish_promotion ignored");
            return false;
        }
        let Some(record) = self.move_history.last_mut() else {
            return false;
        };
        record.promotion = Some(kind);
        let (to, color) = (record.to, record.piece.color);

        self.board.place(to, Piece::new(kind, color));
        debug!(square = %square_name(to), ?kind, "promotion completed");
        self.complete_turn();
        true
    }

    fn complete_turn(&mut self) {
        self.current_turn = self.current_turn.opposite();
        *self.repetition_count.entry(self.position_key()).or_insert(0) += 1;
        self.game_status = self.compute_status();
        self.clear_selection();
        if self.game_status.is_terminal() {
            info!(status = ?self.game_status, fen = %self.fen(), "game over");
        }
    }

    /// Take back the last move. Returns false when there is nothing to undo.
    /// Also reverts a half-finished promotion.
    pub fn undo(&mut self) -> bool {
        let pending = self.game_status == GameStatus::PromotionPending;
        let Some(record) = self.move_history.pop() else {
            trace!("undo refused: empty history");
            return false;
        };

        if !pending {
            let key = self.position_key();
            if let Some(count) = self.repetition_count.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    self.repetition_count.remove(&key);
                }
            }
            self.current_turn = self.current_turn.opposite();
        }
        if record.piece.color == Color::Black {
            self.fullmove_number -= 1;
        }

        if let Some(shift) = record.rook_shift {
            self.board.set(shift.to, None);
            self.board.set(shift.from, Some(shift.rook));
        }
        // For a promotion the recorded piece is still the pawn
        self.board.set(record.to, None);
        self.board.set(record.from, Some(record.piece));
        if let (Some(victim), Some(sq)) = (record.captured, record.captured_square) {
            self.board.set(sq, Some(victim));
        }
        if record.piece.piece_type == PieceType::King {
            self.kings[record.piece.color.index()] = record.from;
        }

        self.halfmove_clock = record.halfmove_clock_before;
        self.castling_rights = record.castling_before;
        self.en_passant_target = record.en_passant_before;
        self.board.restore_next_id(record.next_id_before);

        self.clear_selection();
        self.game_status = self.compute_status();
        debug!(
            from = %square_name(record.from),
            to = %square_name(record.to),
            "move undone"
        );
        true
    }

    /// Select and play `mv`, finishing the promotion when the move has one.
    /// All or nothing: a move that does not match the position is refused
    /// before anything changes.
    pub fn apply(&mut self, mv: &Move) -> bool {
        let Some(piece) = self.board.piece_at(mv.from) else {
            return false;
        };
        let promotes = piece.piece_type == PieceType::Pawn && mv.to.0 == piece.color.promotion_rank();
        if promotes != mv.promotion.is_some() {
            return false;
        }
        if !self.select(mv.from) {
            return false;
        }
        if self.make_move(mv.to) {
            return true;
        }
        match mv.promotion {
            Some(kind) if self.game_status == GameStatus::PromotionPending => {
                self.finish_promotion(kind)
            }
            _ => {
                self.clear_selection();
                false
            }
        }
    }

    /// Parse and play a move in UCI notation.
    pub fn apply_uci(&mut self, text: &str) -> ChessResult<()> {
        let mv = Move::from_uci(text)?;
        if self.game_status == GameStatus::PromotionPending {
            return Err(ChessError::PromotionPending);
        }
        if self.apply(&mv) {
            Ok(())
        } else {
            Err(ChessError::IllegalMove {
                text: text.to_string(),
            })
        }
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    /// Status of the position for the side to move, first match wins:
    /// checkmate, stalemate, fifty-move draw, insufficient material,
    /// threefold repetition, check, active.
    fn compute_status(&mut self) -> GameStatus {
        let side = self.current_turn;
        let in_check = self.is_in_check(side, None);

        if !self.has_any_legal_move(side) {
            return if in_check {
                GameStatus::Checkmate
            } else {
                GameStatus::Stalemate
            };
        }
        if self.halfmove_clock >= 100 {
            return GameStatus::DrawFiftyMove;
        }
        if self.has_insufficient_material() {
            return GameStatus::DrawInsufficientMaterial;
        }
        if self.repetitions(&self.position_key()) >= 3 {
            return GameStatus::DrawThreefoldRepetition;
        }
        if in_check {
            GameStatus::Check
        } else {
            GameStatus::Active
        }
    }

    /// King vs king, king and one minor piece vs king, or nothing but bishops
    /// all standing on the same square color.
    pub fn has_insufficient_material(&self) -> bool {
        let others: Vec<(Square, Piece)> = self
            .board
            .pieces()
            .filter(|(_, p)| p.piece_type != PieceType::King)
            .collect();
        match others.as_slice() {
            [] => true,
            [(_, p)] => p.piece_type.is_minor(),
            _ => {
                let shade = |(r, c): Square| (r + c) % 2;
                let first = shade(others[0].0);
                others
                    .iter()
                    .all(|(sq, p)| p.piece_type == PieceType::Bishop && shade(*sq) == first)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(game: &mut Game, moves: &[&str]) {
        for m in moves {
            game.apply_uci(m)
                .unwrap_or_else(|e| panic!("{m} should be legal in {}: {e}", game.fen()));
        }
    }

    fn sorted(mut v: Vec<Square>) -> Vec<Square> {
        v.sort();
        v
    }

    #[test]
    fn new_game_matches_start_position() {
        let game = Game::new();
        assert_eq!(game.fen(), START_FEN);
        assert_eq!(game.status(), GameStatus::Active);
        assert_eq!(game.current_turn(), Color::White);
        assert_eq!(game.repetitions(&game.position_key()), 1);
        assert_eq!(Game::from_fen(START_FEN).unwrap().fen(), START_FEN);
    }

    #[test]
    fn select_accepts_only_own_pieces() {
        let mut game = Game::new();
        assert!(!game.select((3, 3)), "empty square");
        assert!(!game.select((6, 0)), "black pawn on white's turn");
        assert!(game.possible_moves().is_empty());

        assert!(game.select((0, 6)));
        assert_eq!(sorted(game.possible_moves().to_vec()), vec![(2, 5), (2, 7)]);
        assert_eq!(game.selected(), Some((0, 6)));
    }

    #[test]
    fn make_move_rejects_without_selection_or_illegal_target() {
        let mut game = Game::new();
        assert!(!game.make_move((3, 4)), "nothing selected");
        assert!(game.select((1, 4)));
        assert!(!game.make_move((4, 4)), "triple step");
        assert_eq!(game.fen(), START_FEN, "failed move must not change the position");
        assert!(game.move_history().is_empty());
    }

    #[test]
    fn make_move_updates_clocks_turn_and_en_passant() {
        let mut game = Game::new();
        play(&mut game, &["e2e4"]);
        assert_eq!(game.current_turn(), Color::Black);
        assert_eq!(
            game.en_passant_target(),
            Some(EnPassantTarget { color: Color::White, square: (2, 4) })
        );
        assert_eq!(game.fen(), "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1");

        play(&mut game, &["g8f6"]);
        assert_eq!(game.halfmove_clock(), 1);
        assert_eq!(game.fullmove_number(), 2);
        assert!(game.en_passant_target().is_none());
        assert!(game.selected().is_none() && game.possible_moves().is_empty());
    }

    #[test]
    fn fools_mate_is_checkmate() {
        let mut game = Game::new();
        play(&mut game, &["f2f3", "e7e5", "g2g4", "d8h4"]);
        assert_eq!(game.status(), GameStatus::Checkmate);
        assert_eq!(game.current_turn(), Color::White);
        assert!(game.all_legal_moves().is_empty());
        assert!(game.is_in_check(Color::White, None));
    }

    #[test]
    fn known_stalemate_is_not_checkmate() {
        let game = Game::from_fen("8/8/8/8/8/1q6/2k5/K7 w - - 0 1").unwrap();
        assert_eq!(game.status(), GameStatus::Stalemate);

        let mut game = Game::from_fen("8/8/8/8/8/1q6/3k4/K7 b - - 0 1").unwrap();
        assert_eq!(game.status(), GameStatus::Active);
        play(&mut game, &["d2c2"]);
        assert_eq!(game.status(), GameStatus::Stalemate);
        assert!(game.all_legal_moves().is_empty());
    }

    #[test]
    fn threefold_repetition_needs_a_third_occurrence() {
        let mut game = Game::new();
        let start_key = game.position_key();
        play(&mut game, &["g1f3", "g8f6", "f3g1", "f6g8"]);
        assert_eq!(game.repetitions(&start_key), 2);
        assert_eq!(game.status(), GameStatus::Active, "two occurrences are not a draw");

        play(&mut game, &["g1f3", "g8f6", "f3g1"]);
        assert_eq!(game.status(), GameStatus::Active);
        play(&mut game, &["f6g8"]);
        assert_eq!(game.repetitions(&start_key), 3);
        assert_eq!(game.status(), GameStatus::DrawThreefoldRepetition);

        assert!(game.undo());
        assert_eq!(game.repetitions(&start_key), 2);
        assert_eq!(game.status(), GameStatus::Active);
    }

    #[test]
    fn repetition_key_includes_en_passant_target() {
        let mut game = Game::new();
        play(&mut game, &["e2e4"]);
        let with_ep = game.position_key();
        assert!(with_ep.ends_with(" e3"));
        play(&mut game, &["g8f6", "g1f3", "f6g8", "f3g1"]);
        // Same placement and side to move, but the en-passant square is gone
        assert_ne!(game.position_key(), with_ep);
        assert_eq!(game.repetitions(&with_ep), 1);
    }

    #[test]
    fn insufficient_material_only_when_balance_is_reached() {
        let mut game = Game::from_fen("4k3/8/8/8/2n5/8/8/4KB2 w - - 0 1").unwrap();
        assert_eq!(game.status(), GameStatus::Active, "bishop vs knight can still mate");
        play(&mut game, &["f1c4"]);
        assert_eq!(game.status(), GameStatus::DrawInsufficientMaterial);
        assert!(game.status().is_terminal() && game.status().is_draw());

        let mut game = Game::from_fen("4k3/8/8/8/2n5/8/4p3/4KB2 w - - 0 1").unwrap();
        play(&mut game, &["f1e2"]);
        assert_eq!(game.status(), GameStatus::Active, "bishop against knight");
    }

    #[test]
    fn insufficient_material_cases() {
        let cases = [
            ("4k3/8/8/8/8/8/8/4K3 w - - 0 1", true),
            ("4k3/8/8/8/8/8/8/4KN2 w - - 0 1", true),
            ("4k3/8/8/8/8/8/8/4KR2 w - - 0 1", false),
            ("4k3/8/8/8/8/8/8/4KP2 w - - 0 1", false),
            // bishops on c1 and f8: both dark squares
            ("4kb2/8/8/8/8/8/8/2B1K3 w - - 0 1", true),
            // bishops on c1 and c8: opposite shades
            ("2b1k3/8/8/8/8/8/8/2B1K3 w - - 0 1", false),
            ("4k3/8/8/8/8/8/8/1NB1K3 w - - 0 1", false),
        ];
        for (fen, expected) in cases {
            let game = Game::from_fen(fen).unwrap();
            assert_eq!(game.has_insufficient_material(), expected, "{fen}");
        }
    }

    #[test]
    fn fifty_move_rule_triggers_at_hundred_halfmoves() {
        let mut game = Game::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 99 60").unwrap();
        assert_eq!(game.status(), GameStatus::Active);
        play(&mut game, &["a1a2"]);
        assert_eq!(game.halfmove_clock(), 100);
        assert_eq!(game.status(), GameStatus::DrawFiftyMove);
        assert!(game.undo());
        assert_eq!(game.halfmove_clock(), 99);
        assert_eq!(game.status(), GameStatus::Active);
    }

    #[test]
    fn promotion_is_two_phase() {
        let mut game = Game::from_fen("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        assert!(game.select((6, 0)));
        assert!(!game.make_move((7, 0)), "promotion does not complete the move");
        assert_eq!(game.status(), GameStatus::PromotionPending);
        assert_eq!(game.current_turn(), Color::White);
        assert!(!game.select((0, 7)), "no selection while promotion is pending");
        assert!(game.all_legal_moves().is_empty());

        assert!(!game.finish_promotion(PieceType::King));
        assert!(game.finish_promotion(PieceType::Queen));
        let queen = game.board().piece_at((7, 0)).unwrap();
        assert_eq!((queen.piece_type, queen.color), (PieceType::Queen, Color::White));
        assert_eq!(game.current_turn(), Color::Black);
        assert_eq!(game.last_move().unwrap().promotion, Some(PieceType::Queen));
        // the new queen looks straight down the a-file at the king
        assert_eq!(game.status(), GameStatus::Check);

        assert!(!game.finish_promotion(PieceType::Queen), "nothing pending any more");
    }

    #[test]
    fn undo_reverts_pending_promotion() {
        let mut game = Game::from_fen("1n6/P7/8/8/8/8/8/k6K w - - 3 40").unwrap();
        let before = game.fen();
        assert!(game.select((6, 0)));
        assert!(!game.make_move((7, 1)));
        assert_eq!(game.status(), GameStatus::PromotionPending);
        assert!(game.undo());
        assert_eq!(game.fen(), before);
        assert_eq!(game.status(), GameStatus::Active);
        assert_eq!(game.board().piece_at((7, 1)).map(|p| p.piece_type), Some(PieceType::Knight));
    }

    #[test]
    fn castling_requires_rights_empty_path_and_safe_squares() {
        let mut game = Game::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        assert!(game.select((0, 4)));
        assert!(game.possible_moves().contains(&(0, 6)));
        assert!(game.possible_moves().contains(&(0, 2)));

        // f1 is covered by the rook on f8
        let mut game = Game::from_fen("r3kr2/8/8/8/8/8/8/R3K2R w KQq - 0 1").unwrap();
        assert!(game.select((0, 4)));
        assert!(!game.possible_moves().contains(&(0, 6)));
        assert!(game.possible_moves().contains(&(0, 2)));

        // b1 occupied blocks queenside, missing right blocks kingside
        let mut game = Game::from_fen("4k3/8/8/8/8/8/8/RN2K2R w Q - 0 1").unwrap();
        assert!(game.select((0, 4)));
        assert!(!game.possible_moves().contains(&(0, 6)));
        assert!(!game.possible_moves().contains(&(0, 2)));

        // no castling out of check
        let mut game = Game::from_fen("4r1k1/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        assert_eq!(game.status(), GameStatus::Check);
        assert!(game.select((0, 4)));
        assert!(!game.possible_moves().contains(&(0, 6)));
        assert!(!game.possible_moves().contains(&(0, 2)));
    }

    #[test]
    fn castling_moves_rook_and_undo_restores_it() {
        let mut game = Game::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let before = game.fen();
        play(&mut game, &["e1g1"]);
        let rook = game.board().piece_at((0, 5)).unwrap();
        assert_eq!(rook.piece_type, PieceType::Rook);
        assert!(game.board().piece_at((0, 7)).is_none());
        assert_eq!(game.king_square(Color::White), (0, 6));
        assert_eq!(game.castling_rights().to_field(), "kq");
        assert_eq!(game.last_move().unwrap().castle, Some(CastleSide::Kingside));

        play(&mut game, &["e8c8"]);
        assert_eq!(game.board().piece_at((7, 3)).map(|p| p.piece_type), Some(PieceType::Rook));
        assert_eq!(game.castling_rights().to_field(), "-");

        assert!(game.undo());
        assert!(game.undo());
        assert_eq!(game.fen(), before);
        assert_eq!(game.king_square(Color::White), (0, 4));
    }

    #[test]
    fn rook_moves_and_captures_revoke_castling_rights() {
        let mut game = Game::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        play(&mut game, &["h1h8"]);
        // white's kingside rook left home, black's kingside rook was captured at home
        assert_eq!(game.castling_rights().to_field(), "Qq");
        assert!(game.undo());
        assert_eq!(game.castling_rights().to_field(), "KQkq");
    }

    #[test]
    fn en_passant_capture_and_undo() {
        let mut game = Game::new();
        play(&mut game, &["e2e4", "a7a6", "e4e5", "d7d5"]);
        assert!(game.select((4, 4)));
        assert!(game.possible_moves().contains(&(5, 3)), "exd6 e.p. available");

        let before = game.fen();
        play(&mut game, &["e5d6"]);
        assert!(game.board().piece_at((4, 3)).is_none(), "captured pawn removed from d5");
        let record = game.last_move().unwrap();
        assert!(record.is_en_passant() && record.is_capture());
        assert_eq!(record.captured_square, Some((4, 3)));

        assert!(game.undo());
        assert_eq!(game.fen(), before);
        assert_eq!(game.board().piece_at((4, 3)).map(|p| p.piece_type), Some(PieceType::Pawn));
    }

    #[test]
    fn en_passant_expires_after_one_move() {
        let mut game = Game::new();
        play(&mut game, &["e2e4", "a7a6", "e4e5", "d7d5", "h2h3", "h7h6"]);
        assert!(game.select((4, 4)));
        assert!(!game.possible_moves().contains(&(5, 3)));
    }

    #[test]
    fn en_passant_refused_when_it_exposes_the_king() {
        let mut game = Game::from_fen("8/8/8/KPp4r/8/8/8/7k w - c6 0 1").unwrap();
        assert!(game.select((4, 1)));
        assert_eq!(game.possible_moves(), &[(5, 1)]);
    }

    #[test]
    fn pinned_piece_cannot_leave_the_pin() {
        let mut game = Game::from_fen("4r1k1/8/8/8/8/8/4B3/4K3 w - - 0 1").unwrap();
        assert!(game.select((1, 4)));
        assert!(game.possible_moves().is_empty(), "bishop is pinned to the king");
    }

    #[test]
    fn legal_moves_never_leave_own_king_attacked() {
        let fens = [
            START_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        ];
        for fen in fens {
            let mut game = Game::from_fen(fen).unwrap();
            let mover = game.current_turn();
            for mv in game.legal_move_list() {
                assert!(game.apply(&mv), "{} from {fen}", mv.to_uci());
                let king = game.king_square(mover);
                assert!(
                    !game.board().is_square_attacked_by(king, mover.opposite()),
                    "{} leaves the king attacked in {fen}",
                    mv.to_uci()
                );
                assert!(game.undo());
                assert_eq!(game.fen(), fen.to_string());
            }
        }
    }

    #[test]
    fn undo_round_trip_restores_everything() {
        let mut game = Game::new();
        let start_board = game.board().clone();
        let sequence = [
            "e2e4", "d7d5", "e4d5", "c7c5", "d5c6", "g8f6", "c6b7", "e7e6", "b7a8q", "f8c5",
            "g1f3", "e8g8", "f1e2", "a7a6", "e1g1",
        ];
        play(&mut game, &sequence);

        let history = game.move_history();
        assert!(history.iter().any(|r| r.is_capture() && !r.is_en_passant()));
        assert!(history.iter().any(|r| r.is_en_passant()));
        assert!(history.iter().any(|r| r.promotion == Some(PieceType::Queen)));
        assert_eq!(history.iter().filter(|r| r.castle.is_some()).count(), 2);
        assert_eq!(game.castling_rights().to_field(), "-");

        for _ in 0..sequence.len() {
            assert!(game.undo());
        }
        assert!(!game.undo(), "history is empty");
        assert_eq!(game.fen(), START_FEN);
        assert_eq!(game.board(), &start_board, "squares, ids and id counter all restored");
        assert!(game.move_history().is_empty());
        assert_eq!(game.castling_rights(), CastlingRights::all());
        assert!(game.en_passant_target().is_none());
        assert_eq!((game.halfmove_clock(), game.fullmove_number()), (0, 1));
        assert_eq!(game.repetitions(&game.position_key()), 1);
        assert_eq!(game.king_square(Color::White), (0, 4));
        assert_eq!(game.king_square(Color::Black), (7, 4));
    }

    #[test]
    fn legality_probe_leaves_position_untouched() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let mut game = Game::from_fen(fen).unwrap();
        let board = game.board().clone();
        let kings = (game.king_square(Color::White), game.king_square(Color::Black));
        game.all_legal_moves();
        assert_eq!(game.board(), &board);
        assert_eq!((game.king_square(Color::White), game.king_square(Color::Black)), kings);
    }

    #[test]
    fn all_legal_moves_matches_select() {
        let mut game = Game::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1").unwrap();
        let all = game.all_legal_moves();
        assert_eq!(all.iter().map(|(_, _, m)| m.len()).sum::<usize>(), 48);
        for (sq, _, moves) in all {
            assert!(game.select(sq));
            assert_eq!(game.possible_moves(), moves.as_slice());
        }
    }

    #[test]
    fn bad_position_strings_are_rejected() {
        assert!(Game::from_fen("").is_err());
        assert!(Game::from_fen("8/8/8/8/8/8/8/8 w - - 0 1").is_err(), "no kings");
        assert!(Game::from_fen("4k3/8/8/8/8/8/8/4K3 x - - 0 1").is_err());
        assert!(Game::from_fen("4k3/8/8/8/8/8/8/4K3 w KX - 0 1").is_err());
        assert!(Game::from_fen("4k3/8/8/8/8/8/8/4K3 w - e4 0 1").is_err());
        assert!(Game::from_fen("4k3/8/8/8/8/8/8/4K3 w - - x 1").is_err());
        assert!(Game::from_fen("4k3/8/8/8/8/8/8/4K3 w - -").is_ok());
        // black's king stands on the rook's file with white to move
        assert!(matches!(
            Game::from_fen("4k3/8/8/8/8/8/8/4RK2 w - - 0 1"),
            Err(ChessError::InvalidFen { .. })
        ));
        assert!(Game::from_fen("4k3/8/8/8/8/8/8/4RK2 b - - 0 1").is_ok(), "check on the side to move is fine");
    }

    #[test]
    fn undoing_a_promotion_restores_the_whole_board() {
        let mut game = Game::from_fen("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        let before = game.board().clone();
        game.apply_uci("a7a8q").unwrap();
        assert_ne!(game.board().next_id(), before.next_id(), "the queen takes a fresh id");
        assert!(game.undo());
        assert_eq!(game.board(), &before);

        // the same holds for a promotion abandoned half way
        assert!(game.select((6, 0)));
        assert!(!game.make_move((7, 0)));
        assert!(game.undo());
        assert_eq!(game.board(), &before);
    }

    #[test]
    fn apply_uci_reports_errors() {
        let mut game = Game::new();
        assert!(matches!(game.apply_uci("e2e5"), Err(ChessError::IllegalMove { .. })));
        assert!(matches!(game.apply_uci("nonsense"), Err(ChessError::InvalidMove { .. })));
        assert!(game.apply_uci("e2e4").is_ok());
    }
}
