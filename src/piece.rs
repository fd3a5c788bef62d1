use serde::{Deserialize, Serialize};

use crate::board::{Board, Square};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Rank step a pawn of this color advances by (rank 0 is White's back rank).
    pub fn pawn_direction(self) -> i32 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    pub fn pawn_start_rank(self) -> usize {
        match self {
            Color::White => 1,
            Color::Black => 6,
        }
    }

    pub fn back_rank(self) -> usize {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }

    /// Rank on which a pawn of this color promotes.
    pub fn promotion_rank(self) -> usize {
        self.opposite().back_rank()
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Color::White => 0,
            Color::Black => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceType {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceType {
    /// Kinds a pawn may promote to, strongest first.
    pub const PROMOTIONS: [PieceType; 4] = [
        PieceType::Queen,
        PieceType::Rook,
        PieceType::Bishop,
        PieceType::Knight,
    ];

    /// Lowercase letter used in position strings and UCI promotions.
    pub fn letter(self) -> char {
        match self {
            PieceType::Pawn => 'p',
            PieceType::Knight => 'n',
            PieceType::Bishop => 'b',
            PieceType::Rook => 'r',
            PieceType::Queen => 'q',
            PieceType::King => 'k',
        }
    }

    pub fn from_letter(c: char) -> Option<PieceType> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceType::Pawn),
            'n' => Some(PieceType::Knight),
            'b' => Some(PieceType::Bishop),
            'r' => Some(PieceType::Rook),
            'q' => Some(PieceType::Queen),
            'k' => Some(PieceType::King),
            _ => None,
        }
    }

    pub fn is_minor(self) -> bool {
        matches!(self, PieceType::Knight | PieceType::Bishop)
    }
}

const KNIGHT_OFFSETS: [(i32, i32); 8] = [
    (-2, -1), (-2, 1), (-1, -2), (-1, 2),
    (1, -2), (1, 2), (2, -1), (2, 1),
];

const KING_OFFSETS: [(i32, i32); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1), (0, 1),
    (1, -1), (1, 0), (1, 1),
];

pub(crate) const STRAIGHT_DIRS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
pub(crate) const DIAGONAL_DIRS: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// A piece on the board. Its square is wherever the board holds it; `id` is a
/// serial number assigned on placement so history records can tell
/// identical-looking pieces apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub piece_type: PieceType,
    pub color: Color,
    pub id: u32,
}

impl Piece {
    pub fn new(piece_type: PieceType, color: Color) -> Self {
        Piece {
            piece_type,
            color,
            id: 0,
        }
    }

    /// Letter for board text: uppercase for White, lowercase for Black.
    pub fn symbol(&self) -> char {
        let c = self.piece_type.letter();
        match self.color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    pub fn from_symbol(c: char) -> Option<Piece> {
        let piece_type = PieceType::from_letter(c)?;
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        Some(Piece::new(piece_type, color))
    }

    /// Destination squares this piece reaches from `from`, ignoring whether the
    /// move would leave its own king in check. Castling and en passant are not
    /// produced here; they depend on game state the piece does not see.
    pub fn moves(&self, board: &Board, from: Square) -> Vec<Square> {
        let mut moves = Vec::new();
        match self.piece_type {
            PieceType::Pawn => self.pawn_moves(board, from, &mut moves),
            PieceType::Knight => self.step_moves(board, from, &KNIGHT_OFFSETS, &mut moves),
            PieceType::Bishop => self.sliding_moves(board, from, &DIAGONAL_DIRS, &mut moves),
            PieceType::Rook => self.sliding_moves(board, from, &STRAIGHT_DIRS, &mut moves),
            PieceType::Queen => {
                self.sliding_moves(board, from, &STRAIGHT_DIRS, &mut moves);
                self.sliding_moves(board, from, &DIAGONAL_DIRS, &mut moves);
            }
            PieceType::King => self.step_moves(board, from, &KING_OFFSETS, &mut moves),
        }
        moves
    }

    fn pawn_moves(&self, board: &Board, (row, col): Square, moves: &mut Vec<Square>) {
        let dir = self.color.pawn_direction();
        let forward = row as i32 + dir;
        if !Board::in_bounds(forward, col as i32) {
            return;
        }
        let forward = forward as usize;

        if board.piece_at((forward, col)).is_none() {
            moves.push((forward, col));

            if row == self.color.pawn_start_rank() {
                let double = (forward as i32 + dir) as usize;
                if board.piece_at((double, col)).is_none() {
                    moves.push((double, col));
                }
            }
        }

        for dc in [-1i32, 1] {
            let c = col as i32 + dc;
            if !Board::in_bounds(forward as i32, c) {
                continue;
            }
            if let Some(p) = board.piece_at((forward, c as usize)) {
                if p.color != self.color {
                    moves.push((forward, c as usize));
                }
            }
        }
    }

    fn step_moves(
        &self,
        board: &Board,
        (row, col): Square,
        offsets: &[(i32, i32)],
        moves: &mut Vec<Square>,
    ) {
        for (dr, dc) in offsets {
            let r = row as i32 + dr;
            let c = col as i32 + dc;
            if !Board::in_bounds(r, c) {
                continue;
            }
            let to = (r as usize, c as usize);
            if board.piece_at(to).map(|p| p.color == self.color).unwrap_or(false) {
                continue;
            }
            moves.push(to);
        }
    }

    fn sliding_moves(
        &self,
        board: &Board,
        (row, col): Square,
        directions: &[(i32, i32)],
        moves: &mut Vec<Square>,
    ) {
        for (dr, dc) in directions {
            let mut r = row as i32 + dr;
            let mut c = col as i32 + dc;
            while Board::in_bounds(r, c) {
                let to = (r as usize, c as usize);
                if let Some(p) = board.piece_at(to) {
                    if p.color != self.color {
                        moves.push(to);
                    }
                    break;
                }
                moves.push(to);
                r += dr;
                c += dc;
            }
        }
    }
}
