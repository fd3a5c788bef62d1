use serde::{Deserialize, Serialize};

use crate::board::Square;
use crate::error::{ChessError, ChessResult};
use crate::game::{CastlingRights, EnPassantTarget};
use crate::piece::{Piece, PieceType};

/// Algebraic name of a square, e.g. `(0, 4)` -> "e1".
pub fn square_name((row, col): Square) -> String {
    let f = (b'a' + col as u8) as char;
    let r = (b'1' + row as u8) as char;
    format!("{f}{r}")
}

pub fn parse_square(s: &str) -> ChessResult<Square> {
    let invalid = || ChessError::InvalidSquare { name: s.to_string() };
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return Err(invalid());
    }
    let (f, r) = (bytes[0], bytes[1]);
    if !(b'a'..=b'h').contains(&f) || !(b'1'..=b'8').contains(&r) {
        return Err(invalid());
    }
    Ok(((r - b'1') as usize, (f - b'a') as usize))
}

/// A concrete move as the search and the binaries see it.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceType>,
}

impl Move {
    pub fn new(from: Square, to: Square) -> Self {
        Move {
            from,
            to,
            promotion: None,
        }
    }

    /// Convert to UCI notation, e.g. "e2e4", "a7a8q"
    pub fn to_uci(&self) -> String {
        let promo = self.promotion.map(|pt| pt.letter().to_string()).unwrap_or_default();
        format!("{}{}{promo}", square_name(self.from), square_name(self.to))
    }

    /// Parse from UCI notation
    pub fn from_uci(s: &str) -> ChessResult<Move> {
        let invalid = || ChessError::InvalidMove { text: s.to_string() };
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            return Err(invalid());
        }
        let from = parse_square(&s[0..2]).map_err(|_| invalid())?;
        let to = parse_square(&s[2..4]).map_err(|_| invalid())?;
        let promotion = match s[4..].chars().next() {
            None => None,
            Some(c) => match PieceType::from_letter(c) {
                Some(pt) if PieceType::PROMOTIONS.contains(&pt) && c.is_ascii_lowercase() => Some(pt),
                _ => return Err(invalid()),
            },
        };
        Ok(Move {
            from,
            to,
            promotion,
        })
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum CastleSide {
    Kingside,
    Queenside,
}

impl CastleSide {
    /// King destination file.
    pub fn king_file(self) -> usize {
        match self {
            CastleSide::Kingside => 6,
            CastleSide::Queenside => 2,
        }
    }

    pub fn rook_from_file(self) -> usize {
        match self {
            CastleSide::Kingside => 7,
            CastleSide::Queenside => 0,
        }
    }

    pub fn rook_to_file(self) -> usize {
        match self {
            CastleSide::Kingside => 5,
            CastleSide::Queenside => 3,
        }
    }
}

/// Rook half of a castling move.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RookShift {
    pub rook: Piece,
    pub from: Square,
    pub to: Square,
}

/// One applied move. Carries everything needed to take the move back exactly.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MoveRecord {
    /// The piece as it stood on `from` (a pawn, for promotions).
    pub piece: Piece,
    pub from: Square,
    pub to: Square,
    pub captured: Option<Piece>,
    /// Square the captured piece stood on; differs from `to` for en passant.
    pub captured_square: Option<Square>,
    pub halfmove_clock_before: u32,
    pub castling_before: CastlingRights,
    pub en_passant_before: Option<EnPassantTarget>,
    /// Board id counter before the move; a promotion draws a fresh id.
    pub next_id_before: u32,
    pub promotion: Option<PieceType>,
    pub castle: Option<CastleSide>,
    pub rook_shift: Option<RookShift>,
}

impl MoveRecord {
    pub fn is_capture(&self) -> bool {
        self.captured.is_some()
    }

    pub fn is_en_passant(&self) -> bool {
        self.captured_square.map(|sq| sq != self.to).unwrap_or(false)
    }

    pub fn as_move(&self) -> Move {
        Move {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }
}
