use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChessError, ChessResult};
use crate::piece::{Color, Piece, PieceType, DIAGONAL_DIRS, STRAIGHT_DIRS};

/// `(rank, file)`; rank 0 is White's back rank, file 0 is the a-file.
pub type Square = (usize, usize);

/// The 8×8 grid. The board owns every piece standing on it and does no
/// legality checking of its own.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Board {
    pub squares: [[Option<Piece>; 8]; 8],
    next_id: u32,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

const BACK_RANK: [PieceType; 8] = [
    PieceType::Rook,
    PieceType::Knight,
    PieceType::Bishop,
    PieceType::Queen,
    PieceType::King,
    PieceType::Bishop,
    PieceType::Knight,
    PieceType::Rook,
];

impl Board {
    /// Create an empty board with no pieces. Useful for setting up test positions.
    pub fn empty() -> Self {
        Board {
            squares: [[None; 8]; 8],
            next_id: 1,
        }
    }

    /// Standard starting position.
    pub fn new() -> Self {
        let mut board = Board::empty();
        for (file, &pt) in BACK_RANK.iter().enumerate() {
            board.place((0, file), Piece::new(pt, Color::White));
            board.place((1, file), Piece::new(PieceType::Pawn, Color::White));
            board.place((6, file), Piece::new(PieceType::Pawn, Color::Black));
            board.place((7, file), Piece::new(pt, Color::Black));
        }
        board
    }

    pub fn in_bounds(row: i32, col: i32) -> bool {
        (0..8).contains(&row) && (0..8).contains(&col)
    }

    pub fn piece_at(&self, (row, col): Square) -> Option<Piece> {
        self.squares[row][col]
    }

    /// Put a new piece on `square`, giving it a fresh serial id. Whatever stood
    /// there before is dropped. Returns the id assigned.
    pub fn place(&mut self, (row, col): Square, mut piece: Piece) -> u32 {
        piece.id = self.next_id;
        self.next_id += 1;
        self.squares[row][col] = Some(piece);
        piece.id
    }

    /// Id the next `place` will hand out.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Wind the id counter back, so undoing a promotion leaves the board
    /// exactly as it was.
    pub(crate) fn restore_next_id(&mut self, next_id: u32) {
        self.next_id = next_id;
    }

    /// Write a cell verbatim, keeping the piece's existing id. Returns the
    /// previous occupant.
    pub fn set(&mut self, (row, col): Square, piece: Option<Piece>) -> Option<Piece> {
        std::mem::replace(&mut self.squares[row][col], piece)
    }

    pub fn remove(&mut self, square: Square) -> Option<Piece> {
        self.set(square, None)
    }

    /// Move whatever stands on `from` to `to`. Returns the piece previously on
    /// `to`, if any.
    pub fn move_piece(&mut self, from: Square, to: Square) -> Option<Piece> {
        let piece = self.remove(from);
        debug_assert!(piece.is_some(), "move_piece from empty square {from:?}");
        self.set(to, piece)
    }

    /// All pieces on the board with their squares, rank 0 first.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        (0..8).flat_map(move |r| {
            (0..8).filter_map(move |c| self.squares[r][c].map(|p| ((r, c), p)))
        })
    }

    pub fn find_king(&self, color: Color) -> Option<Square> {
        self.pieces()
            .find(|(_, p)| p.piece_type == PieceType::King && p.color == color)
            .map(|(sq, _)| sq)
    }

    /// Whether any piece of `attacker` attacks `(row, col)`. Scans outward from
    /// the target, so it works for empty squares too.
    pub fn is_square_attacked_by(&self, (row, col): Square, attacker: Color) -> bool {
        let has = |r: i32, c: i32, types: &[PieceType]| -> bool {
            Board::in_bounds(r, c)
                && self.squares[r as usize][c as usize]
                    .map(|p| p.color == attacker && types.contains(&p.piece_type))
                    .unwrap_or(false)
        };
        let (row, col) = (row as i32, col as i32);

        let knight_offsets: [(i32, i32); 8] = [
            (-2, -1), (-2, 1), (-1, -2), (-1, 2),
            (1, -2), (1, 2), (2, -1), (2, 1),
        ];
        if knight_offsets
            .iter()
            .any(|(dr, dc)| has(row + dr, col + dc, &[PieceType::Knight]))
        {
            return true;
        }

        for dr in -1..=1 {
            for dc in -1..=1 {
                if (dr != 0 || dc != 0) && has(row + dr, col + dc, &[PieceType::King]) {
                    return true;
                }
            }
        }

        // A pawn on (row - dir, col ± 1) attacks (row, col)
        let pawn_row = row - attacker.pawn_direction();
        if has(pawn_row, col - 1, &[PieceType::Pawn]) || has(pawn_row, col + 1, &[PieceType::Pawn]) {
            return true;
        }

        let rays: [(&[(i32, i32)], [PieceType; 2]); 2] = [
            (&STRAIGHT_DIRS, [PieceType::Rook, PieceType::Queen]),
            (&DIAGONAL_DIRS, [PieceType::Bishop, PieceType::Queen]),
        ];
        for (dirs, sliders) in rays {
            for (dr, dc) in dirs {
                let (mut r, mut c) = (row + dr, col + dc);
                while Board::in_bounds(r, c) {
                    if let Some(p) = self.squares[r as usize][c as usize] {
                        if p.color == attacker && sliders.contains(&p.piece_type) {
                            return true;
                        }
                        break;
                    }
                    r += dr;
                    c += dc;
                }
            }
        }

        false
    }

    /// Piece-placement field of a position string: ranks 8 down to 1 joined by
    /// `/`, runs of empty squares written as digits.
    pub fn placement(&self) -> String {
        self.rank_lines().join("/")
    }

    fn rank_lines(&self) -> Vec<String> {
        (0..8)
            .rev()
            .map(|r| {
                let mut line = String::new();
                let mut empty = 0;
                for c in 0..8 {
                    match self.squares[r][c] {
                        Some(p) => {
                            if empty > 0 {
                                line.push_str(&empty.to_string());
                                empty = 0;
                            }
                            line.push(p.symbol());
                        }
                        None => empty += 1,
                    }
                }
                if empty > 0 {
                    line.push_str(&empty.to_string());
                }
                line
            })
            .collect()
    }

    /// Parse a piece-placement field (see [`Board::placement`]).
    pub fn from_placement(text: &str) -> ChessResult<Board> {
        let ranks: Vec<&str> = text.split('/').collect();
        if ranks.len() != 8 {
            return Err(ChessError::fen(format!(
                "expected 8 ranks, found {}",
                ranks.len()
            )));
        }

        let mut board = Board::empty();
        for (i, rank_text) in ranks.iter().enumerate() {
            let row = 7 - i;
            let mut col = 0usize;
            for ch in rank_text.chars() {
                if let Some(n) = ch.to_digit(10) {
                    if !(1..=8).contains(&n) {
                        return Err(ChessError::fen(format!("bad empty-square count '{ch}'")));
                    }
                    col += n as usize;
                } else {
                    let piece = Piece::from_symbol(ch)
                        .ok_or_else(|| ChessError::fen(format!("unknown piece letter '{ch}'")))?;
                    if col >= 8 {
                        return Err(ChessError::fen(format!("rank '{rank_text}' is too long")));
                    }
                    board.place((row, col), piece);
                    col += 1;
                }
                if col > 8 {
                    return Err(ChessError::fen(format!("rank '{rank_text}' is too long")));
                }
            }
            if col != 8 {
                return Err(ChessError::fen(format!("rank '{rank_text}' does not cover 8 files")));
            }
        }
        Ok(board)
    }
}

impl fmt::Display for Board {
    /// One line per rank, rank 8 first.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for line in self.rank_lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
