use serde::{Deserialize, Serialize};

use crate::game::{Game, GameStatus};
use crate::moves::square_name;
use crate::piece::{Color, PieceType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquarePiece {
    pub piece_type: PieceType,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMove {
    pub from: [usize; 2],
    pub to: [usize; 2],
    pub uci: String,
    /// Drives the capture sound in a front end.
    pub capture: bool,
    pub promotion: Option<PieceType>,
}

/// Everything a front end needs to draw the game and prompt the player,
/// as plain serializable data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// `squares[rank][file]`, rank 0 = White's back rank.
    pub squares: Vec<Vec<Option<SquarePiece>>>,
    pub current_turn: Color,
    pub status: GameStatus,
    pub is_in_check: bool,
    pub selected: Option<[usize; 2]>,
    pub possible_moves: Vec<[usize; 2]>,
    pub last_move: Option<LastMove>,
    /// Piece kinds White has lost, in capture order.
    pub captured_white: Vec<PieceType>,
    pub captured_black: Vec<PieceType>,
    pub fen: String,
}

impl GameSnapshot {
    pub fn of(game: &Game) -> Self {
        let board = game.board();
        let squares = (0..8)
            .map(|r| {
                (0..8)
                    .map(|c| {
                        board.piece_at((r, c)).map(|p| SquarePiece {
                            piece_type: p.piece_type,
                            color: p.color,
                        })
                    })
                    .collect()
            })
            .collect();

        let captured = |color: Color| -> Vec<PieceType> {
            game.move_history()
                .iter()
                .filter_map(|r| r.captured)
                .filter(|p| p.color == color)
                .map(|p| p.piece_type)
                .collect()
        };

        let last_move = game.last_move().map(|r| LastMove {
            from: [r.from.0, r.from.1],
            to: [r.to.0, r.to.1],
            uci: r.as_move().to_uci(),
            capture: r.is_capture(),
            promotion: r.promotion,
        });

        GameSnapshot {
            squares,
            current_turn: game.current_turn(),
            status: game.status(),
            is_in_check: game.is_in_check(game.current_turn(), None),
            selected: game.selected().map(|(r, c)| [r, c]),
            possible_moves: game.possible_moves().iter().map(|&(r, c)| [r, c]).collect(),
            last_move,
            captured_white: captured(Color::White),
            captured_black: captured(Color::Black),
            fen: game.fen(),
        }
    }

    /// Square names of the current selection's destinations, e.g. `["e3", "e4"]`.
    pub fn possible_move_names(&self) -> Vec<String> {
        self.possible_moves.iter().map(|&[r, c]| square_name((r, c))).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
