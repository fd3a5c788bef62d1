//! Error types for parsing positions and moves.
//!
//! Normal game-flow rejections (selecting an empty square, an illegal
//! destination, undo on an empty history) are reported through boolean
//! returns on `Game`, not through this type.

use thiserror::Error;

/// Errors produced while reading external text or driving a game from it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    /// Malformed position string
    #[error("Invalid position string: {message}")]
    InvalidFen { message: String },

    /// Square name that is not file a-h followed by rank 1-8
    #[error("Invalid square: {name}")]
    InvalidSquare { name: String },

    /// Move text that is not in from-square/to-square[/promotion] form
    #[error("Invalid move text: {text}")]
    InvalidMove { text: String },

    /// Well-formed move that is not legal in the current position
    #[error("Illegal move: {text}")]
    IllegalMove { text: String },

    /// A pawn reached the last rank and is waiting for its new piece kind
    #[error("A promotion is pending")]
    PromotionPending,
}

impl ChessError {
    pub(crate) fn fen(message: impl Into<String>) -> Self {
        ChessError::InvalidFen {
            message: message.into(),
        }
    }
}

/// Result type alias for fallible chess operations
pub type ChessResult<T> = Result<T, ChessError>;
