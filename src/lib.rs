pub mod board;
pub mod engine;
pub mod error;
pub mod game;
pub mod moves;
pub mod perft;
pub mod piece;
pub mod snapshot;
