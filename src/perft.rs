//! Perft: count the leaf positions of the legal-move tree to a fixed depth.
//! The standard way to check a move generator against published counts.

use crate::game::Game;
use crate::moves::Move;

/// Number of positions reachable from `game` in exactly `depth` plies. The
/// game is walked with `apply`/`undo` and left as it was found.
pub fn perft(game: &mut Game, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let moves = game.legal_move_list();
    if depth == 1 {
        return moves.len() as u64;
    }

    let mut nodes = 0;
    for mv in &moves {
        if game.apply(mv) {
            nodes += perft(game, depth - 1);
            game.undo();
        }
    }
    nodes
}

/// Leaf counts under each root move, in generation order.
pub fn divide(game: &mut Game, depth: u32) -> Vec<(Move, u64)> {
    if depth == 0 {
        return Vec::new();
    }
    game.legal_move_list()
        .into_iter()
        .filter_map(|mv| {
            if !game.apply(&mv) {
                return None;
            }
            let nodes = perft(game, depth - 1);
            game.undo();
            Some((mv, nodes))
        })
        .collect()
}
