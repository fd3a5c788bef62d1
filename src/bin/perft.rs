use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chessai::game::Game;
use chessai::perft::{divide, perft};

/// Count leaf positions of the legal-move tree.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Depth in plies
    #[arg(long, default_value_t = 4)]
    depth: u32,

    /// Position to start from (defaults to the standard start)
    #[arg(long)]
    fen: Option<String>,

    /// Print the count under each root move
    #[arg(long)]
    divide: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut game = match &args.fen {
        Some(fen) => Game::from_fen(fen).context("loading --fen")?,
        None => Game::new(),
    };

    let start = Instant::now();
    let nodes = if args.divide {
        let split = divide(&mut game, args.depth);
        for (mv, count) in &split {
            println!("{}: {count}", mv.to_uci());
        }
        split.iter().map(|(_, n)| n).sum::<u64>()
    } else {
        perft(&mut game, args.depth)
    };
    println!("{nodes}");

    let elapsed = start.elapsed();
    info!(
        depth = args.depth,
        nodes,
        ms = elapsed.as_millis() as u64,
        nps = (nodes as f64 / elapsed.as_secs_f64().max(1e-9)) as u64,
        "perft done"
    );
    Ok(())
}
