use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chessai::engine::{AiConfig, Search};
use chessai::game::Game;
use chessai::snapshot::GameSnapshot;

/// Play the engine against itself and print the moves.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON file with an AiConfig; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Search depth in plies
    #[arg(long)]
    depth: Option<u32>,

    /// Tie-break seed, for reproducible games
    #[arg(long)]
    seed: Option<u64>,

    /// Starting position (defaults to the standard start)
    #[arg(long)]
    fen: Option<String>,

    /// Stop after this many plies even if the game is not over
    #[arg(long, default_value_t = 200)]
    max_plies: u32,

    /// Print the final position as a JSON snapshot
    #[arg(long)]
    json: bool,
}

fn load_config(args: &Args) -> Result<AiConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<AiConfig>(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => AiConfig::default(),
    };
    if let Some(depth) = args.depth {
        config.depth = depth;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut game = match &args.fen {
        Some(fen) => Game::from_fen(fen).context("loading --fen")?,
        None => Game::new(),
    };
    info!(depth = config.effective_depth(), seed = ?config.seed, "starting self-play");

    let mut search = Search::new(config);
    let mut plies = 0;
    let mut line = Vec::new();
    while plies < args.max_plies {
        let Some(result) = search.make_move(&mut game) else {
            break;
        };
        line.push(result.mv.to_uci());
        plies += 1;
    }

    println!("{}", line.join(" "));
    print!("{}", game.board());
    info!(plies, status = ?game.status(), fen = %game.fen(), "self-play finished");

    if args.json {
        println!("{}", GameSnapshot::of(&game).to_json()?);
    }
    Ok(())
}
