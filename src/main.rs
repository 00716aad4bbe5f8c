//! deck-sync - diagnostic CLI for the reconciliation engine.
//!
//! The full Markdown workflow (parser, watcher, credentials) lives in the
//! surrounding tooling; this binary exposes the planner for inspection:
//! feed it two slide fixtures and it prints the edit script the engine
//! would execute.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use deck_sync::model::image::MatchOptions;
use deck_sync::{generate_actions, Action, Slide};

#[derive(Parser, Debug)]
#[command(name = "deck-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the action plan between two slide fixtures (JSON).
    Plan {
        /// The currently hosted deck.
        before: PathBuf,
        /// The desired deck.
        after: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Plan { before, after } => run_plan(&before, &after),
    }
}

fn run_plan(before: &PathBuf, after: &PathBuf) -> ExitCode {
    let before = match load_slides(before) {
        Ok(slides) => slides,
        Err(e) => {
            error!("failed to load {}: {e}", before.display());
            return ExitCode::FAILURE;
        }
    };
    let after = match load_slides(after) {
        Ok(slides) => slides,
        Err(e) => {
            error!("failed to load {}: {e}", after.display());
            return ExitCode::FAILURE;
        }
    };

    let plan = match generate_actions(&before, &after, &MatchOptions::default()) {
        Ok(plan) => plan,
        Err(e) => {
            error!("planning failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if plan.is_empty() {
        println!("no changes");
        return ExitCode::SUCCESS;
    }
    for action in &plan {
        match action {
            Action::Append { slide } => println!("append   {}", slide_label(slide)),
            Action::Update { index, slide } => {
                println!("update   {index}: {}", slide_label(slide))
            }
            Action::Move { index, move_to, .. } => println!("move     {index} -> {move_to}"),
            Action::Delete { index } => println!("delete   {index}"),
        }
    }
    println!("{} action(s)", plan.len());
    ExitCode::SUCCESS
}

fn load_slides(path: &PathBuf) -> Result<Vec<Slide>, String> {
    let data = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&data).map_err(|e| e.to_string())
}

fn slide_label(slide: &Slide) -> String {
    slide
        .titles
        .first()
        .cloned()
        .unwrap_or_else(|| format!("[{}]", slide.layout))
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("deck_sync={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
