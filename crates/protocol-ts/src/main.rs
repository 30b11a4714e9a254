//! Writes TypeScript bindings for the tm-protocol types.
//!
//! The controller imports these to speak the bridge protocol. Types reached
//! from the exported roots are written alongside them.

use clap::Parser;
use std::path::PathBuf;
use tm_protocol::{ActionSummary, Command, Event, GlobalConfig, Key, PlaybackStatus, RunMode, TestScript};
use ts_rs::TS;

#[derive(Parser)]
#[command(name = "tm-protocol-ts")]
#[command(about = "Generate TypeScript bindings for the tomation protocol", long_about = None)]
struct Cli {
    /// Directory the `.ts` files are written to
    #[arg(short, long, default_value = "bindings")]
    out_dir: PathBuf,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.out_dir)?;

    Command::export_all_to(&cli.out_dir)?;
    Event::export_all_to(&cli.out_dir)?;
    ActionSummary::export_all_to(&cli.out_dir)?;
    PlaybackStatus::export_all_to(&cli.out_dir)?;
    RunMode::export_all_to(&cli.out_dir)?;
    Key::export_all_to(&cli.out_dir)?;
    GlobalConfig::export_all_to(&cli.out_dir)?;
    TestScript::export_all_to(&cli.out_dir)?;

    println!("TypeScript bindings written to {}", cli.out_dir.display());
    Ok(())
}
