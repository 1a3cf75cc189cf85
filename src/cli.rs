use clap::{Parser, Subcommand};

/// Keeps the Arcend game bundle up to date and launches it.
#[derive(Parser, Debug)]
#[command(name = "arcend", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Update the game files if needed, then start the game.
    ///
    /// Session events are printed to stdout as JSON lines.
    Play(PlayArgs),

    /// Set the maximum heap size in GB.
    SetRam(SetRamArgs),

    /// Print the persisted settings.
    Config,
}

#[derive(clap::Args, Debug)]
pub struct PlayArgs {
    /// Offline player name.
    #[arg(long)]
    pub username: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct SetRamArgs {
    /// Heap size in GB.
    pub gb: u32,
}
