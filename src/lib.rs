pub mod cli;
pub mod commands;
pub mod core;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::core::auth::OfflineAuthProvider;
use crate::core::error::LauncherResult;
use crate::core::events::EventPayload;
use crate::core::paths::LauncherPaths;
use crate::core::state::AppState;

pub async fn run() -> ExitCode {
    // Logs go to stderr; stdout carries the JSON output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,arcend_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!("Arcend launcher {} starting...", env!("CARGO_PKG_VERSION"));

    match dispatch(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Command) -> LauncherResult<ExitCode> {
    let paths = LauncherPaths::resolve()?;
    let username = match &command {
        Command::Play(args) => args.username.clone(),
        _ => None,
    };
    let state = AppState::new(paths, Arc::new(OfflineAuthProvider::new(username)))?;

    match command {
        Command::Play(_) => play(&state).await,
        Command::SetRam(args) => {
            print_json(&commands::set_ram(&state, args.gb).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            print_json(&commands::get_config(&state).await?)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn play(state: &AppState) -> LauncherResult<ExitCode> {
    let mut handle = commands::request_play(state)?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelled = false;

    // After a cancel keep draining until the terminal event is printed.
    // Output of a game that keeps running is not waited for.
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => {
                    print_json(&event)?;
                    let terminal = matches!(
                        &event.payload,
                        EventPayload::Lifecycle(lifecycle) if lifecycle.is_terminal()
                    );
                    if cancelled && terminal {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut ctrl_c, if !cancelled => {
                handle.cancel();
                cancelled = true;
            }
        }
    }

    let outcome = handle.finish().await?;
    print_json(&outcome)?;
    Ok(if outcome.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_json<T: Serialize>(value: &T) -> LauncherResult<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
