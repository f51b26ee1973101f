// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanport — command-line scanner acquisition.
//
// Entry point. Initialises logging, builds the scan service from the
// persisted config, and runs one command. Results are printed as JSON on
// stdout; logs go to stderr.

mod cli;
mod services;

use std::process::ExitCode;

use clap::Parser;
use scanport_acquire::{ResultSink, ScanService};
use scanport_core::error::{Result, ScanportError};
use serde::Serialize;

use cli::{Cli, Commands};
use services::app_services::{self, Overrides};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Scanport starting");

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Run one command; `Ok(false)` means it ran but the scan failed.
async fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::List => {
            let service = app_services::build(&Overrides::default())?;
            let sources = blocking(&service, |svc| {
                svc.initialize()?;
                svc.list_sources()
            })
            .await?;
            print_json(&sources)?;
            Ok(true)
        }
        Commands::Scan {
            source,
            output,
            fallback,
            interactive,
            lang,
        } => {
            let service = app_services::build(&Overrides {
                output_dir: output,
                interactive,
                language: lang,
            })?;
            let output_dir = service.config().output_dir.clone();

            let result = if fallback {
                service.scan_with_fallback(&source, &output_dir).await
            } else {
                match blocking(&service, |svc| svc.initialize()).await {
                    Ok(()) => service.scan(&source, &output_dir).await,
                    Err(err) => ResultSink::failed(&err),
                }
            };
            print_json(&result)?;
            Ok(result.success)
        }
    }
}

/// Run a blocking service call off the async worker threads.
async fn blocking<T, F>(service: &ScanService, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&ScanService) -> Result<T> + Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|e| ScanportError::Initialization(format!("blocking task failed: {e}")))?
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
