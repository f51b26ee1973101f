// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Scanport - acquire images from document scanners
#[derive(Parser, Debug)]
#[command(name = "scanport")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the scanners the driver session can see
    List,

    /// Scan one page (or one feeder batch) and print the result as JSON
    Scan {
        /// Source id as printed by `list`
        source: String,

        /// Output directory (default: from config, usually ~/Documents/Scans)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Watch for a file written by the vendor utility instead of using
        /// the driver protocol
        #[arg(long)]
        fallback: bool,

        /// Show the scanner's own dialog
        #[arg(long)]
        interactive: bool,

        /// OCR language codes joined with '+', e.g. eng+urd
        #[arg(long)]
        lang: Option<String>,
    },
}
