/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use clap::{Parser, Subcommand};

use filigree::cli;

#[derive(Parser)]
#[command(
    name = "filigree",
    about = "Succinct de Bruijn graph tools: build, clean, and walk graphs made from short reads.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Build(cli::build::CliArgs),
    TourBus(cli::tour_bus::CliArgs),
    PrintContigs(cli::print_contigs::CliArgs),
    Stat(cli::stat::CliArgs),
}

pub fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match Cli::parse().command {
        Command::Build(args) => cli::build::main(args),
        Command::TourBus(args) => cli::tour_bus::main(args),
        Command::PrintContigs(args) => cli::print_contigs::main(args),
        Command::Stat(args) => cli::stat::main(args),
    }
}
