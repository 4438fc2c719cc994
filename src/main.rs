//! Search harness executable for PolicyForge.

use anyhow::Result;
use clap::Parser;
use policyforge_search::cli::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
