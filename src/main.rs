use anyhow::Result;
use clap::Parser;
use parmap::cli::Cli;

fn main() -> Result<()> {
    Cli::parse().run()
}
