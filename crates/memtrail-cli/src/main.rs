use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "memtrail")]
#[command(about = "Pointer-path and pattern tooling for memory dumps")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a pointer-path expression and show its structure
    Parse {
        /// Expression, e.g. "game.exe"+1F016644,13,A0,0
        expression: String,
    },

    /// Evaluate a pointer path against a memory dump file
    Eval {
        expression: String,

        /// Dump file treated as the target's memory image
        #[arg(short, long)]
        image: PathBuf,

        /// Address the image is mapped at (hex, 0x prefix optional)
        #[arg(short, long, value_parser = parse_hex, default_value = "0")]
        base: u64,

        /// Pointer width of the simulated target
        #[arg(long, value_enum, default_value_t = BitnessArg::Bits64)]
        bitness: BitnessArg,
    },

    /// Scan a memory dump file for a masked byte pattern
    Scan {
        /// Pattern, e.g. "48 8D ?? ?? 5?"
        pattern: String,

        #[arg(short, long)]
        image: PathBuf,

        #[arg(short, long, value_parser = parse_hex, default_value = "0")]
        base: u64,

        /// Stop after this many matches
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum BitnessArg {
    #[value(name = "32")]
    Bits32,
    #[value(name = "64")]
    Bits64,
}

impl From<BitnessArg> for memtrail_core::Bitness {
    fn from(arg: BitnessArg) -> Self {
        match arg {
            BitnessArg::Bits32 => memtrail_core::Bitness::Bits32,
            BitnessArg::Bits64 => memtrail_core::Bitness::Bits64,
        }
    }
}

fn parse_hex(value: &str) -> Result<u64, String> {
    let trimmed = value.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(trimmed, 16).map_err(|e| format!("invalid hex address '{value}': {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("memtrail=info".parse()?))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Parse { expression } => commands::parse::run(&expression),
        Command::Eval {
            expression,
            image,
            base,
            bitness,
        } => commands::eval::run(&expression, &image, base, bitness.into()),
        Command::Scan {
            pattern,
            image,
            base,
            limit,
        } => commands::scan::run(&pattern, &image, base, limit),
    }
}
