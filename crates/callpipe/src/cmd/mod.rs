use std::path::PathBuf;

use callpipe_frame::CodecConfig;
use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod version;

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub format: OutputFormat,
    pub codec: CodecConfig,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode one call and write its frame to stdout.
    Encode(EncodeArgs),
    /// Decode frames from stdin or a file and print the calls.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, ctx),
        Command::Decode(args) => decode::run(args, ctx),
        Command::Version(args) => version::run(args, ctx),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Call name.
    pub name: String,
    /// Arguments, each parsed as JSON or taken as a plain string. At most
    /// eight are encoded.
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<String>,
    /// Print the frame as a hex line instead of raw bytes.
    #[arg(long)]
    pub hex: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Read from this file instead of stdin.
    #[arg(long, short = 'i', value_name = "FILE")]
    pub input: Option<PathBuf>,
    /// Treat input as text with one hex-encoded frame per line.
    #[arg(long)]
    pub lines: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
