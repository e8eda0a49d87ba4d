mod cmd;
mod convert;
mod exit;
mod logging;
mod output;

use callpipe_frame::{CodecConfig, WireVersion, DEFAULT_MAX_PAYLOAD};
use clap::Parser;

use crate::cmd::{Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "callpipe", version, about = "Encode and decode framed calls")]
struct Cli {
    /// Output format for decoded calls.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Tagged-value encoding revision. Both ends of a link must agree.
    #[arg(
        long,
        value_name = "N",
        default_value = "2",
        value_parser = parse_wire_version,
        global = true
    )]
    wire_version: WireVersion,

    /// Largest accepted frame payload in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_PAYLOAD, global = true)]
    max_payload: usize,

    #[command(subcommand)]
    command: Command,
}

fn parse_wire_version(raw: &str) -> Result<WireVersion, String> {
    let number: u8 = raw
        .parse()
        .map_err(|_| format!("expected 1 or 2, got {raw:?}"))?;
    WireVersion::try_from(number).map_err(|err| err.to_string())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let ctx = Context {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        codec: CodecConfig {
            version: cli.wire_version,
            max_payload_size: cli.max_payload,
        },
    };
    let result = cmd::run(cli.command, &ctx);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encode_with_negative_argument() {
        let cli = Cli::try_parse_from(["callpipe", "encode", "add", "-3", "4", "--hex"])
            .expect("encode args should parse");

        match cli.command {
            Command::Encode(args) => {
                assert_eq!(args.name, "add");
                assert_eq!(args.args, vec!["-3".to_string(), "4".to_string()]);
                assert!(args.hex);
            }
            other => panic!("expected encode, got {other:?}"),
        }
    }

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from(["callpipe", "decode", "--input", "frames.bin", "--lines"])
            .expect("decode args should parse");
        assert!(matches!(cli.command, Command::Decode(ref args) if args.lines));
    }

    #[test]
    fn wire_version_flag() {
        let cli = Cli::try_parse_from(["callpipe", "--wire-version", "1", "version"])
            .expect("wire version should parse");
        assert_eq!(cli.wire_version, WireVersion::V1);
        assert_eq!(cli.max_payload, DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn rejects_unknown_wire_version() {
        let err = Cli::try_parse_from(["callpipe", "--wire-version", "3", "version"])
            .expect_err("version 3 should be rejected");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
