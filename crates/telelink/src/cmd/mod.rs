use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use telelink_transport::Identity;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod parse;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse an endpoint descriptor and print its fields.
    Parse(ParseArgs),
    /// Open an endpoint and print received messages.
    Listen(ListenArgs),
    /// Open an endpoint and send a message.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, identity: Identity) -> CliResult<i32> {
    match command {
        Command::Parse(args) => parse::run(args, format),
        Command::Listen(args) => listen::run(args, format, identity),
        Command::Send(args) => send::run(args, identity),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Endpoint descriptor, e.g. `udp://0.0.0.0:14555@` or `/dev/ttyUSB0:115200`.
    pub url: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Endpoint descriptor to open.
    #[arg(env = "TELELINK_URL")]
    pub url: String,
    /// Only print these message ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub msg_ids: Option<Vec<u8>>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Give up if nothing arrives for this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub idle_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Endpoint descriptor to open.
    #[arg(env = "TELELINK_URL")]
    pub url: String,
    /// Message id.
    #[arg(long, short = 'm', default_value = "0")]
    pub msg_id: u8,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Number of times to send the message.
    #[arg(long, default_value = "1")]
    pub count: u32,
    /// Delay between repeated sends (e.g. 1s, 200ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
