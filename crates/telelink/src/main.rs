mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use telelink_transport::Identity;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "telelink", version, about = "Telemetry link CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// System id stamped on sent messages.
    #[arg(long, env = "TELELINK_SYSTEM_ID", default_value = "1", global = true)]
    system_id: u8,

    /// Component id stamped on sent messages.
    #[arg(long, env = "TELELINK_COMPONENT_ID", default_value = "240", global = true)]
    component_id: u8,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let identity = Identity::new(cli.system_id, cli.component_id);
    let result = cmd::run(cli.command, format, identity);

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
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "telelink",
            "send",
            "udp://:14555@127.0.0.1:14550",
            "--msg-id",
            "0",
            "--hex",
            "00010203",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
        assert_eq!((cli.system_id, cli.component_id), (1, 240));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "telelink",
            "send",
            "tcp://localhost:5760",
            "--hex",
            "00",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn identity_flags_are_global() {
        let cli = Cli::try_parse_from([
            "telelink",
            "listen",
            "tcp-listen://:5760",
            "--system-id",
            "42",
            "--component-id",
            "190",
            "--msg-ids",
            "0,30",
        ])
        .expect("listen args should parse");

        assert_eq!((cli.system_id, cli.component_id), (42, 190));
        match cli.command {
            Command::Listen(args) => assert_eq!(args.msg_ids, Some(vec![0, 30])),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_system_id() {
        let err = Cli::try_parse_from(["telelink", "--system-id", "256", "parse", "tcp://"])
            .expect_err("256 is not a u8");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
