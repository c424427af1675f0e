//! Command-line interface definitions.
//!
//! Defines the CLI structure for the `wsgate` binary using `clap`: running
//! the gateway, diagnosing OS limits, validating configuration, and reading
//! the status file of a running instance.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// WebSocket gateway with admission control and resilient authentication
#[derive(Parser, Debug)]
#[command(name = "wsgate")]
#[command(version, about)]
pub struct Cli {
    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway until interrupted
    Serve(ServeArgs),

    /// Check OS limits against the configured capacity
    Tune(ConfigPathArg),

    /// Validate a configuration file and print the effective values
    CheckConfig(ConfigPathArg),

    /// Show statistics written by a running gateway
    Status(StatusArgs),
}

/// Shared argument for commands that only need a configuration path.
///
/// Without `--config`, `config.toml` in the working directory is used when
/// present and built-in defaults otherwise.
#[derive(Parser, Debug, Default)]
pub struct ConfigPathArg {
    /// Path to the configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for `wsgate serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,

    /// Override `server.bind_address`.
    #[arg(long)]
    pub bind: Option<String>,
}

/// Arguments for `wsgate status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Status file to read; defaults to `server.status_file` from the
    /// configuration.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigPathArg,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_name() {
        assert_eq!(Cli::command().get_name(), "wsgate");
    }

    #[test]
    fn parse_serve_with_overrides() {
        let cli =
            Cli::try_parse_from(["wsgate", "serve", "-c", "gw.toml", "--bind", "127.0.0.1:9000"])
                .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.config.config, Some(PathBuf::from("gw.toml")));
        assert_eq!(args.bind.as_deref(), Some("127.0.0.1:9000"));
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["wsgate", "tune", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Tune(_)));
    }

    #[test]
    fn parse_check_config_and_status() {
        let cli = Cli::try_parse_from(["wsgate", "check-config"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckConfig(ConfigPathArg { config: None })));

        let cli = Cli::try_parse_from(["wsgate", "status", "--file", "/tmp/s.json"]).unwrap();
        let Commands::Status(args) = cli.command else {
            panic!("expected status");
        };
        assert_eq!(args.file, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["wsgate", "launch"]).is_err());
    }
}
