//! Command-line interface handling for the router console.
//!
//! Uses the `clap` builder API for argument parsing.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Options here override the matching settings from the configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Whether to print the scenario reports, statistics included, as JSON on stdout
    pub stats_json: bool,
    /// Run only the named scenario
    pub scenario: Option<String>,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list; the first item is the binary name.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        Ok(Self::from_matches(&matches))
    }

    fn command() -> Command {
        Command::new("router_console")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Configures a message router and runs its dispatch scenarios")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("router.toml"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("stats-json")
                    .long("stats-json")
                    .help("Print the scenario reports, with each router's statistics, as JSON")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("scenario")
                    .short('s')
                    .long("scenario")
                    .value_name("NAME")
                    .help("Run a single scenario by name"),
            )
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("router.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            stats_json: matches.get_flag("stats-json"),
            scenario: matches.get_one::<String>("scenario").cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["router_console"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("router.toml"));
        assert!(args.log_level.is_none());
        assert!(!args.json_logs);
        assert!(!args.stats_json);
        assert!(args.scenario.is_none());
    }

    #[test]
    fn overrides() {
        let args = CliArgs::try_parse_from([
            "router_console",
            "--config",
            "custom.toml",
            "-l",
            "debug",
            "--json-logs",
            "--stats-json",
            "--scenario",
            "consume",
        ])
        .unwrap();
        assert_eq!(args.config_path, PathBuf::from("custom.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert!(args.stats_json);
        assert_eq!(args.scenario.as_deref(), Some("consume"));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(CliArgs::try_parse_from(["router_console", "--bogus"]).is_err());
    }

    #[test]
    fn stats_json_help_describes_report_output() {
        let command = CliArgs::command();
        let arg = command
            .get_arguments()
            .find(|arg| arg.get_id() == "stats-json")
            .unwrap();
        let help = arg.get_help().unwrap().to_string();
        assert!(help.contains("scenario reports"));
    }
}
