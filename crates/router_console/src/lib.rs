//! # Router Console
//!
//! Host application for the message router: parses the command line, loads
//! a TOML configuration, initializes logging and runs the dispatch scenarios.
//!
//! ```bash
//! # Run every scenario with the default configuration file
//! router_console
//!
//! # One scenario, verbose, with statistics as JSON
//! router_console --scenario consume --log-level debug --stats-json
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod scenarios;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Parses arguments, loads configuration, sets up logging and runs.
pub fn init() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let config = AppConfig::load_from_file(&args.config_path)?;

    logging::setup_logging(&config.logging, args.log_level.as_deref(), args.json_logs)?;

    Application::new(args, config).run()?;
    Ok(())
}
