//! Application lifecycle for the router console.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::scenarios::{self, ScenarioReport};
use tracing::{error, info};

/// Loaded configuration plus the command line that selected it.
pub struct Application {
    args: CliArgs,
    config: AppConfig,
}

impl Application {
    pub fn new(args: CliArgs, config: AppConfig) -> Self {
        Self { args, config }
    }

    /// Runs the selected scenarios and reports their outcome.
    ///
    /// Fails if any scenario failed or if a named scenario does not exist.
    pub fn run(&self) -> anyhow::Result<Vec<ScenarioReport>> {
        if let Some(name) = self.args.scenario.as_deref() {
            if !scenarios::scenario_names().any(|known| known == name) {
                let known: Vec<_> = scenarios::scenario_names().collect();
                anyhow::bail!(
                    "Unknown scenario '{}', expected one of: {}",
                    name,
                    known.join(", ")
                );
            }
        }

        info!("🚀 Running dispatch scenarios with {:?}", self.config.router);
        let reports = scenarios::run(&self.config.router, self.args.scenario.as_deref());

        for report in &reports {
            if report.passed {
                info!("✅ {}: {}", report.name, report.detail);
            } else {
                error!("❌ {}: {}", report.name, report.detail);
            }
        }

        if self.args.stats_json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }

        let failed = reports.iter().filter(|report| !report.passed).count();
        if failed > 0 {
            anyhow::bail!("{} of {} scenarios failed", failed, reports.len());
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(scenario: Option<&str>) -> CliArgs {
        CliArgs {
            config_path: PathBuf::from("unused.toml"),
            log_level: None,
            json_logs: false,
            stats_json: false,
            scenario: scenario.map(str::to_string),
        }
    }

    #[test]
    fn runs_every_scenario() {
        let app = Application::new(args(None), AppConfig::default());
        let reports = app.run().unwrap();
        assert_eq!(reports.len(), scenarios::SCENARIOS.len());
    }

    #[test]
    fn unknown_scenario_is_an_error() {
        let app = Application::new(args(Some("missing")), AppConfig::default());
        let err = app.run().unwrap_err();
        assert!(err.to_string().contains("Unknown scenario 'missing'"));
    }
}
