//! dashprobe CLI - Main Entry Point
//!
//! Runs the microclimate dashboard acceptance suite in Chrome and prints
//! a per-step summary. Exit status: 0 when the success cutoff is met,
//! 1 when it is not, 2 when the configuration cannot be loaded.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dashprobe_e2e::config::{OutputConfig, DEFAULT_CONFIG_FILE};
use dashprobe_e2e::{run_dashboard, RunnerConfig};

mod output;

use output::{print_error, print_info, print_success, OutputFormat};

/// dashprobe - resilient acceptance tests for the IoT microclimate dashboard
#[derive(Parser)]
#[command(name = "dashprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "DASHPROBE_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Dashboard base URL
    #[arg(long, env = "DASHPROBE_BASE_URL")]
    base_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Root directory for reports, logs and screenshots
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Share of passed or warned steps required for success
    #[arg(long)]
    cutoff: Option<f64>,

    /// Download dialog password
    #[arg(long, env = "DASHPROBE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Password expected to be rejected
    #[arg(long, env = "DASHPROBE_WRONG_PASSWORD", hide_env_values = true)]
    wrong_password: Option<String>,

    /// Summary format
    #[arg(long, default_value = "table")]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the acceptance suite (default)
    Run,

    /// Write the effective configuration to a file
    InitConfig {
        /// Destination path
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,
    },

    /// Show version information
    Version,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<RunnerConfig> {
        let mut config = RunnerConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if let Some(url) = &self.base_url {
            config.target.base_url = url.clone();
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(root) = &self.output {
            let rooted = OutputConfig::rooted_at(root);
            config.output.report_dir = rooted.report_dir;
            config.output.log_dir = rooted.log_dir;
            config.output.screenshot_dir = rooted.screenshot_dir;
        }
        if let Some(cutoff) = self.cutoff {
            config.run.success_cutoff = cutoff;
        }
        if let Some(password) = &self.password {
            config.credentials.password = password.clone();
        }
        if let Some(password) = &self.wrong_password {
            config.credentials.wrong_password = password.clone();
        }

        config
            .validate()
            .with_context(|| format!("validating {}", self.config.display()))?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("{:#}", e));
            std::process::exit(2);
        }
    };

    tracing::debug!(
        "Loaded {} ({} stations, {} filters)",
        cli.config.display(),
        config.target.stations.len(),
        config.target.time_filters.len()
    );

    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => {
            print_info(&format!("Testing {}", config.target.base_url));
            let outcome = run_dashboard(&config).await?;
            output::print_summary(&outcome, cli.format);
            std::process::exit(outcome.exit_code());
        }
        Commands::InitConfig { path } => {
            config.save(path)?;
            print_success(&format!("Configuration written to {}", path.display()));
        }
        Commands::Version => {
            println!("dashprobe v{}", dashprobe_common::VERSION);
            println!("Target: {}", config.target.base_url);
        }
    }

    Ok(())
}
