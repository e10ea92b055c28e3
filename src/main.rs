use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use resource_monitor::bridge::{self, MethodCall, ResourceMonitorPlugin};
use resource_monitor::config::{self, Config, load_config, load_config_from_path};
use resource_monitor::logging::{self, LogFormat};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "resource-monitor",
    about = "Report this process's CPU and memory load over a plugin bridge"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: pretty, json
    #[arg(long)]
    log_format: Option<String>,

    /// Send null instead of 0 for readings that could not be taken.
    #[arg(long, default_value_t = false)]
    report_unavailable: bool,

    /// Print one getResourceUsage reply and exit.
    #[arg(long, default_value_t = false, conflicts_with = "method")]
    once: bool,

    /// Issue a single call with this method name and exit.
    #[arg(long)]
    method: Option<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli);

    let level = logging::parse_level(&config.general.log_level)?;
    let format: LogFormat = config.general.log_format.parse().map_err(|e: String| eyre!(e))?;
    logging::init_tracing(level, format)?;

    let plugin = ResourceMonitorPlugin::default()
        .with_channel(config.bridge.channel.as_str())
        .with_report_unavailable(config.bridge.report_unavailable);

    let single_call = if cli.once {
        Some(bridge::GET_RESOURCE_USAGE.to_string())
    } else {
        cli.method.clone()
    };

    if let Some(method) = single_call {
        let reply = plugin.handle(&MethodCall::new(method));
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, &reply)?;
        writeln!(out)?;
        return match reply.error() {
            Some(err) => Err(eyre!("{}: {}", err.code, err.message)),
            None => Ok(()),
        };
    }

    info!(
        channel = plugin.channel(),
        config = ?cli.config.clone().or_else(config::config_path),
        "serving bridge on stdio"
    );
    let replies = plugin.serve(io::stdin().lock(), BufWriter::new(io::stdout().lock()))?;
    info!(replies, "input closed");

    Ok(())
}

fn load_config_for_cli(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(ref level) = cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.general.log_format = format.clone();
    }
    if cli.report_unavailable {
        config.bridge.report_unavailable = true;
    }

    config
}
