// SPDX-License-Identifier: GPL-3.0-only
//! `hpd-replay`: feed a scripted hotplug trace through the pipeline

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::Instant;

use hpd_arbiter::config::Config;
use hpd_arbiter::platform::PlatformInfo;
use hpd_arbiter::scenario::{Replay, parse_script};

#[macro_use]
extern crate tracing;

#[derive(Parser)]
#[command(name = "hpd-replay")]
#[command(version)]
#[command(about = "Replay display hotplug traces against simulated hardware")]
struct Args {
    /// Configuration file, defaults to $XDG_CONFIG_HOME/hpd-arbiter/config.kdl
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hardware latches hotplug status of masked pins
    #[arg(long)]
    latches_masked_hpd: bool,

    /// Hardware without hotplug interrupts
    #[arg(long)]
    no_hotplug: bool,

    /// Hardware without DP multi-stream transport
    #[arg(long)]
    no_mst: bool,

    /// Port F shares the port-E hotplug line
    #[arg(long)]
    port_f_on_hpd_e: bool,

    /// Script to replay, standard input if omitted
    script: Option<PathBuf>,
}

impl Args {
    fn platform_info(&self) -> PlatformInfo {
        PlatformInfo {
            latches_masked_hpd: self.latches_masked_hpd,
            has_hotplug: !self.no_hotplug,
            has_dp_mst: !self.no_mst,
            port_f_on_hpd_e: self.port_f_on_hpd_e,
        }
    }

    fn load_config(&self) -> Result<Config> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => match Config::default_path() {
                Some(path) => path,
                None => {
                    warn!("No configuration directory, using defaults");
                    return Ok(Config::default());
                }
            },
        };
        Config::load(&path)
            .with_context(|| format!("loading {}", path.display()))
    }

    fn read_script(&self) -> Result<String> {
        match &self.script {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display())),
            None => {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .context("reading standard input")?;
                Ok(text)
            }
        }
    }
}

fn setup_logs() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(format!(
        "warn,hpd_arbiter=info,{}=info",
        env!("CARGO_CRATE_NAME")
    )));

    if let Ok(journal_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(journal_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logs();
    let args = Args::parse();

    let config = args.load_config()?;
    let commands = parse_script(&args.read_script()?)?;
    info!("Replaying {} command(s)", commands.len());

    let mut replay = Replay::new(args.platform_info(), config);
    replay.run(&commands).await?;

    let Some(hotplug) = replay.hotplug() else {
        warn!("Script never started the pipeline");
        return Ok(());
    };
    hotplug.flush().await;

    for connector in replay.report().await {
        info!(
            "{}: pin {} ({}), polling {}, {}",
            connector.name,
            connector.pin,
            hotplug.pin_mode(connector.pin),
            connector.poll,
            connector.status
        );
    }

    let calls = replay.platform().calls();
    info!(
        "{} irq setup(s), {} poll enable(s), {} hotplug event(s), {} reprobe(s)",
        calls.irq_setups.len(),
        calls.poll_enables,
        calls.hotplug_events,
        calls.reprobes
    );
    if let Some(deadline) = hotplug.reenable_deadline() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        info!("Storm re-enable pending in {:?}", remaining);
    }

    hotplug.cancel_all().await;
    Ok(())
}
