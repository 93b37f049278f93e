// SPDX-License-Identifier: GPL-3.0-only
//! Scripted hotplug traces
//!
//! A script describes a simulated machine (connectors, DP ports) and then a
//! sequence of interrupts, plug events and pauses to feed into the pipeline.
//! One command per line, `#` starts a comment:
//!
//! ```text
//! connector VGA-1 crt
//! connector DP-1 port-b poll connect
//! digital b fallback
//! start
//! irqs on
//! plug DP-1
//! report port-b long port-b
//! flush
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::config::Config;
use crate::connector::{Connector, ConnectorStatus, PollFlags};
use crate::hotplug::{Hotplug, HpdPin, PinMask, Port};
use crate::platform::{PlatformInfo, PulseOutcome};
use crate::sim::{SimConnector, SimDigitalPort, SimPlatform};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connector {
        name: String,
        pin: HpdPin,
        poll: PollFlags,
        mst: bool,
    },
    Digital {
        port: Port,
        outcome: PulseOutcome,
    },
    Start,
    Irqs(bool),
    Plug(String),
    Unplug(String),
    Report {
        pins: PinMask,
        long: PinMask,
    },
    Sleep(Duration),
    Poll(bool),
    Disable(HpdPin),
    Enable(HpdPin),
    Flush,
    Cancel,
    Threshold(u32),
}

pub fn parse_script(text: &str) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let command = parse_line(line)
            .with_context(|| format!("line {}: '{}'", index + 1, line))?;
        commands.push(command);
    }
    Ok(commands)
}

fn parse_line(line: &str) -> Result<Command> {
    let words: Vec<&str> = line.split_whitespace().collect();

    let command = match words.as_slice() {
        ["connector", name, pin, rest @ ..] => {
            let mut poll = PollFlags::empty();
            let mut mst = false;
            let mut rest = rest.iter();
            while let Some(word) = rest.next() {
                match *word {
                    "poll" => {
                        let flags = rest.next().ok_or_else(|| anyhow!("'poll' needs flags"))?;
                        poll = parse_poll_flags(flags)?;
                    }
                    "mst" => mst = true,
                    other => bail!("unexpected '{}'", other),
                }
            }
            Command::Connector {
                name: name.to_string(),
                pin: parse(pin)?,
                poll,
                mst,
            }
        }
        ["digital", port, outcome] => Command::Digital {
            port: parse(port)?,
            outcome: match *outcome {
                "handled" => PulseOutcome::Handled,
                "fallback" => PulseOutcome::NotHandled,
                other => bail!("expected 'handled' or 'fallback', got '{}'", other),
            },
        },
        ["start"] => Command::Start,
        ["irqs", state] => Command::Irqs(parse_switch(state)?),
        ["plug", name] => Command::Plug(name.to_string()),
        ["unplug", name] => Command::Unplug(name.to_string()),
        ["report", pins] => Command::Report {
            pins: parse_pins(pins)?,
            long: PinMask::empty(),
        },
        ["report", pins, "long", long] => Command::Report {
            pins: parse_pins(pins)?,
            long: parse_pins(long)?,
        },
        ["sleep", ms] => Command::Sleep(Duration::from_millis(parse(ms)?)),
        ["poll", state] => Command::Poll(parse_switch(state)?),
        ["disable", pin] => Command::Disable(parse(pin)?),
        ["enable", pin] => Command::Enable(parse(pin)?),
        ["flush"] => Command::Flush,
        ["cancel"] => Command::Cancel,
        ["threshold", n] => Command::Threshold(parse(n)?),
        _ => bail!("unknown command"),
    };

    Ok(command)
}

fn parse<T>(word: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    word.parse().map_err(|err| anyhow!("{}", err))
}

fn parse_switch(word: &str) -> Result<bool> {
    match word {
        "on" => Ok(true),
        "off" => Ok(false),
        other => bail!("expected 'on' or 'off', got '{}'", other),
    }
}

/// Comma separated pin names
fn parse_pins(word: &str) -> Result<PinMask> {
    word.split(',').map(parse::<HpdPin>).collect()
}

/// Comma separated poll flags, `none` for an empty set
fn parse_poll_flags(word: &str) -> Result<PollFlags> {
    if word == "none" {
        return Ok(PollFlags::empty());
    }
    word.split(',')
        .map(|name| match name {
            "poll" => Ok(PollFlags::POLL),
            name => PollFlags::from_name(&name.to_uppercase())
                .ok_or_else(|| anyhow!("unknown poll flag '{}'", name)),
        })
        .collect()
}

/// Final state of one simulated connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorReport {
    pub name: String,
    pub pin: HpdPin,
    pub poll: PollFlags,
    pub status: ConnectorStatus,
}

/// Runs scripts against a pipeline wired to simulated hardware
pub struct Replay {
    info: PlatformInfo,
    config: Config,
    platform: Arc<SimPlatform>,
    connectors: Vec<Connector>,
    sinks: HashMap<String, Arc<SimConnector>>,
    dig_ports: Vec<(Port, Arc<SimDigitalPort>)>,
    hotplug: Option<Arc<Hotplug>>,
}

impl Replay {
    pub fn new(info: PlatformInfo, config: Config) -> Self {
        Self {
            info,
            config,
            platform: Arc::new(SimPlatform::default()),
            connectors: Vec::new(),
            sinks: HashMap::new(),
            dig_ports: Vec::new(),
            hotplug: None,
        }
    }

    pub fn platform(&self) -> &SimPlatform {
        &self.platform
    }

    pub fn hotplug(&self) -> Option<&Arc<Hotplug>> {
        self.hotplug.as_ref()
    }

    pub fn sink(&self, name: &str) -> Option<&Arc<SimConnector>> {
        self.sinks.get(name)
    }

    pub async fn run(&mut self, commands: &[Command]) -> Result<()> {
        for (step, command) in commands.iter().enumerate() {
            self.execute(command)
                .await
                .with_context(|| format!("step {}: {:?}", step + 1, command))?;
        }
        Ok(())
    }

    pub async fn execute(&mut self, command: &Command) -> Result<()> {
        debug!("replay: {:?}", command);

        match command {
            Command::Connector { name, pin, poll, mst } => {
                self.ensure_not_started()?;
                if self.sinks.contains_key(name) {
                    bail!("connector {} defined twice", name);
                }
                let sink = Arc::new(SimConnector::new(ConnectorStatus::Disconnected));
                let mut connector = Connector::new(name.clone(), *pin, sink.clone())
                    .with_desired_poll(*poll);
                if *mst {
                    connector = connector.mst();
                }
                self.connectors.push(connector);
                self.sinks.insert(name.clone(), sink);
            }
            Command::Digital { port, outcome } => {
                self.ensure_not_started()?;
                let handler = Arc::new(SimDigitalPort::new(*outcome));
                self.dig_ports.push((*port, handler));
            }
            Command::Start => {
                self.ensure_not_started()?;
                let mut builder = Hotplug::builder(self.info, self.platform.clone())
                    .config(self.config.clone());
                for connector in self.connectors.drain(..) {
                    builder = builder.connector(connector);
                }
                for (port, handler) in &self.dig_ports {
                    builder = builder.digital_port(*port, handler.clone())?;
                }
                let hotplug = builder.build()?;
                hotplug.init();
                self.hotplug = Some(hotplug);
            }
            Command::Irqs(enabled) => {
                let hotplug = self.started()?;
                hotplug.set_display_irqs_enabled(*enabled);
                if *enabled {
                    hotplug.init();
                }
            }
            Command::Plug(name) => self.set_sink(name, ConnectorStatus::Connected)?,
            Command::Unplug(name) => self.set_sink(name, ConnectorStatus::Disconnected)?,
            Command::Report { pins, long } => self.started()?.report_hotplug(*pins, *long),
            Command::Sleep(duration) => tokio::time::sleep(*duration).await,
            Command::Poll(enabled) => self.started()?.poll_init(*enabled),
            Command::Disable(pin) => {
                if !self.started()?.disable_pin(*pin) {
                    info!("pin {} was not enabled", pin);
                }
            }
            Command::Enable(pin) => self.started()?.enable_pin(*pin),
            Command::Flush => self.started()?.flush().await,
            Command::Cancel => self.started()?.cancel_all().await,
            Command::Threshold(threshold) => self.started()?.set_storm_threshold(*threshold),
        }

        Ok(())
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.hotplug.is_some() {
            bail!("hardware can only be described before 'start'");
        }
        Ok(())
    }

    fn started(&self) -> Result<&Arc<Hotplug>> {
        self.hotplug
            .as_ref()
            .ok_or_else(|| anyhow!("pipeline not started yet"))
    }

    fn set_sink(&self, name: &str, status: ConnectorStatus) -> Result<()> {
        let sink = self
            .sink(name)
            .ok_or_else(|| anyhow!("no connector named {}", name))?;
        sink.set_status(status);
        Ok(())
    }

    /// Final connector state, in definition order
    pub async fn report(&self) -> Vec<ConnectorReport> {
        let Some(hotplug) = &self.hotplug else {
            return Vec::new();
        };

        let mut reports = Vec::with_capacity(hotplug.connectors().len());
        for (index, connector) in hotplug.connectors().iter().enumerate() {
            reports.push(ConnectorReport {
                name: connector.name.clone(),
                pin: connector.hpd_pin,
                poll: hotplug
                    .connector_poll_flags(index)
                    .unwrap_or(PollFlags::empty()),
                status: hotplug
                    .connector_status(index)
                    .await
                    .unwrap_or(ConnectorStatus::Unknown),
            });
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotplug::PinMode;

    const STORM: &str = "
        # two connectors, DP on a port that declines pulses
        connector VGA-1 crt
        connector DP-1 port-b poll connect
        digital b fallback
        start
        irqs on
        flush
        threshold 5
        report crt
        flush
    ";

    #[test]
    fn test_parse_script() {
        let commands = parse_script(STORM).unwrap();
        assert_eq!(commands.len(), 9);
        assert_eq!(
            commands[1],
            Command::Connector {
                name: "DP-1".into(),
                pin: HpdPin::PortB,
                poll: PollFlags::CONNECT,
                mst: false,
            }
        );
        assert_eq!(
            commands[2],
            Command::Digital {
                port: Port::B,
                outcome: PulseOutcome::NotHandled,
            }
        );
        assert_eq!(
            commands[7],
            Command::Report {
                pins: PinMask::CRT,
                long: PinMask::empty(),
            }
        );
    }

    #[test]
    fn test_parse_masks_and_flags() {
        let script = "report crt,port-b long port-b\nconnector X port-c poll poll mst\nsleep 250";
        let commands = parse_script(script).unwrap();
        assert_eq!(
            commands,
            vec![
                Command::Report {
                    pins: PinMask::CRT | PinMask::PORT_B,
                    long: PinMask::PORT_B,
                },
                Command::Connector {
                    name: "X".into(),
                    pin: HpdPin::PortC,
                    poll: PollFlags::POLL,
                    mst: true,
                },
                Command::Sleep(Duration::from_millis(250)),
            ]
        );
    }

    #[test]
    fn test_parse_error_names_the_line() {
        let err = parse_script("start\n\nreport port-z\n").unwrap_err();
        assert!(format!("{:#}", err).contains("line 3"));

        assert!(parse_script("irqs maybe").is_err());
        assert!(parse_script("digital g handled").is_err());
        assert!(parse_script("connector X crt poll bogus").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_storm_replay() {
        let mut replay = Replay::new(PlatformInfo::default(), Config::default());
        replay.run(&parse_script(STORM).unwrap()).await.unwrap();

        let hotplug = replay.hotplug().unwrap();
        assert_eq!(hotplug.pin_mode(HpdPin::Crt), PinMode::Disabled);
        assert!(hotplug.reenable_deadline().is_some());

        let report = replay.report().await;
        assert_eq!(report[0].poll, PollFlags::POLL);
        assert_eq!(report[1].poll, PollFlags::CONNECT);
        assert_eq!(replay.platform().calls().poll_enables, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_replay_probes_plugged_sink() {
        let script = "
            connector DP-1 port-b
            digital b fallback
            start
            plug DP-1
            report port-b long port-b
            flush
        ";
        let mut replay = Replay::new(PlatformInfo::default(), Config::default());
        replay.run(&parse_script(script).unwrap()).await.unwrap();

        let report = replay.report().await;
        assert_eq!(report[0].status, ConnectorStatus::Connected);
        assert_eq!(replay.sink("DP-1").unwrap().detect_count(), 1);
        assert_eq!(replay.platform().calls().hotplug_events, 1);
    }

    #[tokio::test]
    async fn test_commands_out_of_order() {
        let mut replay = Replay::new(PlatformInfo::default(), Config::default());
        assert!(replay.execute(&Command::Flush).await.is_err());

        replay.execute(&Command::Start).await.unwrap();
        let late = Command::Digital {
            port: Port::A,
            outcome: PulseOutcome::Handled,
        };
        assert!(replay.execute(&late).await.is_err());
        let unknown = Command::Plug("HDMI-A-1".into());
        assert!(replay.execute(&unknown).await.is_err());
    }
}
