// SPDX-License-Identifier: GPL-3.0-only
//! Pipeline configuration
//!
//! Read from `$XDG_CONFIG_HOME/hpd-arbiter/config.kdl`:
//!
//! ```kdl
//! storm-threshold 50
//! short-storm-detection #false
//! reenable-delay-ms 120000
//! ```
//!
//! Every key is optional. A missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kdl::{KdlDocument, KdlNode, KdlValue};

use crate::error::{HpdError, Result};
use crate::hotplug::{DEFAULT_STORM_THRESHOLD, STORM_REENABLE_DELAY, StormPolicy};
use crate::platform::PlatformInfo;

pub const CONFIG_DIR: &str = "hpd-arbiter";
pub const CONFIG_FILE: &str = "config.kdl";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Weighted pulses per second before a pin counts as stormy, 0 disables
    pub storm_threshold: u32,
    /// Count short pulses too. Unset means "only without DP MST".
    pub short_storm_detection: Option<bool>,
    pub reenable_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storm_threshold: DEFAULT_STORM_THRESHOLD,
            short_storm_detection: None,
            reenable_delay_ms: STORM_REENABLE_DELAY.as_millis() as u64,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load `path`, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                info!("Loading configuration from {}", path.display());
                Self::from_kdl(&text)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_kdl(text: &str) -> Result<Self> {
        let doc: KdlDocument = text.parse()?;
        let mut config = Self::default();

        for node in doc.nodes() {
            match node.name().value() {
                "storm-threshold" => config.storm_threshold = integer_arg(node)?,
                "short-storm-detection" => config.short_storm_detection = Some(bool_arg(node)?),
                "reenable-delay-ms" => config.reenable_delay_ms = integer_arg(node)?,
                other => warn!("Ignoring unknown configuration key '{}'", other),
            }
        }

        Ok(config)
    }

    pub fn short_storm_enabled(&self, info: &PlatformInfo) -> bool {
        self.short_storm_detection.unwrap_or(!info.has_dp_mst)
    }

    pub fn storm_policy(&self, info: &PlatformInfo) -> StormPolicy {
        StormPolicy::new(self.storm_threshold, self.short_storm_enabled(info))
    }

    pub fn reenable_delay(&self) -> Duration {
        Duration::from_millis(self.reenable_delay_ms)
    }
}

fn invalid(node: &KdlNode, problem: &str) -> HpdError {
    HpdError::Config(format!("'{}' {}", node.name().value(), problem))
}

fn first_arg(node: &KdlNode) -> Result<&KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(|entry| entry.value())
        .ok_or_else(|| invalid(node, "needs a value"))
}

fn integer_arg<T: TryFrom<i128>>(node: &KdlNode) -> Result<T> {
    first_arg(node)?
        .as_integer()
        .and_then(|value| T::try_from(value).ok())
        .ok_or_else(|| invalid(node, "expects a non-negative integer"))
}

fn bool_arg(node: &KdlNode) -> Result<bool> {
    first_arg(node)?
        .as_bool()
        .ok_or_else(|| invalid(node, "expects #true or #false"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storm_threshold, 50);
        assert_eq!(config.reenable_delay(), Duration::from_secs(120));

        let mst = PlatformInfo::default();
        let no_mst = PlatformInfo {
            has_dp_mst: false,
            ..PlatformInfo::default()
        };
        assert!(!config.short_storm_enabled(&mst));
        assert!(config.short_storm_enabled(&no_mst));
    }

    #[test]
    fn test_parse_all_keys() {
        let config = Config::from_kdl(
            "storm-threshold 5\nshort-storm-detection #true\nreenable-delay-ms 1500\n",
        )
        .unwrap();
        assert_eq!(config.storm_threshold, 5);
        assert_eq!(config.short_storm_detection, Some(true));
        assert_eq!(config.reenable_delay(), Duration::from_millis(1500));
        assert_eq!(
            config.storm_policy(&PlatformInfo::default()),
            StormPolicy::new(5, true)
        );
    }

    #[test]
    fn test_missing_keys_keep_defaults() {
        let config = Config::from_kdl("storm-threshold 0\n").unwrap();
        assert_eq!(config.storm_threshold, 0);
        assert_eq!(config.short_storm_detection, None);
        assert_eq!(config.reenable_delay_ms, 120_000);
    }

    fn rejected(text: &str) -> bool {
        matches!(Config::from_kdl(text), Err(HpdError::Config(_)))
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(rejected("storm-threshold -1\n"));
        assert!(rejected("storm-threshold\n"));
        assert!(rejected("short-storm-detection 1\n"));
        let unparsable = Config::from_kdl("storm-threshold {");
        assert!(matches!(unparsable, Err(HpdError::Kdl(_))));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reenable-delay-ms 10").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.reenable_delay(), Duration::from_millis(10));
    }
}
