//! Startup configuration.
//!
//! One JSON file configures every process in the stack; each section is
//! namespaced by subsystem and static for the process lifetime. Every field
//! has a compiled-in default so a partial file (or none) is enough to run
//! the simulated stack.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::drive::device::DeviceConfig;
use crate::drive::{SidePair, WheelPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairMap<T> {
    pub front: T,
    pub middle: T,
    pub back: T,
}

impl<T> PairMap<T> {
    pub fn get(&self, pair: WheelPair) -> &T {
        match pair {
            WheelPair::Front => &self.front,
            WheelPair::Middle => &self.middle,
            WheelPair::Back => &self.back,
        }
    }
}

/// Controller axis index assigned to each side. The wiring puts all-left or
/// all-right wheels on one controller, so the mapping is shared by every
/// pair; it is handed to the transport layer at link construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMap {
    pub left: u8,
    pub right: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSection {
    /// Controller identifier (serial) per wheel pair.
    pub controllers: PairMap<String>,
    pub axes: AxisMap,
    pub vel_cmd_multiplier: SidePair,
    pub vel_est_multiplier: SidePair,
    pub current_limit_amps: f32,
    pub watchdog_timeout_s: f32,
}

impl Default for DriveSection {
    fn default() -> Self {
        Self {
            controllers: PairMap {
                front: "335E31483536".into(),
                middle: "335B31483536".into(),
                back: "3352316E3536".into(),
            },
            axes: AxisMap { left: 0, right: 1 },
            // Left and right wheels face opposite directions, so the
            // command multipliers carry opposite signs.
            vel_cmd_multiplier: SidePair { left: 50.0, right: -50.0 },
            vel_est_multiplier: SidePair { left: 0.38, right: -0.38 },
            current_limit_amps: 60.0,
            watchdog_timeout_s: 1.0,
        }
    }
}

impl DriveSection {
    /// Extracts the immutable device configuration for one wheel pair.
    pub fn device_config(&self, pair: WheelPair) -> DeviceConfig {
        DeviceConfig {
            controller_id: self.controllers.get(pair).clone(),
            current_limit_amps: self.current_limit_amps,
            vel_cmd_multiplier: self.vel_cmd_multiplier,
            vel_est_multiplier: self.vel_est_multiplier,
            watchdog_timeout_s: self.watchdog_timeout_s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSection {
    pub host: String,
    pub drive_ports: PairMap<u16>,
    pub netmon_port: u16,
    pub cameras_port: u16,
    pub echo_port: u16,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            drive_ports: PairMap { front: 8101, middle: 8102, back: 8103 },
            netmon_port: 8110,
            cameras_port: 8120,
            echo_port: 8130,
        }
    }
}

impl BusSection {
    pub fn drive_addr(&self, pair: WheelPair) -> String {
        format!("{}:{}", self.host, self.drive_ports.get(pair))
    }

    pub fn netmon_addr(&self) -> String {
        format!("{}:{}", self.host, self.netmon_port)
    }

    pub fn cameras_addr(&self) -> String {
        format!("{}:{}", self.host, self.cameras_port)
    }

    pub fn echo_addr(&self) -> String {
        format!("{}:{}", self.host, self.echo_port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub default_iface: String,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self { default_iface: "eth0".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    /// Number of concurrent stream pipelines.
    pub pipelines: usize,
    /// Highest camera device number probed under /dev/video*.
    pub max_device_id: usize,
    /// Stream endpoint per pipeline.
    pub endpoints: Vec<String>,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            pipelines: 4,
            max_device_id: 10,
            endpoints: vec![
                "10.0.0.7:5000".into(),
                "10.0.0.7:5001".into(),
                "10.0.0.8:5000".into(),
                "10.0.0.8:5001".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub drive: DriveSection,
    pub bus: BusSection,
    pub network: NetworkSection,
    pub cameras: CameraSection,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RoverConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Loads the file if given, otherwise the compiled-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
