//! Spectrometer access.
//!
//! The console talks to hardware through two traits: a [`SpectrometerDriver`]
//! enumerates and opens devices, a [`SpectrometerHandle`] reads one open
//! device. [`session::DeviceSession`] owns at most one handle and serialises
//! every call into it.
//!
//! Backends:
//! * [`simulated`] – synthetic lamp spectrum, can be unplugged at runtime
//! * [`replay`]    – plays back spectra recorded to `.csv`/`.json`/`.parquet`

use std::fmt;

use anyhow::Context;
use thiserror::Error;

use crate::config::{Backend, DeviceSettings};

pub mod replay;
pub mod session;
pub mod simulated;

// ---------------------------------------------------------------------------
// Collaborator seam
// ---------------------------------------------------------------------------

/// Failure reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The device went away (USB unplug, power loss).
    #[error("device unplugged")]
    Unplugged,
    #[error("{0}")]
    Io(String),
}

/// One enumerated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
}

/// Enumerates and opens spectrometers.
pub trait SpectrometerDriver: Send + Sync {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DriverError>;

    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn SpectrometerHandle>, DriverError>;
}

/// An open spectrometer.
///
/// Implementations are not expected to be reentrant; the session never
/// calls into one handle from two threads at once.
pub trait SpectrometerHandle: Send {
    fn model(&self) -> &str;

    /// The native wavelength axis in nanometres.
    fn wavelengths(&mut self) -> Result<Vec<f64>, DriverError>;

    /// Acquire one reading. Blocks for one integration period.
    fn intensities(&mut self) -> Result<Vec<f64>, DriverError>;

    fn set_integration_time_micros(&mut self, micros: u32) -> Result<(), DriverError>;

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), DriverError>;

    fn close(&mut self) -> Result<(), DriverError>;
}

/// Build the backend named in the settings.
pub fn driver_from_settings(settings: &DeviceSettings) -> anyhow::Result<Box<dyn SpectrometerDriver>> {
    match settings.backend {
        Backend::Simulated => Ok(Box::new(simulated::SimulatedDriver::new(
            simulated::SimulatedConfig {
                pixels: settings.pixels,
                ..simulated::SimulatedConfig::default()
            },
        ))),
        Backend::Replay => {
            let path = settings
                .replay_path
                .as_deref()
                .context("device.replay_path is not set")?;
            Ok(Box::new(replay::ReplayDriver::from_file(path)?))
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger mode
// ---------------------------------------------------------------------------

/// Acquisition trigger, numbered as on the operator console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriggerMode {
    /// Free running.
    #[default]
    Normal,
    /// One reading per software request.
    Software,
    /// Wait for the external trigger line.
    External,
}

impl TriggerMode {
    pub const ALL: [TriggerMode; 3] = [TriggerMode::Normal, TriggerMode::Software, TriggerMode::External];

    pub fn number(self) -> u8 {
        match self {
            TriggerMode::Normal => 1,
            TriggerMode::Software => 2,
            TriggerMode::External => 3,
        }
    }
}

impl TryFrom<u8> for TriggerMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TriggerMode::Normal),
            2 => Ok(TriggerMode::Software),
            3 => Ok(TriggerMode::External),
            other => Err(other),
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerMode::Normal => "Normal",
            TriggerMode::Software => "Software",
            TriggerMode::External => "External",
        };
        write!(f, "{} ({name})", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_numbers_round_trip() {
        for mode in TriggerMode::ALL {
            assert_eq!(TriggerMode::try_from(mode.number()), Ok(mode));
        }
        assert_eq!(TriggerMode::try_from(0), Err(0));
        assert_eq!(TriggerMode::try_from(4), Err(4));
    }

    #[test]
    fn backend_from_settings() {
        let sim = DeviceSettings {
            pixels: 32,
            ..DeviceSettings::default()
        };
        let driver = driver_from_settings(&sim).unwrap();
        assert_eq!(driver.list_devices().unwrap()[0].model, "SIM-32");

        let replay = DeviceSettings {
            backend: Backend::Replay,
            ..DeviceSettings::default()
        };
        assert!(driver_from_settings(&replay).is_err());
    }
}
