use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::data::loader::load_file;
use crate::data::model::Spectrum;

use super::{DeviceInfo, DriverError, SpectrometerDriver, SpectrometerHandle, TriggerMode};

// ---------------------------------------------------------------------------
// Replay driver – plays back recorded spectra
// ---------------------------------------------------------------------------

/// A single virtual device that returns recorded readings in order,
/// wrapping around at the end.
///
/// All recordings must share one wavelength axis; the axis of the first is
/// reported as the device's native axis.
#[derive(Debug, Clone)]
pub struct ReplayDriver {
    name: String,
    spectra: Arc<[Spectrum]>,
}

impl ReplayDriver {
    /// Load every spectrum in `path` (see [`load_file`] for the formats).
    pub fn from_file(path: &Path) -> Result<Self> {
        let spectra = load_file(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("replay")
            .to_string();
        Self::from_spectra(name, spectra).with_context(|| format!("replaying {}", path.display()))
    }

    pub fn from_spectra(name: impl Into<String>, spectra: Vec<Spectrum>) -> Result<Self> {
        let Some(first) = spectra.first() else {
            bail!("no spectra to replay");
        };
        if let Some(i) = spectra
            .iter()
            .position(|sp| sp.wavelengths() != first.wavelengths())
        {
            bail!("spectrum {i} has a different wavelength axis than spectrum 0");
        }
        log::info!("Replay source holds {} spectra of {} samples", spectra.len(), first.len());
        Ok(Self {
            name: name.into(),
            spectra: spectra.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            model: format!("REPLAY:{}", self.name),
            serial: format!("REPLAY{:05}", self.spectra.len()),
        }
    }
}

impl SpectrometerDriver for ReplayDriver {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DriverError> {
        Ok(vec![self.info()])
    }

    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn SpectrometerHandle>, DriverError> {
        if *device != self.info() {
            return Err(DriverError::Io(format!("no such device: {}", device.serial)));
        }
        Ok(Box::new(ReplayHandle {
            model: device.model.clone(),
            spectra: Arc::clone(&self.spectra),
            next: 0,
            integration: Duration::ZERO,
        }))
    }
}

struct ReplayHandle {
    model: String,
    spectra: Arc<[Spectrum]>,
    next: usize,
    integration: Duration,
}

impl SpectrometerHandle for ReplayHandle {
    fn model(&self) -> &str {
        &self.model
    }

    fn wavelengths(&mut self) -> Result<Vec<f64>, DriverError> {
        self.spectra
            .first()
            .map(|sp| sp.wavelengths().to_vec())
            .ok_or_else(|| DriverError::Io("empty replay".to_string()))
    }

    fn intensities(&mut self) -> Result<Vec<f64>, DriverError> {
        if self.spectra.is_empty() {
            return Err(DriverError::Io("empty replay".to_string()));
        }
        thread::sleep(self.integration);
        let reading = self.spectra[self.next].intensities().to_vec();
        self.next = (self.next + 1) % self.spectra.len();
        Ok(reading)
    }

    fn set_integration_time_micros(&mut self, micros: u32) -> Result<(), DriverError> {
        self.integration = Duration::from_micros(u64::from(micros));
        Ok(())
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), DriverError> {
        log::debug!("replay ignores trigger mode {mode}");
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
