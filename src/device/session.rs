use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock};
use thiserror::Error;

use crate::data::model::Spectrum;

use super::{DeviceInfo, DriverError, SpectrometerDriver, SpectrometerHandle, TriggerMode};

// ---------------------------------------------------------------------------
// Errors and status
// ---------------------------------------------------------------------------

/// Accepted integration times, in milliseconds.
pub const INTEGRATION_RANGE_MS: RangeInclusive<u32> = 1..=1000;

/// Integration time applied on connect unless configured otherwise.
pub const DEFAULT_INTEGRATION_MS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("No spectrometer found")]
    NotFound,

    #[error("Spectrometer is not connected")]
    NotConnected,

    #[error("Spectrometer is busy")]
    Busy,

    /// The device disappeared mid-session; the session is now closed.
    #[error("Spectrometer lost: {0}")]
    Lost(String),

    #[error("Spectrometer error: {0}")]
    Device(String),

    #[error("Integration time must be between 1 and 1000 ms, got {ms}")]
    InvalidRange { ms: u32 },

    #[error("Trigger mode must be 1, 2 or 3, got {0}")]
    InvalidTriggerMode(u8),
}

impl DeviceError {
    /// Whether the session no longer has a device to read from.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, DeviceError::NotConnected | DeviceError::Lost(_))
    }
}

/// Connection state as shown on the console status label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceStatus {
    #[default]
    Disconnected,
    Connected { model: String },
    NotFound,
    Error(String),
}

impl DeviceStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceStatus::Connected { .. })
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Disconnected => write!(f, "Spectrometer Disconnected"),
            DeviceStatus::Connected { model } => write!(f, "Spectrometer Detected: {model}"),
            DeviceStatus::NotFound => write!(f, "No spectrometer found"),
            DeviceStatus::Error(msg) => write!(f, "{msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Device session
// ---------------------------------------------------------------------------

struct Open {
    handle: Box<dyn SpectrometerHandle>,
    info: DeviceInfo,
    model: String,
    /// Native axis, read once on connect.
    wavelengths: Vec<f64>,
}

/// Acquisition parameters of the open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Params {
    integration_ms: u32,
    trigger: TriggerMode,
}

/// Lifecycle of the single connected spectrometer.
///
/// Every call into the handle goes through `gate`, so at most one capture
/// is in flight. `status` and `params` live outside the gate and can be
/// read while a capture is blocking.
pub struct DeviceSession {
    driver: Box<dyn SpectrometerDriver>,
    default_integration_ms: u32,
    gate: Mutex<Option<Open>>,
    status: RwLock<DeviceStatus>,
    params: RwLock<Option<Params>>,
    captures: AtomicU64,
}

impl DeviceSession {
    pub fn new(driver: Box<dyn SpectrometerDriver>) -> Self {
        Self::with_default_integration(driver, DEFAULT_INTEGRATION_MS)
    }

    pub fn with_default_integration(driver: Box<dyn SpectrometerDriver>, integration_ms: u32) -> Self {
        Self {
            driver,
            default_integration_ms: integration_ms.clamp(*INTEGRATION_RANGE_MS.start(), *INTEGRATION_RANGE_MS.end()),
            gate: Mutex::new(None),
            status: RwLock::new(DeviceStatus::Disconnected),
            params: RwLock::new(None),
            captures: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.read().is_connected()
    }

    /// Number of successful captures since the session was created.
    pub fn capture_count(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: DeviceStatus) {
        log::info!("{status}");
        *self.status.write() = status;
    }

    /// Open the first attached spectrometer.
    ///
    /// Applies the default integration time and caches the wavelength axis.
    /// Connecting while already connected returns the open device.
    pub fn connect(&self) -> Result<DeviceInfo, DeviceError> {
        let mut gate = self.gate.lock();
        if let Some(open) = gate.as_ref() {
            return Ok(open.info.clone());
        }

        match self.open_first() {
            Ok(open) => {
                self.set_status(DeviceStatus::Connected {
                    model: open.model.clone(),
                });
                let info = open.info.clone();
                *gate = Some(open);
                *self.params.write() = Some(Params {
                    integration_ms: self.default_integration_ms,
                    trigger: TriggerMode::default(),
                });
                Ok(info)
            }
            Err(DeviceError::NotFound) => {
                self.set_status(DeviceStatus::NotFound);
                Err(DeviceError::NotFound)
            }
            Err(e) => {
                self.set_status(DeviceStatus::Error(format!("Failed to detect spectrometer: {e}")));
                Err(e)
            }
        }
    }

    fn open_first(&self) -> Result<Open, DeviceError> {
        let devices = self.driver.list_devices().map_err(device_error)?;
        let info = devices.into_iter().next().ok_or(DeviceError::NotFound)?;

        let mut handle = self.driver.open(&info).map_err(device_error)?;
        handle
            .set_integration_time_micros(self.default_integration_ms * 1000)
            .map_err(device_error)?;
        let wavelengths = handle.wavelengths().map_err(device_error)?;

        Ok(Open {
            model: handle.model().to_string(),
            handle,
            info,
            wavelengths,
        })
    }

    /// Release the device. Does nothing when no device is open.
    pub fn disconnect(&self) -> Result<(), DeviceError> {
        let Some(mut open) = self.gate.lock().take() else {
            return Ok(());
        };
        *self.params.write() = None;

        match open.handle.close() {
            Ok(()) => {
                self.set_status(DeviceStatus::Disconnected);
                Ok(())
            }
            Err(e) => {
                let e = device_error(e);
                self.set_status(DeviceStatus::Error(format!("Failed to disconnect spectrometer: {e}")));
                Err(e)
            }
        }
    }

    /// Set the exposure per reading. Out-of-range values change nothing.
    pub fn set_integration_time(&self, ms: u32) -> Result<(), DeviceError> {
        if !INTEGRATION_RANGE_MS.contains(&ms) {
            return Err(DeviceError::InvalidRange { ms });
        }
        let mut gate = self.gate.lock();
        let open = gate.as_mut().ok_or(DeviceError::NotConnected)?;
        open.handle
            .set_integration_time_micros(ms * 1000)
            .map_err(device_error)?;
        if let Some(params) = self.params.write().as_mut() {
            params.integration_ms = ms;
        }
        log::info!("Integration time set to {ms} ms");
        Ok(())
    }

    pub fn integration_time(&self) -> Option<u32> {
        self.params.read().map(|p| p.integration_ms)
    }

    /// Set the trigger mode by its console number (1, 2 or 3).
    pub fn set_trigger_mode(&self, number: u8) -> Result<TriggerMode, DeviceError> {
        let mode = TriggerMode::try_from(number).map_err(DeviceError::InvalidTriggerMode)?;
        let mut gate = self.gate.lock();
        let open = gate.as_mut().ok_or(DeviceError::NotConnected)?;
        open.handle.set_trigger_mode(mode).map_err(device_error)?;
        if let Some(params) = self.params.write().as_mut() {
            params.trigger = mode;
        }
        log::info!("Trigger mode set to {mode}");
        Ok(mode)
    }

    pub fn trigger_mode(&self) -> Option<TriggerMode> {
        self.params.read().map(|p| p.trigger)
    }

    /// Take one reading, waiting for any capture already in flight.
    pub fn capture(&self) -> Result<Spectrum, DeviceError> {
        let gate = self.gate.lock();
        self.capture_locked(gate)
    }

    /// Take one reading, or fail with [`DeviceError::Busy`] if another
    /// capture holds the device.
    pub fn try_capture(&self) -> Result<Spectrum, DeviceError> {
        let gate = self.gate.try_lock().ok_or(DeviceError::Busy)?;
        self.capture_locked(gate)
    }

    fn capture_locked(&self, mut gate: MutexGuard<'_, Option<Open>>) -> Result<Spectrum, DeviceError> {
        let open = gate.as_mut().ok_or(DeviceError::NotConnected)?;

        match open.handle.intensities() {
            Ok(intensities) => {
                let spectrum = Spectrum::new(open.wavelengths.clone(), intensities)
                    .map_err(|e| DeviceError::Device(e.to_string()))?;
                self.captures.fetch_add(1, Ordering::SeqCst);
                Ok(spectrum)
            }
            Err(DriverError::Unplugged) => {
                let model = open.model.clone();
                *gate = None;
                *self.params.write() = None;
                let msg = format!("{model} unplugged");
                self.set_status(DeviceStatus::Error(format!("Spectrometer lost: {msg}")));
                Err(DeviceError::Lost(msg))
            }
            Err(e) => {
                log::error!("Capture failed: {e}");
                Err(device_error(e))
            }
        }
    }
}

fn device_error(e: DriverError) -> DeviceError {
    DeviceError::Device(e.to_string())
}
