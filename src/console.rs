use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;

use crate::acquisition::{AcquisitionError, AcquisitionLoop, CaptureMode, DisplaySink, ExportSink};
use crate::config::Settings;
use crate::data::export::{ExportError, ExportTarget};
use crate::data::model::{ReferenceKind, Spectrum};
use crate::data::store::{SpectrumStore, StoreSnapshot};
use crate::device::session::{DeviceError, DeviceSession, DeviceStatus};
use crate::device::{DeviceInfo, SpectrometerDriver, TriggerMode};
use crate::processing::correction::CorrectionError;
use crate::processing::pipeline::{self, Corrected, Stage};

// ---------------------------------------------------------------------------
// Operator console
// ---------------------------------------------------------------------------

pub const SPECTRUM_PREFIX: &str = "spectrum";
pub const LOG_PREFIX: &str = "log";

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("{kind} reference not stored: {source}")]
    Reference {
        kind: ReferenceKind,
        source: CorrectionError,
    },
}

/// What the status bar shows about acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionState {
    pub connected: bool,
    pub logging: bool,
    pub interval_ms: u64,
}

/// Everything the operator can do, independent of any GUI.
///
/// Owns one device session, the reference store and two acquisition loops:
/// a preview loop feeding the live display and a logging loop writing to
/// the logs directory. Both loops and every one-shot action go through
/// the same correction pipeline.
pub struct Console {
    session: Arc<DeviceSession>,
    store: Arc<SpectrumStore>,
    display: Arc<DisplaySink>,
    log_sink: Arc<ExportSink>,
    spectra: RwLock<ExportTarget>,
    preview: AcquisitionLoop,
    logger: AcquisitionLoop,
    preview_interval: Duration,
}

impl Console {
    pub fn new(driver: Box<dyn SpectrometerDriver>, settings: &Settings) -> Self {
        let session = Arc::new(DeviceSession::with_default_integration(
            driver,
            settings.device.default_integration_ms,
        ));
        let store = Arc::new(SpectrumStore::new());
        let display = Arc::new(DisplaySink::new());
        let log_sink = Arc::new(ExportSink::new(ExportTarget::new(settings.logs_dir(), LOG_PREFIX)));

        let preview = AcquisitionLoop::new(
            "preview",
            CaptureMode::SkipWhenBusy,
            Arc::clone(&session),
            Arc::clone(&store),
            display.clone(),
            settings.preview_interval(),
        );
        let logger = AcquisitionLoop::new(
            "logging",
            CaptureMode::Blocking,
            Arc::clone(&session),
            Arc::clone(&store),
            log_sink.clone(),
            settings.log_interval(),
        );

        Self {
            session,
            store,
            display,
            log_sink,
            spectra: RwLock::new(ExportTarget::new(settings.spectra_dir(), SPECTRUM_PREFIX)),
            preview,
            logger,
            preview_interval: settings.preview_interval(),
        }
    }

    // -- Device -------------------------------------------------------------

    /// Connect to the first spectrometer and start the live preview.
    ///
    /// A fresh connection starts with an empty reference store.
    pub fn connect(&self) -> Result<DeviceInfo, ConsoleError> {
        let was_connected = self.session.is_connected();
        let info = self.session.connect()?;
        if !was_connected {
            self.store.clear_all();
            self.display.clear();
        }
        if !self.preview.is_running() {
            self.preview.start(self.preview_interval)?;
        }
        Ok(info)
    }

    /// Stop both loops, release the device and drop every reference.
    pub fn disconnect(&self) -> Result<(), ConsoleError> {
        self.logger.stop();
        self.preview.stop();
        let result = self.session.disconnect();
        self.store.clear_all();
        self.display.clear();
        result.map_err(ConsoleError::from)
    }

    pub fn set_integration_time(&self, ms: u32) -> Result<(), ConsoleError> {
        Ok(self.session.set_integration_time(ms)?)
    }

    pub fn integration_time(&self) -> Option<u32> {
        self.session.integration_time()
    }

    pub fn set_trigger_mode(&self, number: u8) -> Result<TriggerMode, ConsoleError> {
        Ok(self.session.set_trigger_mode(number)?)
    }

    pub fn trigger_mode(&self) -> Option<TriggerMode> {
        self.session.trigger_mode()
    }

    pub fn status(&self) -> DeviceStatus {
        self.session.status()
    }

    // -- References ---------------------------------------------------------

    /// Capture a fresh reading and store it as the `kind` reference.
    ///
    /// A dark reference is the raw reading. The others are the reading run
    /// through the currently active stages before `kind`, plus `kind`
    /// itself; if that last stage cannot run nothing is stored.
    pub fn capture_reference(&self, kind: ReferenceKind) -> Result<Arc<Spectrum>, ConsoleError> {
        let raw = self.capture()?;
        let snapshot = self.store.snapshot();
        let corrected = pipeline::correct_with(
            &raw,
            snapshot.dark.as_deref(),
            snapshot.config().through(kind),
        );

        let target = match kind {
            ReferenceKind::Dark => None,
            ReferenceKind::Baseline => Some(Stage::BaselineCorrection),
            ReferenceKind::Smoothed => Some(Stage::Smoothing),
        };
        if let Some((_, source)) = corrected
            .skipped
            .into_iter()
            .find(|(stage, _)| Some(*stage) == target)
        {
            return Err(ConsoleError::Reference { kind, source });
        }

        Ok(self.store.set(kind, corrected.spectrum))
    }

    pub fn clear_reference(&self, kind: ReferenceKind) {
        self.store.clear(kind);
    }

    pub fn reference(&self, kind: ReferenceKind) -> Option<Arc<Spectrum>> {
        self.store.get(kind)
    }

    pub fn references(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    // -- Saving and logging -------------------------------------------------

    /// Capture one reading, correct it and write it to the spectra
    /// directory.
    pub fn save_spectrum(&self) -> Result<PathBuf, ConsoleError> {
        let raw = self.capture()?;
        let corrected = pipeline::correct(&raw, &self.store.snapshot());
        let target = self.spectra.read().clone();
        Ok(target.write(&corrected.spectrum)?)
    }

    /// Start writing one corrected spectrum per `interval_ms` to the logs
    /// directory.
    pub fn start_logging(&self, interval_ms: u64) -> Result<(), ConsoleError> {
        if !self.session.is_connected() {
            return Err(DeviceError::NotConnected.into());
        }
        self.logger.start(Duration::from_millis(interval_ms))?;
        Ok(())
    }

    pub fn stop_logging(&self) {
        self.logger.stop();
    }

    pub fn set_log_interval(&self, interval_ms: u64) -> Result<(), ConsoleError> {
        self.logger.set_interval(Duration::from_millis(interval_ms))?;
        Ok(())
    }

    /// Why logging last stopped without being asked to.
    pub fn logging_stopped_by(&self) -> Option<DeviceError> {
        self.logger.stopped_by()
    }

    /// Cycles the logging loop has completed.
    pub fn logged_cycles(&self) -> u64 {
        self.logger.cycles()
    }

    /// Move both export directories under `root`, keeping their names.
    pub fn set_storage_root(&self, root: &Path) {
        let retarget = |target: &ExportTarget| {
            let name = target.directory.file_name().map(PathBuf::from).unwrap_or_default();
            ExportTarget::new(root.join(name), target.prefix.clone())
        };
        let current = self.spectra.read().clone();
        let spectra = retarget(&current);
        let logs = retarget(&self.log_sink.target());
        log::info!("Saving to {} and {}", spectra.directory.display(), logs.directory.display());
        *self.spectra.write() = spectra;
        self.log_sink.set_target(logs);
    }

    pub fn spectra_dir(&self) -> PathBuf {
        self.spectra.read().directory.clone()
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.log_sink.target().directory
    }

    /// Foreground capture. Losing the device here drops the references
    /// just as a loop would.
    fn capture(&self) -> Result<Spectrum, ConsoleError> {
        self.session.capture().map_err(|e| {
            if e.is_disconnect() {
                self.store.clear_all();
                self.display.clear();
            }
            ConsoleError::from(e)
        })
    }

    // -- Display ------------------------------------------------------------

    pub fn state(&self) -> AcquisitionState {
        AcquisitionState {
            connected: self.session.is_connected(),
            logging: self.logger.is_running(),
            interval_ms: u64::try_from(self.logger.interval().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Latest corrected preview frame, or `None` when no device is open.
    pub fn latest_display(&self) -> Option<Arc<Corrected>> {
        if self.session.is_connected() {
            self.display.latest()
        } else {
            None
        }
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.logger.stop();
        self.preview.stop();
        if let Err(e) = self.session.disconnect() {
            log::warn!("{e}");
        }
    }
}
