use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use thiserror::Error;

use crate::data::export::ExportTarget;
use crate::data::store::SpectrumStore;
use crate::device::session::{DeviceError, DeviceSession};
use crate::processing::pipeline::{self, Corrected};

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives every corrected spectrum a loop produces.
pub trait SpectrumSink: Send + Sync {
    fn accept(&self, corrected: &Corrected) -> anyhow::Result<()>;
}

/// Persists each cycle as its own timestamped CSV file.
#[derive(Debug)]
pub struct ExportSink {
    target: RwLock<ExportTarget>,
}

impl ExportSink {
    pub fn new(target: ExportTarget) -> Self {
        Self {
            target: RwLock::new(target),
        }
    }

    pub fn target(&self) -> ExportTarget {
        self.target.read().clone()
    }

    /// Redirect later cycles; a write in progress finishes where it began.
    pub fn set_target(&self, target: ExportTarget) {
        *self.target.write() = target;
    }
}

impl SpectrumSink for ExportSink {
    fn accept(&self, corrected: &Corrected) -> anyhow::Result<()> {
        let target = self.target();
        target.write(&corrected.spectrum)?;
        Ok(())
    }
}

/// Keeps only the most recent result, for the live plot.
#[derive(Debug, Default)]
pub struct DisplaySink {
    latest: Mutex<Option<Arc<Corrected>>>,
}

impl DisplaySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Arc<Corrected>> {
        self.latest.lock().clone()
    }

    pub fn clear(&self) {
        *self.latest.lock() = None;
    }
}

impl SpectrumSink for DisplaySink {
    fn accept(&self, corrected: &Corrected) -> anyhow::Result<()> {
        *self.latest.lock() = Some(Arc::new(corrected.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Acquisition loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("{0} loop already running")]
    AlreadyRunning(String),

    #[error("loop interval must be greater than zero")]
    ZeroInterval,
}

/// How a loop competes for the device with other callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Wait for any capture in flight, then take a reading.
    Blocking,
    /// Skip the cycle if the device is busy.
    SkipWhenBusy,
}

#[derive(Debug)]
struct Control {
    running: bool,
    interval: Duration,
    /// Why the loop last stopped on its own, if it did.
    stopped_by: Option<DeviceError>,
}

struct Shared {
    name: String,
    mode: CaptureMode,
    session: Arc<DeviceSession>,
    store: Arc<SpectrumStore>,
    sink: Arc<dyn SpectrumSink>,
    control: Mutex<Control>,
    wake: Condvar,
    cycles: AtomicU64,
}

/// A cancellable background cycle: capture → correct → sink, then sleep.
///
/// The sleep starts after the sink returns, so the period is processing
/// time plus the interval.
///
/// Idle until [`start`](Self::start); [`stop`](Self::stop) returns only
/// after the worker thread has exited. When the device goes away the loop
/// stops itself and empties the reference store.
pub struct AcquisitionLoop {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AcquisitionLoop {
    pub fn new(
        name: impl Into<String>,
        mode: CaptureMode,
        session: Arc<DeviceSession>,
        store: Arc<SpectrumStore>,
        sink: Arc<dyn SpectrumSink>,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                mode,
                session,
                store,
                sink,
                control: Mutex::new(Control {
                    running: false,
                    interval,
                    stopped_by: None,
                }),
                wake: Condvar::new(),
                cycles: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.control.lock().running
    }

    pub fn interval(&self) -> Duration {
        self.shared.control.lock().interval
    }

    /// Completed cycles (captured and handed to the sink) since creation.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::SeqCst)
    }

    /// The device error that made the loop stop itself, cleared on start.
    pub fn stopped_by(&self) -> Option<DeviceError> {
        self.shared.control.lock().stopped_by.clone()
    }

    /// Change the pause between cycles. A running loop picks it up during
    /// its current sleep.
    pub fn set_interval(&self, interval: Duration) -> Result<(), AcquisitionError> {
        if interval.is_zero() {
            return Err(AcquisitionError::ZeroInterval);
        }
        self.shared.control.lock().interval = interval;
        self.shared.wake.notify_all();
        log::info!("{} interval set to {} ms", self.shared.name, interval.as_millis());
        Ok(())
    }

    /// Start cycling, pausing `interval` after each cycle.
    pub fn start(&self, interval: Duration) -> Result<(), AcquisitionError> {
        if interval.is_zero() {
            return Err(AcquisitionError::ZeroInterval);
        }
        let mut worker = self.worker.lock();

        if self.shared.control.lock().running {
            log::warn!("{} loop already running", self.shared.name);
            return Err(AcquisitionError::AlreadyRunning(self.shared.name.clone()));
        }

        // A thread that stopped itself has already left its loop.
        if let Some(stale) = worker.take() {
            join(&self.shared.name, stale);
        }

        {
            let mut control = self.shared.control.lock();
            control.running = true;
            control.interval = interval;
            control.stopped_by = None;
        }

        let shared = Arc::clone(&self.shared);
        *worker = Some(thread::spawn(move || run(&shared)));
        log::info!("{} loop started ({} ms)", self.shared.name, interval.as_millis());
        Ok(())
    }

    /// Stop cycling and wait for the worker to exit. An in-flight capture
    /// finishes first; no cycle starts after this returns.
    pub fn stop(&self) {
        // Held until the join so a concurrent start cannot slip in between.
        let mut worker = self.worker.lock();
        let was_running = {
            let mut control = self.shared.control.lock();
            std::mem::replace(&mut control.running, false)
        };
        self.shared.wake.notify_all();

        if let Some(handle) = worker.take() {
            join(&self.shared.name, handle);
        }
        if was_running {
            log::info!("{} loop stopped", self.shared.name);
        }
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("{name} loop thread panicked");
    }
}

fn run(shared: &Shared) {
    loop {
        if !shared.control.lock().running {
            break;
        }

        let captured = match shared.mode {
            CaptureMode::Blocking => shared.session.capture(),
            CaptureMode::SkipWhenBusy => shared.session.try_capture(),
        };

        match captured {
            Ok(raw) => {
                let corrected = pipeline::correct(&raw, &shared.store.snapshot());
                shared.cycles.fetch_add(1, Ordering::SeqCst);
                match shared.sink.accept(&corrected) {
                    Ok(()) => log::debug!("{} cycle done ({} samples)", shared.name, corrected.spectrum.len()),
                    Err(e) => log::error!("{} cycle not saved: {e:#}", shared.name),
                }
            }
            Err(DeviceError::Busy) => log::trace!("{} skipped a busy cycle", shared.name),
            Err(e) if e.is_disconnect() => {
                log::warn!("{} loop stopping: {e}", shared.name);
                shared.store.clear_all();
                let mut control = shared.control.lock();
                control.running = false;
                control.stopped_by = Some(e);
                break;
            }
            Err(e) => log::error!("{} capture failed: {e}", shared.name),
        }

        let sleep_start = Instant::now();
        let mut control = shared.control.lock();
        loop {
            if !control.running {
                break;
            }
            let deadline = sleep_start + control.interval;
            if Instant::now() >= deadline {
                break;
            }
            shared.wake.wait_until(&mut control, deadline);
        }
    }
}
