use std::fmt::Display;
use std::path::Path;

use rusty_spectro::config::Settings;
use rusty_spectro::console::Console;
use rusty_spectro::data::model::ReferenceKind;
use rusty_spectro::device::TriggerMode;
use rusty_spectro::device::replay::ReplayDriver;
use rusty_spectro::device::session::DEFAULT_INTEGRATION_MS;

use crate::color::TraceColors;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Outcome of the last operator action, shown in the status bar.
pub enum Message {
    Info(String),
    Error(String),
}

/// The full UI state, independent of rendering.
pub struct AppState {
    pub console: Console,
    pub settings: Settings,

    /// Text in the integration-time field, in ms.
    pub integration_input: String,

    /// Selected trigger mode.
    pub trigger: TriggerMode,

    /// Text in the logging-interval field, in ms.
    pub log_interval_input: String,

    /// Draw the stored references behind the live trace.
    pub show_references: bool,

    pub colors: TraceColors,

    pub message: Option<Message>,
}

impl AppState {
    pub fn new(console: Console, settings: Settings) -> Self {
        Self {
            console,
            integration_input: settings.device.default_integration_ms.to_string(),
            trigger: TriggerMode::default(),
            log_interval_input: settings.acquisition.log_interval_ms.to_string(),
            show_references: true,
            colors: TraceColors::new(),
            message: None,
            settings,
        }
    }

    fn report<T, E: Display>(&mut self, result: Result<T, E>, ok: impl FnOnce(T) -> String) {
        self.message = Some(match result {
            Ok(value) => Message::Info(ok(value)),
            Err(e) => {
                log::error!("{e}");
                Message::Error(e.to_string())
            }
        });
    }

    // -- Device -------------------------------------------------------------

    pub fn connect(&mut self) {
        let result = self.console.connect();
        if result.is_ok() {
            self.integration_input = self
                .console
                .integration_time()
                .unwrap_or(DEFAULT_INTEGRATION_MS)
                .to_string();
            self.trigger = self.console.trigger_mode().unwrap_or_default();
        }
        self.report(result, |info| format!("Connected to {} ({})", info.model, info.serial));
    }

    pub fn disconnect(&mut self) {
        let result = self.console.disconnect();
        self.report(result, |()| "Disconnected".to_string());
    }

    pub fn apply_integration_time(&mut self) {
        match self.integration_input.trim().parse::<u32>() {
            Ok(ms) => {
                let result = self.console.set_integration_time(ms);
                self.report(result, |()| format!("Integration time set to {ms} ms"));
            }
            Err(_) => {
                self.message = Some(Message::Error(format!(
                    "'{}' is not a whole number of milliseconds",
                    self.integration_input
                )));
            }
        }
    }

    pub fn apply_trigger_mode(&mut self, mode: TriggerMode) {
        let result = self.console.set_trigger_mode(mode.number());
        if let Ok(applied) = &result {
            self.trigger = *applied;
        }
        self.report(result, |m| format!("Trigger mode {m}"));
    }

    // -- References ---------------------------------------------------------

    pub fn capture_reference(&mut self, kind: ReferenceKind) {
        let result = self.console.capture_reference(kind);
        self.report(result, |sp| format!("{kind} reference captured ({} samples)", sp.len()));
    }

    pub fn clear_reference(&mut self, kind: ReferenceKind) {
        self.console.clear_reference(kind);
        self.message = Some(Message::Info(format!("{kind} reference cleared")));
    }

    // -- Saving and logging -------------------------------------------------

    pub fn save_spectrum(&mut self) {
        let result = self.console.save_spectrum();
        self.report(result, |path| format!("Saved {}", path.display()));
    }

    fn log_interval_ms(&mut self) -> Option<u64> {
        match self.log_interval_input.trim().parse::<u64>() {
            Ok(ms) => Some(ms),
            Err(_) => {
                self.message = Some(Message::Error(format!(
                    "'{}' is not a whole number of milliseconds",
                    self.log_interval_input
                )));
                None
            }
        }
    }

    pub fn start_logging(&mut self) {
        let Some(ms) = self.log_interval_ms() else {
            return;
        };
        let result = self.console.start_logging(ms);
        let dir = self.console.logs_dir();
        self.report(result, |()| format!("Logging to {} every {ms} ms", dir.display()));
    }

    pub fn stop_logging(&mut self) {
        self.console.stop_logging();
        self.message = Some(Message::Info("Logging stopped".to_string()));
    }

    pub fn apply_log_interval(&mut self) {
        let Some(ms) = self.log_interval_ms() else {
            return;
        };
        let result = self.console.set_log_interval(ms);
        self.report(result, |()| format!("Logging interval set to {ms} ms"));
    }

    // -- Files --------------------------------------------------------------

    /// Swap the device backend for a replay of `path`.
    pub fn open_replay(&mut self, path: &Path) {
        match ReplayDriver::from_file(path) {
            Ok(driver) => {
                let spectra = driver.len();
                let root = self.console.spectra_dir();
                // Dropping the old console stops its loops and closes the device.
                self.console = Console::new(Box::new(driver), &self.settings);
                if let Some(parent) = root.parent() {
                    self.console.set_storage_root(parent);
                }
                self.message = Some(Message::Info(format!(
                    "Replaying {spectra} spectra from {}; connect to start",
                    path.display()
                )));
            }
            Err(e) => {
                log::error!("Failed to load replay file: {e:#}");
                self.message = Some(Message::Error(format!("Error: {e:#}")));
            }
        }
    }

    pub fn set_storage_root(&mut self, root: &Path) {
        self.console.set_storage_root(root);
        self.message = Some(Message::Info(format!("Saving under {}", root.display())));
    }
}
