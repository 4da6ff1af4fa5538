use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use rusty_spectro::config::Settings;
use rusty_spectro::console::{AcquisitionState, Console, ConsoleError};
use rusty_spectro::data::loader::load_file;
use rusty_spectro::data::model::ReferenceKind;
use rusty_spectro::device::session::{DeviceError, DeviceStatus};
use rusty_spectro::device::simulated::{SimulatedConfig, SimulatedDriver};

fn settings(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.storage.root = root.to_path_buf();
    settings.device.default_integration_ms = 1;
    settings.acquisition.preview_interval_ms = 10;
    settings.acquisition.log_interval_ms = 20;
    settings
}

fn rig(root: &Path) -> (Console, SimulatedDriver) {
    let driver = SimulatedDriver::new(SimulatedConfig {
        pixels: 256,
        ..SimulatedConfig::default()
    });
    let console = Console::new(Box::new(driver.clone()), &settings(root));
    (console, driver)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn csv_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    files
}

#[test]
fn connect_starts_preview() {
    let dir = tempfile::tempdir().unwrap();
    let (console, _driver) = rig(dir.path());

    assert!(console.latest_display().is_none());
    let info = console.connect().unwrap();
    assert_eq!(info.model, "SIM-256");
    assert_eq!(console.status(), DeviceStatus::Connected { model: "SIM-256".into() });
    assert_eq!(console.status().to_string(), "Spectrometer Detected: SIM-256");

    assert!(wait_until(|| console.latest_display().is_some()));
    let frame = console.latest_display().unwrap();
    assert_eq!(frame.spectrum.len(), 256);
    assert!(frame.applied.is_empty());
}

#[test]
fn connect_without_device_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (console, driver) = rig(dir.path());
    driver.unplug();

    assert!(matches!(
        console.connect(),
        Err(ConsoleError::Device(DeviceError::NotFound))
    ));
    assert_eq!(console.status().to_string(), "No spectrometer found");
    assert!(!console.state().connected);
}

#[test]
fn one_shot_save_writes_spectra_file() {
    let dir = tempfile::tempdir().unwrap();
    let (console, _driver) = rig(dir.path());
    console.connect().unwrap();
    console.capture_reference(ReferenceKind::Smoothed).unwrap();

    let path = console.save_spectrum().unwrap();
    assert_eq!(path.parent().unwrap(), dir.path().join("spectra"));
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("spectrum_") && name.ends_with(".csv"), "{name}");

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("Wavelength,Intensity\n"));
    // Smoothing is active, so the record is four samples short.
    assert_eq!(load_file(&path).unwrap()[0].len(), 252);
}

#[test]
fn logging_writes_corrected_records() {
    let dir = tempfile::tempdir().unwrap();
    let (console, driver) = rig(dir.path());
    console.connect().unwrap();

    driver.set_light(false);
    console.capture_reference(ReferenceKind::Dark).unwrap();
    driver.set_light(true);

    console.start_logging(20).unwrap();
    assert_eq!(
        console.state(),
        AcquisitionState {
            connected: true,
            logging: true,
            interval_ms: 20
        }
    );
    assert!(wait_until(|| console.logged_cycles() >= 3));
    console.stop_logging();
    assert!(!console.state().logging);

    let logs = csv_files(&dir.path().join("logs"));
    assert!(logs.len() >= 3, "{logs:?}");
    for path in &logs {
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("log_"), "{name}");
    }

    // Dark-corrected: the sensor offset (~950 counts) is gone.
    let first = load_file(&logs[0]).unwrap().remove(0);
    let (min, _) = first.intensity_range().unwrap();
    assert!(min.abs() < 50.0, "min = {min}");
}

#[test]
fn second_start_reports_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let (console, _driver) = rig(dir.path());
    console.connect().unwrap();

    console.start_logging(50).unwrap();
    assert!(matches!(
        console.start_logging(50),
        Err(ConsoleError::Acquisition(_))
    ));
    console.stop_logging();
    console.stop_logging();
}

#[test]
fn logging_needs_a_device() {
    let dir = tempfile::tempdir().unwrap();
    let (console, _driver) = rig(dir.path());
    assert!(matches!(
        console.start_logging(100),
        Err(ConsoleError::Device(DeviceError::NotConnected))
    ));
    assert!(!console.state().logging);
}

#[test]
fn disconnect_while_logging_resets_everything() {
    let dir = tempfile::tempdir().unwrap();
    let (console, _driver) = rig(dir.path());
    console.connect().unwrap();
    console.capture_reference(ReferenceKind::Dark).unwrap();
    console.capture_reference(ReferenceKind::Baseline).unwrap();
    console.start_logging(20).unwrap();

    console.disconnect().unwrap();

    let state = console.state();
    assert!(!state.connected);
    assert!(!state.logging);
    assert!(console.references().dark.is_none());
    assert!(console.references().baseline.is_none());
    assert!(console.latest_display().is_none());
    assert_eq!(console.status().to_string(), "Spectrometer Disconnected");
}

#[test]
fn unplug_while_logging_stops_within_a_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let (console, driver) = rig(dir.path());
    console.connect().unwrap();
    console.capture_reference(ReferenceKind::Dark).unwrap();
    console.start_logging(20).unwrap();
    assert!(wait_until(|| console.logged_cycles() >= 1));

    driver.unplug();

    assert!(wait_until(|| !console.state().logging));
    assert!(!console.state().connected);
    assert!(console.references().dark.is_none());
    assert!(matches!(
        console.logging_stopped_by(),
        Some(DeviceError::Lost(_)) | Some(DeviceError::NotConnected)
    ));

    // Replug and carry on.
    driver.plug_in();
    console.connect().unwrap();
    console.start_logging(20).unwrap();
    assert!(console.logging_stopped_by().is_none());
    console.stop_logging();
}

#[test]
fn rejected_settings_leave_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let (console, _driver) = rig(dir.path());
    console.connect().unwrap();
    console.set_integration_time(20).unwrap();

    assert!(console.set_integration_time(0).is_err());
    assert!(console.set_integration_time(1001).is_err());
    assert_eq!(console.integration_time(), Some(20));

    assert!(matches!(
        console.set_trigger_mode(9),
        Err(ConsoleError::Device(DeviceError::InvalidTriggerMode(9)))
    ));
    assert_eq!(console.trigger_mode().map(|m| m.number()), Some(1));
    assert_eq!(console.set_trigger_mode(2).unwrap().number(), 2);
}

#[test]
fn references_survive_logging_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (console, _driver) = rig(dir.path());
    console.connect().unwrap();
    console.capture_reference(ReferenceKind::Dark).unwrap();

    console.start_logging(20).unwrap();
    console.stop_logging();
    console.start_logging(20).unwrap();
    assert!(wait_until(|| console.logged_cycles() >= 1));
    console.stop_logging();

    assert!(console.reference(ReferenceKind::Dark).is_some());
}
