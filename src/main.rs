mod app;
mod color;
mod state;
mod ui;

use anyhow::Context;
use app::SpectroConsoleApp;
use eframe::egui;
use rusty_spectro::config::{Settings, config_path};
use rusty_spectro::console::Console;
use rusty_spectro::device::driver_from_settings;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let settings = Settings::load(&config_path(&args))?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.as_str()),
    )
    .init();
    log::debug!("{settings:?}");

    let driver = driver_from_settings(&settings.device).context("opening spectrometer backend")?;
    let console = Console::new(driver, &settings);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Rusty Spectro – Spectrometer Console",
        options,
        Box::new(|_cc| Ok(Box::new(SpectroConsoleApp::new(console, settings)))),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
}
