use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use rusty_spectro::data::model::ReferenceKind;
use rusty_spectro::device::TriggerMode;
use rusty_spectro::device::session::INTEGRATION_RANGE_MS;

use crate::state::{AppState, Message};

// ---------------------------------------------------------------------------
// Left side panel – device controls
// ---------------------------------------------------------------------------

/// Render the left control panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    let acq = state.console.state();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            // ---- Connection ----
            ui.heading("Spectrometer");
            ui.separator();
            ui.horizontal(|ui: &mut Ui| {
                if ui
                    .add_enabled(!acq.connected, egui::Button::new("Connect"))
                    .clicked()
                {
                    state.connect();
                }
                if ui
                    .add_enabled(acq.connected, egui::Button::new("Disconnect"))
                    .clicked()
                {
                    state.disconnect();
                }
            });
            let status = state.console.status();
            let color = if status.is_connected() {
                Color32::LIGHT_GREEN
            } else {
                Color32::GRAY
            };
            ui.label(RichText::new(status.to_string()).color(color));
            ui.add_space(8.0);

            // ---- Acquisition settings ----
            ui.strong("Integration time (ms)");
            ui.horizontal(|ui: &mut Ui| {
                let field = ui.add(
                    egui::TextEdit::singleline(&mut state.integration_input).desired_width(70.0),
                );
                let submitted =
                    field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.add_enabled(acq.connected, egui::Button::new("Set")).clicked() || submitted {
                    state.apply_integration_time();
                }
            });
            ui.label(
                RichText::new(format!(
                    "{}–{} ms",
                    INTEGRATION_RANGE_MS.start(),
                    INTEGRATION_RANGE_MS.end()
                ))
                .small()
                .weak(),
            );

            ui.strong("Trigger mode");
            let current = state.trigger;
            ui.add_enabled_ui(acq.connected, |ui: &mut Ui| {
                egui::ComboBox::from_id_salt("trigger_mode")
                    .selected_text(current.to_string())
                    .show_ui(ui, |ui: &mut Ui| {
                        for mode in TriggerMode::ALL {
                            if ui.selectable_label(current == mode, mode.to_string()).clicked() {
                                state.apply_trigger_mode(mode);
                            }
                        }
                    });
            });
            ui.add_space(8.0);

            // ---- References ----
            ui.heading("Corrections");
            ui.separator();
            let refs = state.console.references();
            for kind in ReferenceKind::ALL {
                let stored = match kind {
                    ReferenceKind::Dark => refs.dark.is_some(),
                    ReferenceKind::Baseline => refs.baseline.is_some(),
                    ReferenceKind::Smoothed => refs.smoothed.is_some(),
                };
                ui.horizontal(|ui: &mut Ui| {
                    let swatch = RichText::new("■").color(state.colors.for_reference(kind));
                    ui.label(swatch);
                    ui.label(kind.label());
                    if ui
                        .add_enabled(acq.connected, egui::Button::new("Capture").small())
                        .clicked()
                    {
                        state.capture_reference(kind);
                    }
                    if ui
                        .add_enabled(stored, egui::Button::new("Clear").small())
                        .clicked()
                    {
                        state.clear_reference(kind);
                    }
                    if stored {
                        ui.label(RichText::new("on").color(Color32::LIGHT_GREEN));
                    }
                });
            }
            ui.checkbox(&mut state.show_references, "Show references");
            ui.add_space(8.0);

            // ---- Saving ----
            ui.heading("Data");
            ui.separator();
            if ui
                .add_enabled(acq.connected, egui::Button::new("Save Spectrum"))
                .clicked()
            {
                state.save_spectrum();
            }
            ui.add_space(4.0);

            ui.strong("Logging interval (ms)");
            ui.horizontal(|ui: &mut Ui| {
                ui.add(egui::TextEdit::singleline(&mut state.log_interval_input).desired_width(70.0));
                if ui.button("Set").clicked() {
                    state.apply_log_interval();
                }
            });
            ui.horizontal(|ui: &mut Ui| {
                if ui
                    .add_enabled(acq.connected && !acq.logging, egui::Button::new("Start Logging"))
                    .clicked()
                {
                    state.start_logging();
                }
                if ui
                    .add_enabled(acq.logging, egui::Button::new("Stop Logging"))
                    .clicked()
                {
                    state.stop_logging();
                }
            });
            if acq.logging {
                ui.label(
                    RichText::new(format!(
                        "Logging every {} ms ({} written)",
                        acq.interval_ms,
                        state.console.logged_cycles()
                    ))
                    .color(Color32::LIGHT_GREEN),
                );
            } else if let Some(e) = state.console.logging_stopped_by() {
                ui.label(RichText::new(format!("Logging stopped: {e}")).color(Color32::RED));
            }
        });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Replay recording…").clicked() {
                open_replay_dialog(state);
                ui.close_menu();
            }
            if ui.button("Save folder…").clicked() {
                choose_save_root(state);
                ui.close_menu();
            }
        });

        ui.separator();

        ui.label(format!("Spectra: {}", state.console.spectra_dir().display()));
        ui.separator();
        ui.label(format!("Logs: {}", state.console.logs_dir().display()));
    });
}

// ---------------------------------------------------------------------------
// Bottom bar
// ---------------------------------------------------------------------------

pub fn status_bar(ui: &mut Ui, state: &AppState) {
    match &state.message {
        Some(Message::Info(msg)) => {
            ui.label(msg);
        }
        Some(Message::Error(msg)) => {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
        None => {
            ui.label(state.console.status().to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_replay_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Replay recorded spectra")
        .add_filter("Supported files", &["parquet", "pq", "json", "csv"])
        .add_filter("Parquet", &["parquet", "pq"])
        .add_filter("JSON", &["json"])
        .add_filter("CSV", &["csv"])
        .pick_file();

    if let Some(path) = file {
        state.open_replay(&path);
    }
}

pub fn choose_save_root(state: &mut AppState) {
    let folder = rfd::FileDialog::new()
        .set_title("Save spectra and logs under")
        .pick_folder();

    if let Some(root) = folder {
        state.set_storage_root(&root);
    }
}
