use eframe::egui;
use rusty_spectro::config::Settings;
use rusty_spectro::console::Console;

use crate::state::AppState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct SpectroConsoleApp {
    pub state: AppState,
}

impl SpectroConsoleApp {
    pub fn new(console: Console, settings: Settings) -> Self {
        Self {
            state: AppState::new(console, settings),
        }
    }
}

impl eframe::App for SpectroConsoleApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Bottom panel: status line ----
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            panels::status_bar(ui, &self.state);
        });

        // ---- Left side panel: device controls ----
        egui::SidePanel::left("control_panel")
            .default_width(240.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: live spectrum ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::spectral_plot(ui, &self.state);
        });

        // The preview loop runs on its own thread; poll it at its cadence.
        ctx.request_repaint_after(self.state.settings.preview_interval());
    }
}
