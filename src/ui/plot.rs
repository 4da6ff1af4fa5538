use eframe::egui::{Color32, Ui};
use egui_plot::{Line, Plot, PlotPoints};
use rusty_spectro::data::model::{ReferenceKind, Spectrum};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Spectral plot (central panel)
// ---------------------------------------------------------------------------

fn line(sp: &Spectrum, name: &str, color: Color32, width: f32) -> Line<'static> {
    let points: PlotPoints = sp.points().map(|(x, y)| [x, y]).collect();
    Line::new(points).name(name).color(color).width(width)
}

/// Render the live corrected spectrum, with stored references behind it.
pub fn spectral_plot(ui: &mut Ui, state: &AppState) {
    let Some(frame) = state.console.latest_display() else {
        ui.centered_and_justified(|ui: &mut Ui| {
            if state.console.state().connected {
                ui.heading("Waiting for the first reading…");
            } else {
                ui.heading("Connect a spectrometer to see the live spectrum");
            }
        });
        return;
    };

    let refs = state.console.references();
    let title = if frame.applied.is_empty() {
        "Raw".to_string()
    } else {
        let stages: Vec<String> = frame.applied.iter().map(|s| s.to_string()).collect();
        format!("Corrected ({})", stages.join(", "))
    };

    if frame.is_degraded() {
        for (stage, err) in &frame.skipped {
            ui.colored_label(Color32::YELLOW, format!("{stage} skipped: {err}"));
        }
    }

    Plot::new("spectral_plot")
        .legend(egui_plot::Legend::default())
        .x_axis_label("Wavelength (nm)")
        .y_axis_label("Intensity")
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            if state.show_references {
                for kind in ReferenceKind::ALL {
                    let stored = match kind {
                        ReferenceKind::Dark => refs.dark.as_deref(),
                        ReferenceKind::Baseline => refs.baseline.as_deref(),
                        ReferenceKind::Smoothed => refs.smoothed.as_deref(),
                    };
                    if let Some(sp) = stored {
                        let color = state.colors.for_reference(kind).gamma_multiply(0.6);
                        plot_ui.line(line(sp, kind.label(), color, 1.0));
                    }
                }
            }

            plot_ui.line(line(&frame.spectrum, &title, state.colors.live, 1.5));
        });
}
