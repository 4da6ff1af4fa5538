use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};
use rusty_spectro::data::model::ReferenceKind;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Trace colours
// ---------------------------------------------------------------------------

/// One colour for the live trace and one per reference slot.
#[derive(Debug, Clone)]
pub struct TraceColors {
    pub live: Color32,
    references: [Color32; 3],
}

impl TraceColors {
    pub fn new() -> Self {
        // Hues 0, 90, 180 and 270 degrees.
        let palette = generate_palette(1 + ReferenceKind::ALL.len());
        let pick = |i: usize| palette.get(i).copied().unwrap_or(Color32::GRAY);
        Self {
            live: pick(2),
            references: [pick(0), pick(1), pick(3)],
        }
    }

    pub fn for_reference(&self, kind: ReferenceKind) -> Color32 {
        match kind {
            ReferenceKind::Dark => self.references[0],
            ReferenceKind::Baseline => self.references[1],
            ReferenceKind::Smoothed => self.references[2],
        }
    }
}

impl Default for TraceColors {
    fn default() -> Self {
        Self::new()
    }
}
