use std::fmt;

use crate::data::model::Spectrum;
use crate::data::store::{PipelineConfig, StoreSnapshot};

use super::correction::{correct_baseline, smooth, subtract_dark, CorrectionError};

// ---------------------------------------------------------------------------
// Pipeline: raw → dark → baseline → smooth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DarkSubtraction,
    BaselineCorrection,
    Smoothing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DarkSubtraction => "dark subtraction",
            Stage::BaselineCorrection => "baseline correction",
            Stage::Smoothing => "smoothing",
        };
        write!(f, "{name}")
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct Corrected {
    /// The most-corrected spectrum that could be produced.
    pub spectrum: Spectrum,
    /// Stages that ran, in order.
    pub applied: Vec<Stage>,
    /// Stages that were active but could not run; their input was kept.
    pub skipped: Vec<(Stage, CorrectionError)>,
}

impl Corrected {
    pub fn is_degraded(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Run `raw` through every stage enabled in `snapshot`.
///
/// This is the single code path used by the live display, one-shot saves
/// and the logging loop.
pub fn correct(raw: &Spectrum, snapshot: &StoreSnapshot) -> Corrected {
    correct_with(raw, snapshot.dark.as_deref(), snapshot.config())
}

/// Run `raw` through the stages selected by `config`.
///
/// Dark subtraction needs both `config.dark` and a `dark` spectrum. A stage
/// that fails is recorded in [`Corrected::skipped`] and the next stage works
/// on the last good spectrum.
pub fn correct_with(raw: &Spectrum, dark: Option<&Spectrum>, config: PipelineConfig) -> Corrected {
    let mut current = raw.clone();
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    let mut run = |stage: Stage, current: &mut Spectrum, result: Result<Spectrum, CorrectionError>| {
        match result {
            Ok(next) => {
                *current = next;
                applied.push(stage);
            }
            Err(e) => {
                log::warn!("{stage} skipped: {e}");
                skipped.push((stage, e));
            }
        }
    };

    if let Some(dark) = dark.filter(|_| config.dark) {
        let result = subtract_dark(&current, dark);
        run(Stage::DarkSubtraction, &mut current, result);
    }
    if config.baseline {
        let result = correct_baseline(&current);
        run(Stage::BaselineCorrection, &mut current, result);
    }
    if config.smoothing {
        let result = smooth(&current);
        run(Stage::Smoothing, &mut current, result);
    }

    Corrected {
        spectrum: current,
        applied,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn spectrum(ys: Vec<f64>) -> Spectrum {
        let xs = (0..ys.len()).map(|i| 500.0 + i as f64).collect();
        Spectrum::new(xs, ys).unwrap()
    }

    fn ramp(n: usize) -> Spectrum {
        spectrum((0..n).map(|i| 10.0 + (i % 7) as f64).collect())
    }

    #[test]
    fn empty_snapshot_passes_through() {
        let raw = ramp(32);
        let out = correct(&raw, &StoreSnapshot::default());
        assert_eq!(out.spectrum, raw);
        assert!(out.applied.is_empty());
        assert!(!out.is_degraded());
    }

    #[test]
    fn stages_run_in_fixed_order() {
        let raw = ramp(64);
        let snapshot = StoreSnapshot {
            dark: Some(Arc::new(spectrum(vec![1.0; 64]))),
            baseline: Some(Arc::new(raw.clone())),
            smoothed: Some(Arc::new(raw.clone())),
        };
        let out = correct(&raw, &snapshot);
        assert_eq!(
            out.applied,
            vec![
                Stage::DarkSubtraction,
                Stage::BaselineCorrection,
                Stage::Smoothing
            ]
        );
        assert_eq!(out.spectrum.len(), 60);
    }

    #[test]
    fn incompatible_dark_falls_back_to_raw() {
        let raw = ramp(512);
        let snapshot = StoreSnapshot {
            dark: Some(Arc::new(spectrum(vec![1.0; 256]))),
            ..StoreSnapshot::default()
        };
        let out = correct(&raw, &snapshot);
        assert_eq!(out.spectrum.intensities(), raw.intensities());
        assert_eq!(
            out.skipped,
            vec![(
                Stage::DarkSubtraction,
                CorrectionError::IncompatibleReference {
                    expected: 512,
                    found: 256
                }
            )]
        );
    }

    #[test]
    fn failed_stage_does_not_stop_later_ones() {
        // Too few samples for a baseline fit, enough for smoothing.
        let raw = spectrum(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let config = PipelineConfig {
            dark: false,
            baseline: true,
            smoothing: true,
        };
        let out = correct_with(&raw, None, config);
        assert_eq!(out.applied, vec![Stage::Smoothing]);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].0, Stage::BaselineCorrection);
        assert_eq!(out.spectrum.intensities(), &[3.0, 4.0]);
    }

    #[test]
    fn short_spectrum_smoothing_returns_input() {
        let raw = spectrum(vec![4.0, 3.0, 2.0]);
        let config = PipelineConfig {
            smoothing: true,
            ..PipelineConfig::default()
        };
        let out = correct_with(&raw, None, config);
        assert_eq!(out.spectrum, raw);
        assert!(out.is_degraded());
    }

    #[test]
    fn dark_flag_without_reference_is_ignored() {
        let raw = ramp(8);
        let config = PipelineConfig {
            dark: true,
            ..PipelineConfig::default()
        };
        let out = correct_with(&raw, None, config);
        assert_eq!(out.spectrum, raw);
        assert!(out.applied.is_empty());
    }
}
