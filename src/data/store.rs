use std::sync::Arc;

use parking_lot::RwLock;

use super::model::{ReferenceKind, Spectrum};

// ---------------------------------------------------------------------------
// Spectrum store – operator-set reference slots
// ---------------------------------------------------------------------------

/// Holds the dark, baseline and smoothed reference spectra.
///
/// Each slot is an independent `RwLock<Option<Arc<Spectrum>>>`: a writer
/// swaps the whole `Arc`, so a reader sees either the old or the new
/// reference and never a partial one.
#[derive(Debug, Default)]
pub struct SpectrumStore {
    dark: RwLock<Option<Arc<Spectrum>>>,
    baseline: RwLock<Option<Arc<Spectrum>>>,
    smoothed: RwLock<Option<Arc<Spectrum>>>,
}

/// A point-in-time copy of every slot, handed to the correction pipeline.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub dark: Option<Arc<Spectrum>>,
    pub baseline: Option<Arc<Spectrum>>,
    pub smoothed: Option<Arc<Spectrum>>,
}

/// Which correction stages are active, derived from the occupied slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    pub dark: bool,
    pub baseline: bool,
    pub smoothing: bool,
}

impl StoreSnapshot {
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            dark: self.dark.is_some(),
            baseline: self.baseline.is_some(),
            smoothing: self.smoothed.is_some(),
        }
    }
}

impl PipelineConfig {
    /// Stages used to build a fresh `kind` reference: the ones before it
    /// as currently configured, plus `kind` itself forced on.
    pub fn through(self, kind: ReferenceKind) -> PipelineConfig {
        match kind {
            ReferenceKind::Dark => PipelineConfig::default(),
            ReferenceKind::Baseline => PipelineConfig {
                dark: self.dark,
                baseline: true,
                smoothing: false,
            },
            ReferenceKind::Smoothed => PipelineConfig {
                smoothing: true,
                ..self
            },
        }
    }
}

impl SpectrumStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: ReferenceKind) -> &RwLock<Option<Arc<Spectrum>>> {
        match kind {
            ReferenceKind::Dark => &self.dark,
            ReferenceKind::Baseline => &self.baseline,
            ReferenceKind::Smoothed => &self.smoothed,
        }
    }

    /// Replace the slot wholesale.
    pub fn set(&self, kind: ReferenceKind, spectrum: Spectrum) -> Arc<Spectrum> {
        let spectrum = Arc::new(spectrum);
        *self.slot(kind).write() = Some(Arc::clone(&spectrum));
        log::info!("{kind} reference stored ({} samples)", spectrum.len());
        spectrum
    }

    pub fn get(&self, kind: ReferenceKind) -> Option<Arc<Spectrum>> {
        self.slot(kind).read().clone()
    }

    pub fn clear(&self, kind: ReferenceKind) {
        if self.slot(kind).write().take().is_some() {
            log::info!("{kind} reference cleared");
        }
    }

    /// Empty every slot. Called whenever the device session ends.
    pub fn clear_all(&self) {
        for kind in ReferenceKind::ALL {
            self.clear(kind);
        }
    }

    pub fn is_empty(&self) -> bool {
        ReferenceKind::ALL
            .iter()
            .all(|&kind| self.slot(kind).read().is_none())
    }

    /// Take one consistent-per-slot copy of all references.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            dark: self.get(ReferenceKind::Dark),
            baseline: self.get(ReferenceKind::Baseline),
            smoothed: self.get(ReferenceKind::Smoothed),
        }
    }

    pub fn config(&self) -> PipelineConfig {
        self.snapshot().config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: f64) -> Spectrum {
        Spectrum::new(vec![500.0, 501.0, 502.0], vec![value; 3]).unwrap()
    }

    #[test]
    fn set_replaces_and_clear_empties() {
        let store = SpectrumStore::new();
        assert!(store.is_empty());

        store.set(ReferenceKind::Dark, flat(1.0));
        let first = store.get(ReferenceKind::Dark).unwrap();
        store.set(ReferenceKind::Dark, flat(2.0));
        let second = store.get(ReferenceKind::Dark).unwrap();

        // The old Arc is untouched by the replacement.
        assert_eq!(first.intensities(), &[1.0, 1.0, 1.0]);
        assert_eq!(second.intensities(), &[2.0, 2.0, 2.0]);

        store.clear(ReferenceKind::Dark);
        assert!(store.get(ReferenceKind::Dark).is_none());
    }

    #[test]
    fn config_follows_occupied_slots() {
        let store = SpectrumStore::new();
        assert_eq!(store.config(), PipelineConfig::default());

        store.set(ReferenceKind::Baseline, flat(0.0));
        store.set(ReferenceKind::Smoothed, flat(0.0));
        assert_eq!(
            store.config(),
            PipelineConfig {
                dark: false,
                baseline: true,
                smoothing: true
            }
        );

        store.clear_all();
        assert!(store.is_empty());
    }

    #[test]
    fn through_forces_target_stage_on() {
        let only_dark = PipelineConfig {
            dark: true,
            baseline: false,
            smoothing: false,
        };

        assert_eq!(only_dark.through(ReferenceKind::Dark), PipelineConfig::default());
        assert_eq!(
            only_dark.through(ReferenceKind::Baseline),
            PipelineConfig {
                dark: true,
                baseline: true,
                smoothing: false
            }
        );
        assert_eq!(
            only_dark.through(ReferenceKind::Smoothed),
            PipelineConfig {
                dark: true,
                baseline: false,
                smoothing: true
            }
        );
    }
}
