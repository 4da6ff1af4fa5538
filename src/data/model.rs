use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Spectrum – one (wavelength, intensity) reading
// ---------------------------------------------------------------------------

/// Raised when a wavelength axis and an intensity series disagree in length.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpectrumError {
    #[error("wavelength axis has {wavelengths} samples but intensities has {intensities}")]
    LengthMismatch {
        wavelengths: usize,
        intensities: usize,
    },
}

/// A single spectrometer reading.
///
/// The two series are private so that `wavelengths.len() == intensities.len()`
/// holds for every value of this type. A spectrum is never edited in place:
/// every correction stage builds a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Wavelength axis in nanometres (strictly increasing by convention).
    wavelengths: Vec<f64>,
    /// Detector counts – same length as `wavelengths`.
    intensities: Vec<f64>,
}

impl Spectrum {
    /// Pair a wavelength axis with an intensity series.
    pub fn new(wavelengths: Vec<f64>, intensities: Vec<f64>) -> Result<Self, SpectrumError> {
        if wavelengths.len() != intensities.len() {
            return Err(SpectrumError::LengthMismatch {
                wavelengths: wavelengths.len(),
                intensities: intensities.len(),
            });
        }
        Ok(Self {
            wavelengths,
            intensities,
        })
    }

    /// Build from two series the caller already knows are the same length.
    pub(crate) fn from_aligned(wavelengths: Vec<f64>, intensities: Vec<f64>) -> Self {
        debug_assert_eq!(wavelengths.len(), intensities.len());
        Self {
            wavelengths,
            intensities,
        }
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    /// Whether the spectrum holds no samples.
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }

    /// Same wavelength axis, each intensity replaced by `f(index, intensity)`.
    pub fn map_intensities(&self, mut f: impl FnMut(usize, f64) -> f64) -> Spectrum {
        let intensities = self
            .intensities
            .iter()
            .enumerate()
            .map(|(i, &y)| f(i, y))
            .collect();
        Self::from_aligned(self.wavelengths.clone(), intensities)
    }

    /// Iterate `(wavelength, intensity)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelengths
            .iter()
            .copied()
            .zip(self.intensities.iter().copied())
    }

    /// Smallest and largest intensity, `None` for an empty spectrum.
    pub fn intensity_range(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let min = self.intensities.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self.intensities.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}

// ---------------------------------------------------------------------------
// ReferenceKind – the three optional correction slots
// ---------------------------------------------------------------------------

/// Which reference slot a spectrum belongs to.
///
/// A correction stage is active exactly when its slot holds a spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceKind {
    Dark,
    Baseline,
    Smoothed,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 3] = [
        ReferenceKind::Dark,
        ReferenceKind::Baseline,
        ReferenceKind::Smoothed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ReferenceKind::Dark => "Dark",
            ReferenceKind::Baseline => "Baseline",
            ReferenceKind::Smoothed => "Smoothed",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
