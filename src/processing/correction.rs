use thiserror::Error;

use crate::data::model::Spectrum;

// ---------------------------------------------------------------------------
// Correction stages
// ---------------------------------------------------------------------------

/// Fraction of the intensity distribution treated as background.
pub const BASELINE_PERCENTILE: f64 = 10.0;

/// Degree of the background polynomial.
pub const BASELINE_DEGREE: usize = 2;

/// Samples averaged by the smoothing stage.
pub const SMOOTHING_WINDOW: usize = 5;

/// Why a stage could not run. The pipeline keeps the stage's input when
/// this happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrectionError {
    #[error("reference has {found} samples but the reading has {expected}")]
    IncompatibleReference { expected: usize, found: usize },

    #[error("only {found} samples at or below the background percentile, need at least {}", BASELINE_DEGREE + 1)]
    InsufficientBaselinePoints { found: usize },

    #[error("baseline fit is numerically singular")]
    IllConditionedFit,

    #[error("spectrum has {len} samples, smoothing needs at least {window}")]
    SpectrumTooShort { len: usize, window: usize },
}

/// Subtract `dark` from `raw`, sample by sample.
pub fn subtract_dark(raw: &Spectrum, dark: &Spectrum) -> Result<Spectrum, CorrectionError> {
    if raw.len() != dark.len() {
        return Err(CorrectionError::IncompatibleReference {
            expected: raw.len(),
            found: dark.len(),
        });
    }
    let dark = dark.intensities();
    Ok(raw.map_intensities(|i, y| y - dark[i]))
}

/// Remove a quadratic background fitted through the lowest-intensity samples.
///
/// The samples whose intensity is at or below the 10th percentile are fitted
/// with a degree-2 least-squares polynomial in wavelength; the polynomial is
/// then evaluated over the full axis and subtracted.
pub fn correct_baseline(spectrum: &Spectrum) -> Result<Spectrum, CorrectionError> {
    let baseline = fit_baseline(spectrum)?;
    Ok(spectrum.map_intensities(|i, y| y - baseline[i]))
}

/// Evaluate the fitted background at every wavelength of `spectrum`.
pub fn fit_baseline(spectrum: &Spectrum) -> Result<Vec<f64>, CorrectionError> {
    let needed = BASELINE_DEGREE + 1;
    let Some(threshold) = percentile(spectrum.intensities(), BASELINE_PERCENTILE) else {
        return Err(CorrectionError::InsufficientBaselinePoints { found: 0 });
    };

    let (xs, ys): (Vec<f64>, Vec<f64>) = spectrum.points().filter(|&(_, y)| y <= threshold).unzip();
    if xs.len() < needed {
        return Err(CorrectionError::InsufficientBaselinePoints { found: xs.len() });
    }

    let poly = Quadratic::fit(&xs, &ys)?;
    Ok(spectrum.wavelengths().iter().map(|&x| poly.eval(x)).collect())
}

/// Simple moving average with "valid" convolution semantics.
///
/// The output holds `N - SMOOTHING_WINDOW + 1` samples. The wavelength axis
/// is cut to its leading `N - SMOOTHING_WINDOW + 1` entries rather than
/// re-centred on each window.
pub fn smooth(spectrum: &Spectrum) -> Result<Spectrum, CorrectionError> {
    let len = spectrum.len();
    if len < SMOOTHING_WINDOW {
        return Err(CorrectionError::SpectrumTooShort {
            len,
            window: SMOOTHING_WINDOW,
        });
    }

    let averaged: Vec<f64> = spectrum
        .intensities()
        .windows(SMOOTHING_WINDOW)
        .map(|w| w.iter().sum::<f64>() / SMOOTHING_WINDOW as f64)
        .collect();
    let wavelengths = spectrum.wavelengths()[..averaged.len()].to_vec();

    Ok(Spectrum::from_aligned(wavelengths, averaged))
}

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

/// Percentile with linear interpolation between closest ranks.
fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// `c0 + c1·t + c2·t²` with `t = (x - center) / scale`, so `|t| <= 1`
/// over the fitted points.
#[derive(Debug, Clone, Copy)]
struct Quadratic {
    coeffs: [f64; 3],
    center: f64,
    scale: f64,
}

impl Quadratic {
    fn fit(xs: &[f64], ys: &[f64]) -> Result<Self, CorrectionError> {
        let n = xs.len() as f64;
        let center = xs.iter().sum::<f64>() / n;
        let spread = xs.iter().map(|x| (x - center).abs()).fold(0.0, f64::max);
        let scale = if spread > 0.0 { spread } else { 1.0 };

        // Normal equations: (VᵀV) c = Vᵀy for the Vandermonde matrix V.
        let mut ata = [[0.0f64; 3]; 3];
        let mut aty = [0.0f64; 3];
        for (&x, &y) in xs.iter().zip(ys) {
            let t = (x - center) / scale;
            let powers = [1.0, t, t * t];
            for row in 0..3 {
                aty[row] += powers[row] * y;
                for col in 0..3 {
                    ata[row][col] += powers[row] * powers[col];
                }
            }
        }

        let coeffs = solve3(ata, aty).ok_or(CorrectionError::IllConditionedFit)?;
        Ok(Self {
            coeffs,
            center,
            scale,
        })
    }

    fn eval(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.scale;
        self.coeffs[0] + t * (self.coeffs[1] + t * self.coeffs[2])
    }
}

/// Gaussian elimination with partial pivoting on a 3×3 system.
fn solve3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    let magnitude = a
        .iter()
        .flatten()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    let tolerance = magnitude * 1e-12;

    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() <= tolerance || !a[pivot][col].is_finite() {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(n: usize) -> Vec<f64> {
        (0..n).map(|i| 400.0 + i as f64 * 0.5).collect()
    }

    fn spectrum(ys: Vec<f64>) -> Spectrum {
        Spectrum::new(axis(ys.len()), ys).unwrap()
    }

    /// Quadratic background with two narrow emission lines on top.
    fn peaked_on_background(n: usize) -> Spectrum {
        let xs = axis(n);
        let ys = xs
            .iter()
            .map(|&x| {
                let background = 100.0 + 0.002 * (x - 450.0).powi(2);
                let line1 = 800.0 * (-(x - 430.0).powi(2) / 8.0).exp();
                let line2 = 500.0 * (-(x - 470.0).powi(2) / 4.0).exp();
                background + line1 + line2
            })
            .collect();
        Spectrum::new(xs, ys).unwrap()
    }

    #[test]
    fn dark_subtraction_is_elementwise() {
        let raw = spectrum(vec![10.0, 20.0, 30.0, 40.0]);
        let dark = spectrum(vec![1.0, 2.5, 0.0, -4.0]);
        let out = subtract_dark(&raw, &dark).unwrap();
        assert_eq!(out.intensities(), &[9.0, 17.5, 30.0, 44.0]);
        assert_eq!(out.wavelengths(), raw.wavelengths());
    }

    #[test]
    fn zero_dark_is_identity() {
        let raw = peaked_on_background(64);
        let dark = spectrum(vec![0.0; 64]);
        assert_eq!(subtract_dark(&raw, &dark).unwrap(), raw);
    }

    #[test]
    fn mismatched_dark_is_incompatible() {
        let raw = spectrum(vec![1.0; 512]);
        let dark = spectrum(vec![0.5; 256]);
        assert_eq!(
            subtract_dark(&raw, &dark).unwrap_err(),
            CorrectionError::IncompatibleReference {
                expected: 512,
                found: 256
            }
        );
    }

    #[test]
    fn percentile_matches_linear_interpolation() {
        let values: Vec<f64> = (1..=11).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 10.0), Some(2.0));
        let p = percentile(&[5.0, 1.0], 10.0).unwrap();
        assert!((p - 1.4).abs() < 1e-12);
        assert_eq!(percentile(&[], 10.0), None);
    }

    #[test]
    fn quadratic_fit_recovers_exact_polynomial() {
        let xs = axis(40);
        let ys: Vec<f64> = xs.iter().map(|&x| 3.0 - 0.5 * x + 0.01 * x * x).collect();
        let poly = Quadratic::fit(&xs, &ys).unwrap();
        for (&x, &y) in xs.iter().zip(&ys) {
            assert!((poly.eval(x) - y).abs() < 1e-6, "at {x}: {} vs {y}", poly.eval(x));
        }
    }

    #[test]
    fn baseline_removes_pure_quadratic() {
        let xs = axis(100);
        let ys: Vec<f64> = xs.iter().map(|&x| 50.0 + 0.01 * (x - 420.0).powi(2)).collect();
        let out = correct_baseline(&Spectrum::new(xs, ys).unwrap()).unwrap();
        // The fit goes through the lowest decile, so those samples end near
        // zero and the whole curve lies on the fitted parabola.
        for &y in out.intensities() {
            assert!(y.abs() < 1e-6, "residual {y}");
        }
    }

    #[test]
    fn baseline_lowers_fit_points() {
        let input = peaked_on_background(200);
        let threshold = percentile(input.intensities(), BASELINE_PERCENTILE).unwrap();
        let out = correct_baseline(&input).unwrap();

        let mut checked = 0;
        for (before, after) in input.intensities().iter().zip(out.intensities()) {
            if *before <= threshold {
                assert!(after < before);
                checked += 1;
            }
        }
        assert!(checked >= 3);
    }

    #[test]
    fn second_baseline_pass_changes_less() {
        let input = peaked_on_background(200);
        let once = correct_baseline(&input).unwrap();
        let twice = correct_baseline(&once).unwrap();

        let first_change: f64 = input
            .intensities()
            .iter()
            .zip(once.intensities())
            .map(|(a, b)| (a - b).abs())
            .sum();
        let second_change: f64 = once
            .intensities()
            .iter()
            .zip(twice.intensities())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(second_change < first_change);
    }

    #[test]
    fn baseline_needs_three_points() {
        // Two samples: percentile selects at most one of them.
        let short = spectrum(vec![5.0, 9.0]);
        assert_eq!(
            correct_baseline(&short).unwrap_err(),
            CorrectionError::InsufficientBaselinePoints { found: 1 }
        );

        let empty = spectrum(Vec::new());
        assert_eq!(
            correct_baseline(&empty).unwrap_err(),
            CorrectionError::InsufficientBaselinePoints { found: 0 }
        );
    }

    #[test]
    fn flat_spectrum_baseline_goes_to_zero() {
        let out = correct_baseline(&spectrum(vec![7.0; 16])).unwrap();
        assert!(out.intensities().iter().all(|y| y.abs() < 1e-9));
    }

    #[test]
    fn smoothing_shrinks_by_window_minus_one() {
        let input = spectrum((0..10).map(|v| v as f64).collect());
        let out = smooth(&input).unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(out.intensities(), &[2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        // Leading wavelengths, not window centres.
        assert_eq!(out.wavelengths(), &input.wavelengths()[..6]);
    }

    #[test]
    fn smoothing_exact_window_gives_one_sample() {
        let out = smooth(&spectrum(vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        assert_eq!(out.intensities(), &[3.0]);
        assert_eq!(out.wavelengths(), &[400.0]);
    }

    #[test]
    fn smoothing_rejects_short_spectra() {
        for len in 0..SMOOTHING_WINDOW {
            let err = smooth(&spectrum(vec![1.0; len])).unwrap_err();
            assert_eq!(
                err,
                CorrectionError::SpectrumTooShort {
                    len,
                    window: SMOOTHING_WINDOW
                }
            );
        }
    }
}
