/// Data layer: spectra, reference slots, file import and export.
///
/// Architecture:
/// ```text
///   device capture ──► Spectrum ──► pipeline ──► export (csv)
///                          ▲
///   .parquet / .json / .csv│
///        ┌──────────┐      │
///        │  loader   │─────┘   recorded spectra for the replay backend
///        └──────────┘
///
///   ┌──────────────┐
///   │ SpectrumStore │  dark / baseline / smoothed reference slots
///   └──────────────┘
/// ```

pub mod export;
pub mod loader;
pub mod model;
pub mod store;
