/// Spectral corrections.
///
/// ```text
///  raw Spectrum
///        │
///        ▼
///   ┌──────────────┐
///   │ dark subtract │  needs a dark reference of equal length
///   └──────────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │   baseline    │  quadratic fit through the lowest decile
///   └──────────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │    smooth     │  5-sample moving average, N - 4 samples out
///   └──────────────┘
/// ```
///
/// Each stage is a pure function in [`correction`]; [`pipeline`] chains the
/// active ones and keeps the last good spectrum when a stage fails.

pub mod correction;
pub mod pipeline;
