//! Spectrometer operator console.
//!
//! ```text
//!   DeviceSession ──► raw Spectrum ──► pipeline ──► DisplaySink (live plot)
//!         ▲                              ▲    └───► ExportSink  (logs/*.csv)
//!         │                              │
//!   AcquisitionLoop (preview, logging)   SpectrumStore (dark / baseline / smoothed)
//! ```
//!
//! [`console::Console`] ties the pieces together; the `rusty-spectro`
//! binary puts an egui window on top of it.

pub mod acquisition;
pub mod config;
pub mod console;
pub mod data;
pub mod device;
pub mod processing;
