use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use thiserror::Error;

use super::model::Spectrum;

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

pub const HEADER: [&str; 2] = ["Wavelength", "Intensity"];

/// Timestamp layout embedded in every export file name.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Highest `_N` suffix tried when the timestamped name is already taken.
const MAX_NAME_SUFFIX: u32 = 999;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("cannot create {path}: {source}")]
    CreateFile { path: PathBuf, source: io::Error },

    #[error("writing {path}: {source}")]
    Write { path: PathBuf, source: csv::Error },

    #[error("no free file name for {stem} in {dir}")]
    NameExhausted { dir: PathBuf, stem: String },
}

/// Where an export goes and how its file is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    /// Directory the file is written to; created on demand.
    pub directory: PathBuf,
    /// File-name prefix, e.g. `spectrum` or `log`.
    pub prefix: String,
}

impl ExportTarget {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    /// Write `spectrum` under a name stamped with the current local time.
    pub fn write(&self, spectrum: &Spectrum) -> Result<PathBuf, ExportError> {
        self.write_at(spectrum, Local::now().naive_local())
    }

    /// Write `spectrum` under a name stamped with `time`.
    pub fn write_at(&self, spectrum: &Spectrum, time: NaiveDateTime) -> Result<PathBuf, ExportError> {
        let stem = format!("{}_{}", self.prefix, time.format(TIMESTAMP_FORMAT));
        write_spectrum(spectrum, &self.directory, &stem)
    }
}

/// Write `spectrum` as `<dir>/<stem>.csv`.
///
/// Layout: a `Wavelength,Intensity` header, then one `<float>,<float>` line
/// per sample. An existing file is never overwritten; `_1`, `_2`, … is
/// appended to the stem until a free name is found.
pub fn write_spectrum(spectrum: &Spectrum, dir: &Path, stem: &str) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let (path, file) = create_unique(dir, stem)?;
    if let Err(source) = write_records(file, spectrum) {
        return Err(discard_partial(path, source));
    }

    log::info!("Saved {} samples to {}", spectrum.len(), path.display());
    Ok(path)
}

fn write_records<W: io::Write>(out: W, spectrum: &Spectrum) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);

    writer.write_record(HEADER)?;
    for point in spectrum.points() {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}

/// Remove a file whose write failed part-way, so no truncated record is
/// left behind.
fn discard_partial(path: PathBuf, source: csv::Error) -> ExportError {
    if let Err(e) = fs::remove_file(&path) {
        log::warn!("Could not remove partial {}: {e}", path.display());
    }
    ExportError::Write { path, source }
}

fn create_unique(dir: &Path, stem: &str) -> Result<(PathBuf, File), ExportError> {
    for n in 0..=MAX_NAME_SUFFIX {
        let name = if n == 0 {
            format!("{stem}.csv")
        } else {
            format!("{stem}_{n}.csv")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(ExportError::CreateFile { path, source }),
        }
    }
    Err(ExportError::NameExhausted {
        dir: dir.to_path_buf(),
        stem: stem.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 4, 5)
            .unwrap()
    }

    #[test]
    fn writes_exact_two_column_record() {
        let dir = tempfile::tempdir().unwrap();
        let target = ExportTarget::new(dir.path().join("spectra"), "spectrum");
        let sp = Spectrum::new(vec![500.0, 501.0], vec![10.0, 20.0]).unwrap();

        let path = target.write_at(&sp, noon()).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "spectrum_20240309_120405.csv"
        );
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Wavelength,Intensity\n500.0,10.0\n501.0,20.0\n");
    }

    #[test]
    fn empty_spectrum_still_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let sp = Spectrum::new(Vec::new(), Vec::new()).unwrap();
        let path = write_spectrum(&sp, dir.path(), "log_x").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "Wavelength,Intensity\n");
    }

    #[test]
    fn same_second_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let target = ExportTarget::new(dir.path(), "log");
        let a = Spectrum::new(vec![1.0], vec![1.0]).unwrap();
        let b = Spectrum::new(vec![1.0], vec![2.0]).unwrap();

        let first = target.write_at(&a, noon()).unwrap();
        let second = target.write_at(&b, noon()).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            second.file_name().unwrap().to_str().unwrap(),
            "log_20240309_120405_1.csv"
        );
        assert_eq!(fs::read_to_string(first).unwrap(), "Wavelength,Intensity\n1.0,1.0\n");
        assert_eq!(fs::read_to_string(second).unwrap(), "Wavelength,Intensity\n1.0,2.0\n");
    }

    struct Full;

    impl io::Write for Full {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let sp = Spectrum::new(vec![1.0, 2.0], vec![3.0, 4.0]).unwrap();
        let (path, _) = create_unique(dir.path(), "log_x").unwrap();
        assert!(path.exists());

        let source = write_records(Full, &sp).unwrap_err();
        let err = discard_partial(path.clone(), source);

        assert!(matches!(err, ExportError::Write { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the directory should be.
        let blocker = dir.path().join("logs");
        fs::write(&blocker, b"").unwrap();

        let sp = Spectrum::new(vec![1.0], vec![1.0]).unwrap();
        let err = ExportTarget::new(&blocker, "log").write(&sp).unwrap_err();
        assert!(matches!(err, ExportError::CreateDir { .. }));
    }
}
