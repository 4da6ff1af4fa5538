use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, LargeListArray, ListArray};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::Spectrum;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load recorded spectra from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – Parquet file with `x` and `y` list columns
/// * `.json`    – `[{ "x": [...], "y": [...], ... }, ...]`
/// * `.csv`     – either an exported `Wavelength,Intensity` record (one
///   spectrum), or columns `x` and `y` holding semicolon-separated floats
///   (one spectrum per row)
///
/// Every returned spectrum has a strictly increasing wavelength axis.
pub fn load_file(path: &Path) -> Result<Vec<Spectrum>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let spectra = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    for (i, sp) in spectra.iter().enumerate() {
        check_increasing(sp).with_context(|| format!("spectrum {i} in {}", path.display()))?;
    }
    Ok(spectra)
}

fn pair(x: Vec<f64>, y: Vec<f64>, row: usize) -> Result<Spectrum> {
    Spectrum::new(x, y).with_context(|| format!("Row {row}"))
}

fn check_increasing(sp: &Spectrum) -> Result<()> {
    if let Some(j) = sp.wavelengths().windows(2).position(|w| w[1] <= w[0]) {
        bail!(
            "wavelength axis is not strictly increasing at index {}: {} then {}",
            j + 1,
            sp.wavelengths()[j],
            sp.wavelengths()[j + 1]
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON; keys other than `x` and `y` are ignored.
///
/// ```json
/// [
///   { "x": [500.0, 500.5, ...], "y": [1021.0, 1019.5, ...] },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<Vec<Spectrum>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let obj = rec
                .as_object()
                .with_context(|| format!("Row {i} is not a JSON object"))?;
            let x = json_array_to_f64(obj.get("x"), i, "x")?;
            let y = json_array_to_f64(obj.get("y"), i, "y")?;
            pair(x, y, i)
        })
        .collect()
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path) -> Result<Vec<Spectrum>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    if let (Some(w_idx), Some(i_idx)) = (find("Wavelength"), find("Intensity")) {
        return load_export_csv(reader, w_idx, i_idx);
    }

    let x_idx = find("x").context("CSV needs 'Wavelength'/'Intensity' or 'x'/'y' columns")?;
    let y_idx = find("y").context("CSV missing 'y' column")?;
    load_list_csv(reader, x_idx, y_idx)
}

/// One spectrum, one `(wavelength, intensity)` sample per row.
fn load_export_csv(
    mut reader: csv::Reader<std::fs::File>,
    w_idx: usize,
    i_idx: usize,
) -> Result<Vec<Spectrum>> {
    let mut x = Vec::new();
    let mut y = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        x.push(parse_float(record.get(w_idx).unwrap_or(""), row_no, "Wavelength")?);
        y.push(parse_float(record.get(i_idx).unwrap_or(""), row_no, "Intensity")?);
    }

    Ok(vec![pair(x, y, 0)?])
}

/// Many spectra, `x` and `y` holding semicolon-separated floats:
///   `"500.0;500.5;501.0"`, `"1021.0;1019.5;1030.0"`
fn load_list_csv(
    mut reader: csv::Reader<std::fs::File>,
    x_idx: usize,
    y_idx: usize,
) -> Result<Vec<Spectrum>> {
    let mut spectra = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let x = parse_semicolon_floats(record.get(x_idx).unwrap_or(""), row_no, "x")?;
        let y = parse_semicolon_floats(record.get(y_idx).unwrap_or(""), row_no, "y")?;
        spectra.push(pair(x, y, row_no)?);
    }

    Ok(spectra)
}

fn parse_float(s: &str, row: usize, col: &str) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .with_context(|| format!("Row {row}, {col}: '{s}' is not a number"))
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with `x` and `y` columns of type List<Float64>,
/// LargeList<Float64> or the Float32 equivalents. Other columns are ignored.
fn load_parquet(path: &Path) -> Result<Vec<Spectrum>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut spectra = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let x_idx = schema
            .index_of("x")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'x' column"))?;
        let y_idx = schema
            .index_of("y")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'y' column"))?;

        let x_col = batch.column(x_idx);
        let y_col = batch.column(y_idx);

        for row in 0..batch.num_rows() {
            let x = extract_f64_list(x_col, row)
                .with_context(|| format!("Row {row}: failed to read 'x'"))?;
            let y = extract_f64_list(y_col, row)
                .with_context(|| format!("Row {row}: failed to read 'y'"))?;
            spectra.push(pair(x, y, row)?);
        }
    }

    Ok(spectra)
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}
