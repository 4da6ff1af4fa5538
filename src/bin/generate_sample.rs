use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{BooleanArray, Float64Builder, Int64Array, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rusty_spectro::device::simulated::{SimpleRng, SimulatedConfig, linear_axis, synthetic_reading};

/// Frames in the recording; the first few are taken with the lamp off so a
/// replay can be used to capture a dark reference.
const FRAMES: usize = 40;
const DARK_FRAMES: usize = 5;
const INTEGRATION_MS: f64 = 50.0;

fn list_array(rows: &[Vec<f64>]) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        let values = builder.values();
        for &v in row {
            values.append_value(v);
        }
        builder.append(true);
    }
    builder.finish()
}

fn main() -> Result<()> {
    let output_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data.parquet"));

    let config = SimulatedConfig::default();
    let mut rng = SimpleRng::new(config.seed);
    let axis = linear_axis(config.pixels, config.start_nm, config.end_nm);

    let mut all_x: Vec<Vec<f64>> = Vec::with_capacity(FRAMES);
    let mut all_y: Vec<Vec<f64>> = Vec::with_capacity(FRAMES);
    let mut all_frame: Vec<i64> = Vec::with_capacity(FRAMES);
    let mut all_light: Vec<bool> = Vec::with_capacity(FRAMES);

    for frame in 0..FRAMES {
        let light = frame >= DARK_FRAMES;
        // Slow lamp warm-up over the lit frames.
        let warmup = if light {
            0.8 + 0.2 * (frame - DARK_FRAMES) as f64 / (FRAMES - DARK_FRAMES) as f64
        } else {
            1.0
        };
        let y = synthetic_reading(&axis, INTEGRATION_MS * warmup, light, config.noise, &mut rng);

        all_x.push(axis.clone());
        all_y.push(y);
        all_frame.push(frame as i64);
        all_light.push(light);
    }

    let item = Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::List(item.clone()), false),
        Field::new("y", DataType::List(item), false),
        Field::new("frame", DataType::Int64, false),
        Field::new("light", DataType::Boolean, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(list_array(&all_x)),
            Arc::new(list_array(&all_y)),
            Arc::new(Int64Array::from(all_frame)),
            Arc::new(BooleanArray::from(all_light)),
        ],
    )
    .context("building record batch")?;

    // Write Parquet
    let file = std::fs::File::create(&output_path)
        .with_context(|| format!("creating {}", output_path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;

    println!(
        "Wrote {FRAMES} spectra ({} wavelengths each, {DARK_FRAMES} dark) to {}",
        axis.len(),
        output_path.display()
    );
    Ok(())
}
