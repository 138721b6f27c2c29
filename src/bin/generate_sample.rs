use std::sync::Arc;

use anyhow::Result;
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// (name, baseline, pace, stability, turning, noise)
const MEASUREMENTS: [(&str, f64, f64, f64, f64, f64); 8] = [
    ("Gait Speed (m/s)", 1.20, 0.18, 0.02, 0.00, 0.03),
    ("Stride Length (m)", 1.35, 0.15, 0.03, 0.00, 0.03),
    ("Cadence (steps/min)", 108.0, 7.0, 0.0, 1.5, 2.0),
    ("Step Width (cm)", 11.0, 0.0, -1.8, 0.3, 0.6),
    ("Double Support (%)", 22.0, -1.5, -2.2, 0.0, 0.8),
    ("Stride Time Variability (%)", 2.5, 0.0, -0.6, 0.2, 0.2),
    ("Turn Duration (s)", 2.1, -0.1, 0.0, 0.45, 0.08),
    ("Trunk Sway (deg)", 4.0, 0.0, -0.5, 0.6, 0.25),
];

/// Spellings are deliberately inconsistent so the label standardizer has
/// something to do.
const TIMEPOINTS: [&str; 4] = ["PI-1", "pi 2", "Pi3", "PI-4"];
const CONDITIONS: [(&str, f64); 3] = [("Single Task", 0.0), ("dual task", -0.6), ("Head Turn", -0.3)];

const PARTICIPANTS: usize = 12;
const MISSING_RATE: f64 = 0.03;

/// Box-Muller on top of the uniform generator.
fn gauss(rng: &mut Pcg64, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-15);
    let u2: f64 = rng.random();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

struct Row {
    participant: String,
    timepoint: String,
    condition: String,
    values: Vec<Option<f64>>,
}

fn generate(rng: &mut Pcg64) -> Vec<Row> {
    let mut rows = Vec::new();
    for p in 0..PARTICIPANTS {
        let base_pace = gauss(rng, 0.0, 1.0);
        let base_stability = gauss(rng, 0.0, 1.0);
        for (t, timepoint) in TIMEPOINTS.iter().enumerate() {
            // Slow recovery over the follow-up visits.
            let recovery = 0.25 * t as f64;
            for &(condition, load) in &CONDITIONS {
                let pace = base_pace + recovery + load + gauss(rng, 0.0, 0.3);
                let stability = base_stability + 0.5 * recovery + gauss(rng, 0.0, 0.3);
                let turning = gauss(rng, 0.0, 1.0) + if condition == "Head Turn" { 0.8 } else { 0.0 };

                let values = MEASUREMENTS
                    .iter()
                    .map(|&(_, base, w_pace, w_stab, w_turn, noise)| {
                        if rng.random::<f64>() < MISSING_RATE {
                            return None;
                        }
                        let v = base
                            + w_pace * pace
                            + w_stab * stability
                            + w_turn * turning
                            + gauss(rng, 0.0, noise);
                        Some((v * 1000.0).round() / 1000.0)
                    })
                    .collect();
                rows.push(Row {
                    participant: format!("P{:03}", p + 1),
                    timepoint: timepoint.to_string(),
                    condition: condition.to_string(),
                    values,
                });
            }
        }
    }

    // A couple of recording glitches for the outlier filter.
    for i in [7, rows.len() / 2] {
        if let Some(row) = rows.get_mut(i) {
            for v in row.values.iter_mut().flatten() {
                *v *= 4.0;
            }
        }
    }
    rows
}

fn header() -> Vec<String> {
    let mut header = vec![
        "Participant ID".to_string(),
        "Timepoint".to_string(),
        "Walk Task Condition".to_string(),
    ];
    header.extend(MEASUREMENTS.iter().map(|m| m.0.to_string()));
    header
}

fn write_csv(rows: &[Row], path: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header())?;
    for row in rows {
        let mut record = vec![
            row.participant.clone(),
            row.timepoint.clone(),
            row.condition.clone(),
        ];
        record.extend(
            row.values
                .iter()
                .map(|v| v.map(|x| x.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(rows: &[Row], path: &str) -> Result<()> {
    let names = header();
    let fields: Vec<Field> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if i < 3 {
                Field::new(name, DataType::Utf8, false)
            } else {
                Field::new(name, DataType::Float64, true)
            }
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.participant.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.timepoint.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.condition.as_str()))),
    ];
    for m in 0..MEASUREMENTS.len() {
        let values: Float64Array = rows.iter().map(|r| r.values[m]).collect();
        columns.push(Arc::new(values));
    }

    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    let mut rng = Pcg64::seed_from_u64(42);
    let rows = generate(&mut rng);

    write_csv(&rows, "sample_gait.csv")?;
    write_parquet(&rows, "sample_gait.parquet")?;

    println!(
        "Wrote {} visits ({} measurements each) to sample_gait.csv and sample_gait.parquet",
        rows.len(),
        MEASUREMENTS.len()
    );
    Ok(())
}
