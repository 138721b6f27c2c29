use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, RawTable};
use crate::error::DataProcessingError;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a measurement table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row with column names, one session per row
/// * `.json`    – `[{ "Timepoint": "PI-1", "Speed": 1.2, ... }, ...]`
///   or `{ "data": [ ... ] }`
/// * `.parquet` – flat scalar columns
pub fn load_file(path: &Path) -> Result<RawTable, DataProcessingError> {
    let table = load_file_inner(path)
        .map_err(|e| DataProcessingError::Unreadable(format!("{}: {e:#}", path.display())))?;
    info!(
        "Loaded {} ({} rows, {} columns)",
        path.display(),
        table.n_rows(),
        table.n_columns()
    );
    Ok(table)
}

/// Parse CSV text from any reader, e.g. an in-memory upload.
pub fn load_csv_reader<R: Read>(reader: R) -> Result<RawTable, DataProcessingError> {
    read_csv(csv::Reader::from_reader(reader))
        .map_err(|e| DataProcessingError::Unreadable(format!("{e:#}")))
}

fn load_file_inner(path: &Path) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path) -> Result<RawTable> {
    let reader = csv::Reader::from_path(path).context("opening CSV")?;
    read_csv(reader)
}

fn read_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<RawTable> {
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.is_empty() {
        bail!("CSV has no header row");
    }
    let columns = dedupe_headers(headers);

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        rows.push(record.iter().map(guess_cell_type).collect());
    }
    debug!("Parsed {} CSV rows", rows.len());

    Ok(RawTable::new(columns, rows))
}

/// Repeated header names get a `.1`, `.2`, ... suffix so every column stays
/// addressable by name.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    headers
        .into_iter()
        .map(|h| {
            if seen.insert(h.clone()) {
                return h;
            }
            let mut n = 1;
            loop {
                let candidate = format!("{h}.{n}");
                if seen.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

const NULL_TOKENS: &[&str] = &["", "na", "n/a", "nan", "null", "none", "#n/a"];

fn guess_cell_type(s: &str) -> CellValue {
    let trimmed = s.trim();
    if NULL_TOKENS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return CellValue::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return CellValue::Float(f);
    }
    if trimmed == "true" || trimmed == "false" {
        return CellValue::Bool(trimmed == "true");
    }
    CellValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the default `df.to_json(orient='records')`,
/// optionally wrapped as `{"data": [...]}`.
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = match &root {
        JsonValue::Array(records) => records,
        JsonValue::Object(obj) => obj
            .get("data")
            .and_then(|d| d.as_array())
            .context("Expected a JSON array or an object with a 'data' array")?,
        _ => bail!("Expected top-level JSON array"),
    };

    let mut rows = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        let row: BTreeMap<String, CellValue> = obj
            .iter()
            .map(|(k, v)| (k.clone(), json_to_cell(v)))
            .collect();
        rows.push(row);
    }

    Ok(RawTable::from_records(rows))
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => guess_cell_type(s),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one scalar column per variable.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            let cells = (0..batch.num_columns())
                .map(|c| extract_cell_value(batch.column(c), row))
                .collect();
            rows.push(cells);
        }
    }

    Ok(RawTable::new(columns, rows))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell_value(col: &Arc<dyn Array>, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    let value = match col.data_type() {
        DataType::Utf8 => col
            .as_string_opt::<i32>()
            .map(|s| guess_cell_type(s.value(row))),
        DataType::LargeUtf8 => col
            .as_string_opt::<i64>()
            .map(|s| guess_cell_type(s.value(row))),
        DataType::Int32 => col
            .as_primitive_opt::<Int32Type>()
            .map(|a| CellValue::Integer(i64::from(a.value(row)))),
        DataType::Int64 => col
            .as_primitive_opt::<Int64Type>()
            .map(|a| CellValue::Integer(a.value(row))),
        DataType::Float32 => col
            .as_primitive_opt::<Float32Type>()
            .map(|a| CellValue::Float(f64::from(a.value(row)))),
        DataType::Float64 => col
            .as_primitive_opt::<Float64Type>()
            .map(|a| CellValue::Float(a.value(row))),
        DataType::Boolean => col.as_boolean_opt().map(|a| CellValue::Bool(a.value(row))),
        _ => None,
    };
    value.unwrap_or_else(|| CellValue::String(format!("{:?}", col.data_type())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_cells_are_typed() {
        let text = "Participant ID,Timepoint,Speed,Note\n\
                    P01,PI-1,1.25,ok\n\
                    P02,PI-2,,NaN\n";
        let table = load_csv_reader(text.as_bytes()).unwrap();
        assert_eq!(table.columns, vec!["Participant ID", "Timepoint", "Speed", "Note"]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.value(0, 2), &CellValue::Float(1.25));
        assert_eq!(table.value(1, 2), &CellValue::Null);
        assert_eq!(table.value(1, 3), &CellValue::Null);
        assert_eq!(table.value(0, 1), &CellValue::String("PI-1".into()));
    }

    #[test]
    fn ragged_csv_is_unreadable() {
        let text = "a,b\n1,2\n3\n";
        let err = load_csv_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(err, DataProcessingError::Unreadable(_)));
    }

    #[test]
    fn duplicate_headers_get_suffixes() {
        let cols = dedupe_headers(vec!["a".into(), "a".into(), "b".into(), "a".into()]);
        assert_eq!(cols, vec!["a", "a.1", "b", "a.2"]);
    }

    #[test]
    fn unsupported_extension_is_unreadable() {
        let err = load_file(Path::new("measurements.xlsx")).unwrap_err();
        assert!(err.to_string().contains("Unsupported file extension"));
    }

    #[test]
    fn json_values_map_to_cells() {
        assert_eq!(json_to_cell(&serde_json::json!(3)), CellValue::Integer(3));
        assert_eq!(json_to_cell(&serde_json::json!(1.5)), CellValue::Float(1.5));
        assert_eq!(json_to_cell(&serde_json::json!(null)), CellValue::Null);
        assert_eq!(
            json_to_cell(&serde_json::json!("2.5")),
            CellValue::Float(2.5)
        );
    }
}
