use log::{debug, info};
use nalgebra::DMatrix;

use super::grouped::mean;
use crate::data::columns::is_identifier;
use crate::data::model::{NumericMatrix, RawTable};
use crate::error::DataProcessingError;

/// Turn a raw table into a fully numeric matrix.
///
/// 1. coerce every cell to a number, anything else becomes missing;
/// 2. drop columns, then rows, that are entirely missing;
/// 3. fill remaining gaps with the column mean;
/// 4. drop participant identifier columns;
/// 5. re-index rows densely.
pub fn preprocess(table: &RawTable) -> Result<NumericMatrix, DataProcessingError> {
    let n_rows = table.n_rows();

    // Column-major coerced cells.
    let coerced: Vec<Vec<Option<f64>>> = (0..table.n_columns())
        .map(|c| table.column(c).map(|v| v.to_number()).collect())
        .collect();

    let kept_cols: Vec<usize> = (0..coerced.len())
        .filter(|&c| coerced[c].iter().any(Option::is_some))
        .collect();
    let kept_rows: Vec<usize> = (0..n_rows)
        .filter(|&r| kept_cols.iter().any(|&c| coerced[c][r].is_some()))
        .collect();

    let dropped_cols: Vec<&str> = (0..coerced.len())
        .filter(|c| !kept_cols.contains(c))
        .map(|c| table.columns[c].as_str())
        .collect();
    if !dropped_cols.is_empty() {
        debug!("Dropped non-numeric columns: {dropped_cols:?}");
    }
    if kept_rows.len() < n_rows {
        debug!("Dropped {} empty rows", n_rows - kept_rows.len());
    }

    if kept_rows.is_empty() || kept_cols.is_empty() {
        return Err(DataProcessingError::EmptyAfterCleaning {
            rows: kept_rows.len(),
            columns: kept_cols.len(),
        });
    }

    // Mean imputation over the surviving rows.
    let mut columns: Vec<(String, Vec<f64>)> = Vec::with_capacity(kept_cols.len());
    let mut still_missing = Vec::new();
    for &c in &kept_cols {
        let present: Vec<f64> = kept_rows.iter().filter_map(|&r| coerced[c][r]).collect();
        let fill = mean(&present).unwrap_or(f64::NAN);
        let values: Vec<f64> = kept_rows
            .iter()
            .map(|&r| coerced[c][r].unwrap_or(fill))
            .collect();
        if values.iter().any(|v| !v.is_finite()) {
            still_missing.push(table.columns[c].clone());
        }
        columns.push((table.columns[c].clone(), values));
    }
    if !still_missing.is_empty() {
        return Err(DataProcessingError::NonNumericColumns(still_missing));
    }

    let (ids, columns): (Vec<_>, Vec<_>) =
        columns.into_iter().partition(|(name, _)| is_identifier(name));
    if !ids.is_empty() {
        let names: Vec<&str> = ids.iter().map(|(n, _)| n.as_str()).collect();
        debug!("Dropped identifier columns: {names:?}");
    }
    if columns.is_empty() {
        return Err(DataProcessingError::EmptyAfterCleaning {
            rows: kept_rows.len(),
            columns: 0,
        });
    }

    let data = DMatrix::from_fn(kept_rows.len(), columns.len(), |r, c| columns[c].1[r]);
    let names = columns.into_iter().map(|(name, _)| name).collect();
    let matrix = NumericMatrix::new(names, data);
    info!("Processed numeric matrix shape: {:?}", matrix.shape());
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::CellValue;

    fn s(v: &str) -> CellValue {
        CellValue::String(v.to_string())
    }

    fn f(v: f64) -> CellValue {
        CellValue::Float(v)
    }

    #[test]
    fn cleans_mixed_table() {
        let table = RawTable::new(
            vec![
                "Participant ID".into(),
                "Timepoint".into(),
                "Speed".into(),
                "Cadence".into(),
                "Notes".into(),
            ],
            vec![
                vec![CellValue::Integer(1), s("PI-1"), f(1.0), f(100.0), s("ok")],
                vec![CellValue::Null, s("PI-1"), CellValue::Null, CellValue::Null, s("-")],
                vec![CellValue::Integer(2), s("PI-2"), s("3.0"), CellValue::Null, s("ok")],
                vec![CellValue::Integer(3), s("PI-2"), f(5.0), f(110.0), CellValue::Null],
            ],
        );
        let m = preprocess(&table).unwrap();

        assert_eq!(m.columns, vec!["Speed", "Cadence"]);
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.row(0), vec![1.0, 100.0]);
        assert_eq!(m.row(1), vec![3.0, 105.0]);
        assert_eq!(m.row(2), vec![5.0, 110.0]);
        assert!(m.data.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn imputing_huge_values_stays_finite() {
        let table = RawTable::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![f(1.7e308), f(1.0)],
                vec![f(1.7e308), f(2.0)],
                vec![CellValue::Null, f(3.0)],
            ],
        );
        let m = preprocess(&table).unwrap();
        assert!(m.data.iter().all(|v| v.is_finite()));
        assert_eq!(m.row(2), vec![1.7e308, 3.0]);
    }

    #[test]
    fn identifier_columns_are_excluded() {
        let table = RawTable::new(
            vec!["PARTICIPANT ID".into(), "SubjectId".into(), "Speed".into()],
            vec![
                vec![f(1.0), f(10.0), f(1.0)],
                vec![f(2.0), f(11.0), f(2.0)],
            ],
        );
        let m = preprocess(&table).unwrap();
        assert_eq!(m.columns, vec!["Speed"]);
    }

    #[test]
    fn all_text_table_is_rejected() {
        let table = RawTable::new(
            vec!["Timepoint".into(), "Condition".into()],
            vec![vec![s("PI-1"), s("ST")], vec![s("PI-2"), s("DT")]],
        );
        assert!(matches!(
            preprocess(&table),
            Err(DataProcessingError::EmptyAfterCleaning { rows: 0, columns: 0 })
        ));
    }

    #[test]
    fn only_identifiers_left_is_rejected() {
        let table = RawTable::new(
            vec!["Participant ID".into(), "Condition".into()],
            vec![vec![f(1.0), s("ST")]],
        );
        assert!(matches!(
            preprocess(&table),
            Err(DataProcessingError::EmptyAfterCleaning { columns: 0, .. })
        ));
    }

    #[test]
    fn empty_table_is_rejected() {
        let table = RawTable::new(vec!["Speed".into()], vec![]);
        assert!(preprocess(&table).is_err());
    }
}
