use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use super::columns::{find_column, CONDITION_KEYWORD, TIMEPOINT_KEYWORD};
use super::labels::{standardize_condition_str, standardize_timepoint_str};
use super::model::{CellValue, RawTable};
use crate::error::DataProcessingError;

/// One metric under one task condition, spread across timepoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotEntry {
    pub metric: String,
    pub units: String,
    pub task_condition: String,
    pub participant_id: Option<String>,
    /// Timepoint → value. Later rows overwrite earlier ones.
    pub values: BTreeMap<String, f64>,
}

/// Spread every metric column across timepoints, one entry per
/// (metric, task condition).
///
/// The row with an empty timepoint holds the units of each metric; a row
/// whose timepoint reads "Units" is skipped. Only numeric values are kept.
pub fn pivot_metrics(table: &RawTable) -> Result<Vec<PivotEntry>, DataProcessingError> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let tp_col = find_column(&table.columns, TIMEPOINT_KEYWORD)?;
    let cond_col = match find_column(&table.columns, CONDITION_KEYWORD) {
        Ok(c) => Some(c),
        Err(DataProcessingError::MissingColumn { .. }) => None,
        Err(e) => return Err(e),
    };
    let id_col = table
        .columns
        .iter()
        .position(|c| c.to_lowercase().contains("participant id"));

    let units_row = table.rows.iter().find(|r| r[tp_col].is_missing());
    let data_rows: Vec<&Vec<CellValue>> = table
        .rows
        .iter()
        .filter(|r| match r[tp_col].to_label() {
            Some(tp) => !tp.trim().eq_ignore_ascii_case("units"),
            None => false,
        })
        .collect();

    let mut entries = Vec::new();
    for (m, metric) in table.columns.iter().enumerate() {
        if m == tp_col {
            continue;
        }
        let units = units_row
            .and_then(|r| r[m].to_label())
            .unwrap_or_default();

        let mut per_task: Vec<PivotEntry> = Vec::new();
        for row in &data_rows {
            let Some(value) = row[m].to_number() else {
                continue;
            };
            let task = cond_col
                .and_then(|c| row[c].to_label())
                .map(|t| standardize_condition_str(&t))
                .unwrap_or_default();
            let timepoint = row[tp_col]
                .to_label()
                .map(|t| standardize_timepoint_str(&t))
                .unwrap_or_default();

            let idx = match per_task.iter().position(|e| e.task_condition == task) {
                Some(idx) => idx,
                None => {
                    per_task.push(PivotEntry {
                        metric: metric.clone(),
                        units: units.clone(),
                        task_condition: task,
                        participant_id: id_col.and_then(|c| row[c].to_label()),
                        values: BTreeMap::new(),
                    });
                    per_task.len() - 1
                }
            };
            per_task[idx].values.insert(timepoint, value);
        }
        entries.extend(per_task);
    }
    debug!("Pivoted {} metric/task entries", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> CellValue {
        CellValue::String(v.to_string())
    }

    #[test]
    fn pivots_metrics_by_task_and_timepoint() {
        let table = RawTable::new(
            vec![
                "Participant ID".into(),
                "Timepoint".into(),
                "Walk Task Condition".into(),
                "Speed".into(),
            ],
            vec![
                vec![CellValue::Null, CellValue::Null, CellValue::Null, s("m/s")],
                vec![s("P01"), s("PI-1"), s("ST"), CellValue::Float(1.1)],
                vec![s("P01"), s("PI-2"), s("ST"), CellValue::Float(1.3)],
                vec![s("P01"), s("PI-1"), s("Dual Task"), CellValue::Float(0.9)],
                vec![s("P01"), s("PI-3"), s("ST"), s("n/a")],
            ],
        );
        let entries = pivot_metrics(&table).unwrap();
        let speed: Vec<&PivotEntry> = entries.iter().filter(|e| e.metric == "Speed").collect();
        assert_eq!(speed.len(), 2);

        let st = speed[0];
        assert_eq!(st.task_condition, "ST");
        assert_eq!(st.units, "m/s");
        assert_eq!(st.participant_id.as_deref(), Some("P01"));
        assert_eq!(st.values.get("PI-1"), Some(&1.1));
        assert_eq!(st.values.get("PI-2"), Some(&1.3));
        assert!(!st.values.contains_key("PI-3"));

        assert_eq!(speed[1].task_condition, "DT");
    }

    #[test]
    fn empty_table_pivots_to_nothing() {
        let table = RawTable::new(vec!["Timepoint".into()], vec![]);
        assert!(pivot_metrics(&table).unwrap().is_empty());
    }
}
