use log::{debug, info};
use serde::Serialize;

use crate::data::columns::{measurement_columns, GroupingColumns};
use crate::data::groups::group_rows;
use crate::data::model::RawTable;
use crate::error::DataProcessingError;

/// Mean and sample standard deviation of one variable within one
/// (timepoint, condition) group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedStatistic {
    pub name: String,
    pub mean: f64,
    /// `None` when the group holds a single value.
    pub stdev: Option<f64>,
    pub timepoint: String,
    pub condition: String,
}

/// Serializes as `{"variables": [...]}`. `stdev` is `null` for groups with
/// a single value, since the N−1 estimate is undefined there.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupedStatistics {
    pub variables: Vec<GroupedStatistic>,
}

/// Group rows by standardized (timepoint, condition) and summarise every
/// measurement column.
///
/// Groups come out sorted by timepoint then condition; inside a group the
/// variables keep the table's column order. A variable with no numeric
/// value in a group is omitted for that group.
pub fn grouped_statistics(table: &RawTable) -> Result<GroupedStatistics, DataProcessingError> {
    let grouping = GroupingColumns::locate(table)?;
    let measured = measurement_columns(table, &grouping);
    debug!(
        "Grouping on '{}' x '{}', {} measurement columns",
        table.columns[grouping.timepoint],
        table.columns[grouping.condition],
        measured.len()
    );

    let groups = group_rows(table, &grouping);
    let mut variables = Vec::new();
    for (key, rows) in &groups {
        for &col in &measured {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|&r| table.value(r, col).to_number())
                .collect();
            let Some(mean) = mean(&values) else {
                continue;
            };
            variables.push(GroupedStatistic {
                name: table.columns[col].clone(),
                mean,
                stdev: sample_stdev(&values),
                timepoint: key.timepoint.clone(),
                condition: key.condition.clone(),
            });
        }
    }

    info!(
        "Computed {} grouped statistics over {} groups",
        variables.len(),
        groups.len()
    );
    Ok(GroupedStatistics { variables })
}

/// Running mean. Stays finite for any finite input, however large.
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let m = values.iter().enumerate().fold(0.0, |m, (i, &x)| {
        let k = (i + 1) as f64;
        m + (x / k - m / k)
    });
    Some(m)
}

/// Standard deviation with the N−1 denominator.
pub(crate) fn sample_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    // Work on values scaled into [-1, 1] so the squares cannot overflow.
    let scale = values.iter().fold(0.0_f64, |a, v| a.max(v.abs()));
    if scale == 0.0 {
        return Some(0.0);
    }
    let scaled: Vec<f64> = values.iter().map(|v| v / scale).collect();
    let m = mean(&scaled)?;
    let ss: f64 = scaled.iter().map(|v| (v - m).powi(2)).sum();
    Some(scale * (ss / (values.len() - 1) as f64).sqrt())
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

    fn table(rows: Vec<Vec<CellValue>>) -> RawTable {
        RawTable::new(
            vec![
                "Participant ID".into(),
                "Timepoint".into(),
                "Condition".into(),
                "Speed".into(),
                "Cadence".into(),
            ],
            rows,
        )
    }

    #[test]
    fn single_group_mean_and_stdev() {
        let rows = (1..=5)
            .map(|i| vec![s("P1"), s("PI-1"), s("ST"), f(i as f64), CellValue::Null])
            .collect();
        let stats = grouped_statistics(&table(rows)).unwrap();

        assert_eq!(stats.variables.len(), 1);
        let speed = &stats.variables[0];
        assert_eq!(speed.name, "Speed");
        assert_eq!(speed.mean, 3.0);
        assert!((speed.stdev.unwrap() - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(speed.timepoint, "PI-1");
        assert_eq!(speed.condition, "ST");
    }

    #[test]
    fn groups_split_by_condition_and_timepoint() {
        let rows = vec![
            vec![s("P1"), s("pi 1"), s("single task"), f(1.0), f(100.0)],
            vec![s("P2"), s("PI-1"), s("ST"), f(3.0), f(110.0)],
            vec![s("P1"), s("PI-1"), s("dual task"), f(4.0), f(90.0)],
            vec![s("P2"), s("PI-1"), s("DT"), f(6.0), s("n/a")],
            vec![s("P1"), s("PI-2"), s("ST"), f(7.0), f(95.0)],
            vec![s("P2"), s("post injury 2"), s("ST"), f(9.0), f(97.0)],
        ];
        let stats = grouped_statistics(&table(rows)).unwrap();

        let find = |name: &str, tp: &str, cond: &str| {
            stats
                .variables
                .iter()
                .find(|v| v.name == name && v.timepoint == tp && v.condition == cond)
                .cloned()
        };

        let st1 = find("Speed", "PI-1", "ST").unwrap();
        assert_eq!(st1.mean, 2.0);
        assert!((st1.stdev.unwrap() - 2f64.sqrt()).abs() < 1e-12);

        let dt1 = find("Speed", "PI-1", "DT").unwrap();
        assert_eq!(dt1.mean, 5.0);

        let cad_dt1 = find("Cadence", "PI-1", "DT").unwrap();
        assert_eq!(cad_dt1.mean, 90.0);
        assert_eq!(cad_dt1.stdev, None);

        assert_eq!(find("Speed", "PI-2", "ST").unwrap().mean, 8.0);
        assert!(stats.variables.iter().all(|v| v.name != "Participant ID"));
        assert_eq!(stats.variables.len(), 6);
    }

    #[test]
    fn empty_groups_are_omitted() {
        let rows = vec![
            vec![s("P1"), s("PI-1"), s("ST"), s("fast"), CellValue::Null],
            vec![s("P2"), s("PI-1"), s("ST"), s("slow"), CellValue::Null],
        ];
        let stats = grouped_statistics(&table(rows)).unwrap();
        assert!(stats.variables.is_empty());
    }

    #[test]
    fn missing_timepoint_column_is_fatal() {
        let t = RawTable::new(
            vec!["Condition".into(), "Speed".into()],
            vec![vec![s("ST"), f(1.0)]],
        );
        let err = grouped_statistics(&t).unwrap_err();
        assert!(matches!(err, DataProcessingError::MissingColumn { .. }));
        assert!(err.to_string().contains("timepoint"));
    }

    #[test]
    fn serializes_to_variables_array() {
        let rows = vec![
            vec![s("P1"), s("PI-1"), s("HT"), f(1.0), f(2.0)],
            vec![s("P2"), s("PI-1"), s("HT"), f(3.0), f(2.0)],
        ];
        let stats = grouped_statistics(&table(rows)).unwrap();
        let json = serde_json::to_value(&stats).unwrap();
        let first = &json["variables"][0];
        assert_eq!(first["name"], "Speed");
        assert_eq!(first["mean"], 2.0);
        assert_eq!(first["timepoint"], "PI-1");
        assert_eq!(first["condition"], "HT");
    }

    #[test]
    fn summaries_of_huge_values_do_not_overflow() {
        assert_eq!(mean(&[1.7e308, 1.7e308]), Some(1.7e308));
        assert_eq!(mean(&[1.5e308, -1.5e308]), Some(0.0));
        let sd = sample_stdev(&[1.0e308, 1.0e308, 1.0e308]).unwrap();
        assert_eq!(sd, 0.0);
        assert!(sample_stdev(&[1.2e308, 1.4e308]).unwrap().is_finite());
    }
}
