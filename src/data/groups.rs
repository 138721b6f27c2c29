use std::collections::BTreeMap;
use std::fmt;

use super::columns::GroupingColumns;
use super::labels::{standardize_condition, standardize_timepoint};
use super::model::RawTable;

// ---------------------------------------------------------------------------
// GroupKey: one (timepoint, condition) cell of the design
// ---------------------------------------------------------------------------

/// Standardized labels identifying one group. Ordered by timepoint first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub timepoint: String,
    pub condition: String,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.timepoint, self.condition)
    }
}

/// Row indices per group, sorted by key.
pub type Groups = BTreeMap<GroupKey, Vec<usize>>;

/// Partition the rows of `table` by standardized (timepoint, condition).
///
/// A row joins a group only when both labels are present; rows with a
/// missing timepoint or condition belong to no group.
pub fn group_rows(table: &RawTable, grouping: &GroupingColumns) -> Groups {
    let mut groups = Groups::new();
    for (i, row) in table.rows.iter().enumerate() {
        let timepoint = standardize_timepoint(&row[grouping.timepoint]).to_label();
        let condition = standardize_condition(&row[grouping.condition]).to_label();
        if let (Some(timepoint), Some(condition)) = (timepoint, condition) {
            groups
                .entry(GroupKey {
                    timepoint,
                    condition,
                })
                .or_default()
                .push(i);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::CellValue;

    fn s(v: &str) -> CellValue {
        CellValue::String(v.to_string())
    }

    #[test]
    fn rows_group_by_standardized_labels() {
        let table = RawTable::new(
            vec!["Timepoint".into(), "Condition".into(), "Speed".into()],
            vec![
                vec![s("post injury 1"), s("Single Task"), CellValue::Float(1.0)],
                vec![s("PI-1"), s("st"), CellValue::Float(2.0)],
                vec![s("PI 2"), s("Dual Task"), CellValue::Float(3.0)],
                vec![CellValue::Null, s("DT"), CellValue::Float(4.0)],
            ],
        );
        let grouping = GroupingColumns::locate(&table).unwrap();
        let groups = group_rows(&table, &grouping);

        let keys: Vec<String> = groups.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["PI-1/ST", "PI-2/DT"]);
        assert_eq!(groups.values().next().unwrap(), &vec![0, 1]);
    }
}
