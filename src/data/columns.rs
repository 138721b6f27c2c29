//! Column-name heuristics. No fixed column order is assumed; grouping and
//! identifier columns are located by name.

use super::model::RawTable;
use crate::error::DataProcessingError;

pub const TIMEPOINT_KEYWORD: &str = "timepoint";
pub const CONDITION_KEYWORD: &str = "condition";

/// Indices of the two grouping columns of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingColumns {
    pub timepoint: usize,
    pub condition: usize,
}

impl GroupingColumns {
    /// Both columns are required; absence is fatal.
    pub fn locate(table: &RawTable) -> Result<Self, DataProcessingError> {
        Ok(GroupingColumns {
            timepoint: find_column(&table.columns, TIMEPOINT_KEYWORD)?,
            condition: find_column(&table.columns, CONDITION_KEYWORD)?,
        })
    }

    pub fn contains(&self, col: usize) -> bool {
        col == self.timepoint || col == self.condition
    }
}

/// The single column whose name contains `keyword`, case-insensitive.
pub fn find_column(columns: &[String], keyword: &'static str) -> Result<usize, DataProcessingError> {
    let matches: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, name)| name.to_lowercase().contains(keyword))
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [] => Err(DataProcessingError::MissingColumn { keyword }),
        [only] => Ok(*only),
        many => Err(DataProcessingError::AmbiguousColumn {
            keyword,
            candidates: many.iter().map(|&i| columns[i].clone()).collect(),
        }),
    }
}

/// Participant identifiers: "participant id" anywhere, or a name that
/// starts or ends with "id".
pub fn is_identifier(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    lower.contains("participant id") || lower.ends_with("id") || lower.starts_with("id")
}

/// Columns summarised per group: everything except the grouping columns
/// and anything that names a participant.
pub fn measurement_columns(table: &RawTable, grouping: &GroupingColumns) -> Vec<usize> {
    (0..table.n_columns())
        .filter(|&c| !grouping.contains(c))
        .filter(|&c| {
            let name = &table.columns[c];
            !is_identifier(name) && !name.to_lowercase().contains("participant")
        })
        .collect()
}
