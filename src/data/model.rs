use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use nalgebra::DMatrix;

// ---------------------------------------------------------------------------
// CellValue – a single cell of the raw table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value as read from CSV / JSON / Parquet.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Missing cells: explicit nulls and NaN floats.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Numeric coercion of a single cell. Anything that cannot be read as a
    /// finite number (free text, empty strings, nulls, infinities) is `None`.
    pub fn to_number(&self) -> Option<f64> {
        let v = match self {
            CellValue::Float(v) => *v,
            CellValue::Integer(i) => *i as f64,
            CellValue::Bool(b) => f64::from(u8::from(*b)),
            CellValue::String(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Null => return None,
        };
        v.is_finite().then_some(v)
    }

    /// Text form used for labels; `None` for missing cells.
    pub fn to_label(&self) -> Option<String> {
        if self.is_missing() {
            None
        } else {
            Some(self.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// RawTable – the uploaded table, one row per measurement session
// ---------------------------------------------------------------------------

/// Rectangular table with named columns. Column order is the header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    /// Row-major cells; every row has exactly `columns.len()` cells.
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    /// Build a table, padding short rows with nulls and truncating long ones.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Null);
                row
            })
            .collect();
        RawTable { columns, rows }
    }

    /// Build a table from record-oriented rows. Columns appear in order of
    /// first occurrence; cells absent from a record are null.
    pub fn from_records(records: Vec<BTreeMap<String, CellValue>>) -> Self {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut columns: Vec<String> = Vec::new();
        for rec in &records {
            for col in rec.keys() {
                if seen.insert(col.clone()) {
                    columns.push(col.clone());
                }
            }
        }
        let rows = records
            .into_iter()
            .map(|mut rec| {
                columns
                    .iter()
                    .map(|c| rec.remove(c).unwrap_or(CellValue::Null))
                    .collect()
            })
            .collect();
        RawTable { columns, rows }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, col: usize) -> &CellValue {
        &self.rows[row][col]
    }

    /// All cells of one column, top to bottom.
    pub fn column(&self, col: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().map(move |r| &r[col])
    }
}

// ---------------------------------------------------------------------------
// NumericMatrix – the cleaned, fully numeric table
// ---------------------------------------------------------------------------

/// Rows × variables, every cell a finite number.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericMatrix {
    pub columns: Vec<String>,
    pub data: DMatrix<f64>,
}

impl NumericMatrix {
    pub fn new(columns: Vec<String>, data: DMatrix<f64>) -> Self {
        debug_assert_eq!(columns.len(), data.ncols());
        NumericMatrix { columns, data }
    }

    /// Row-major convenience constructor, mostly for tests and generators.
    pub fn from_rows(columns: Vec<String>, rows: &[Vec<f64>]) -> Self {
        let ncols = columns.len();
        let data = DMatrix::from_fn(rows.len(), ncols, |r, c| rows[r][c]);
        NumericMatrix { columns, data }
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0 || self.data.ncols() == 0
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    pub fn row(&self, r: usize) -> Vec<f64> {
        self.data.row(r).iter().copied().collect()
    }

    /// Keep the given rows, in the given order. Columns are untouched.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let data = DMatrix::from_fn(rows.len(), self.data.ncols(), |r, c| {
            self.data[(rows[r], c)]
        });
        NumericMatrix {
            columns: self.columns.clone(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_cells_to_numbers() {
        assert_eq!(CellValue::Integer(3).to_number(), Some(3.0));
        assert_eq!(CellValue::String(" 1.5 ".into()).to_number(), Some(1.5));
        assert_eq!(CellValue::String("fast".into()).to_number(), None);
        assert_eq!(CellValue::String("".into()).to_number(), None);
        assert_eq!(CellValue::String("inf".into()).to_number(), None);
        assert_eq!(CellValue::Float(f64::NAN).to_number(), None);
        assert_eq!(CellValue::Null.to_number(), None);
    }

    #[test]
    fn records_keep_first_seen_column_order() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), CellValue::Integer(1));
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), CellValue::Integer(2));
        b.insert("b".to_string(), CellValue::Integer(3));

        let table = RawTable::from_records(vec![a, b]);
        assert_eq!(table.columns, vec!["b", "a"]);
        assert_eq!(table.value(0, 1), &CellValue::Null);
        assert_eq!(table.value(1, 0), &CellValue::Integer(3));
    }

    #[test]
    fn select_rows_keeps_columns() {
        let m = NumericMatrix::from_rows(
            vec!["x".into(), "y".into()],
            &[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
        );
        let s = m.select_rows(&[2, 0]);
        assert_eq!(s.shape(), (2, 2));
        assert_eq!(s.row(0), vec![5.0, 6.0]);
        assert_eq!(s.columns, m.columns);
    }
}
