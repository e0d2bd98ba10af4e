use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

/// Key of the object the backend decoder puts in place of bare non finite number tokens.
pub const NON_NUMERIC_KEY: &str = "$non_numeric";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    // NaN / Infinity as sent by the server, shown verbatim
    NonNumeric(String),
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Cell::Empty,
            Value::Bool(b) => Cell::Bool(b),
            Value::Number(n) => Cell::Number(n),
            Value::String(s) => Cell::Text(s),
            Value::Object(map) if map.len() == 1 && map.contains_key(NON_NUMERIC_KEY) => {
                match map.get(NON_NUMERIC_KEY) {
                    Some(Value::String(raw)) => Cell::NonNumeric(raw.clone()),
                    _ => Cell::NonNumeric("NaN".to_string()),
                }
            }
            other => Cell::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Text(s) => f.write_str(s),
            Cell::NonNumeric(raw) => f.write_str(raw),
        }
    }
}

pub type Row = HashMap<String, Cell>;

/// One server response. Replaced wholesale, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
    pub total_row_count: u64,
    pub requested_page: usize,
}

impl QueryResult {
    pub fn total_pages(&self, page_size_rows: usize) -> usize {
        (self.total_row_count as usize).div_ceil(page_size_rows.max(1))
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedPaging {
    pub total_pages: usize,
    pub display_page_number: usize,
}

impl DerivedPaging {
    pub fn derive(result: &QueryResult, page: usize, page_size_rows: usize) -> Self {
        DerivedPaging {
            total_pages: result.total_pages(page_size_rows),
            display_page_number: page + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(total_row_count: u64) -> QueryResult {
        QueryResult {
            rows: Vec::new(),
            columns: Vec::new(),
            total_row_count,
            requested_page: 0,
        }
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(result(0).total_pages(10), 0);
        assert_eq!(result(10).total_pages(10), 1);
        assert_eq!(result(25).total_pages(10), 3);
    }

    #[test]
    fn paging_is_one_based_for_display() {
        let paging = DerivedPaging::derive(&result(25), 2, 10);
        assert_eq!(
            paging,
            DerivedPaging {
                total_pages: 3,
                display_page_number: 3
            }
        );
    }

    #[test]
    fn sentinel_object_becomes_non_numeric() {
        let cell = Cell::from(json!({ NON_NUMERIC_KEY: "NaN" }));
        assert_eq!(cell, Cell::NonNumeric("NaN".into()));
        assert_eq!(cell.to_string(), "NaN");
    }

    #[test]
    fn cells_display_as_sent() {
        assert_eq!(Cell::from(json!(100)).to_string(), "100");
        assert_eq!(Cell::from(json!(2.5)).to_string(), "2.5");
        assert_eq!(Cell::from(json!("N/A")).to_string(), "N/A");
        assert_eq!(Cell::from(json!(null)).to_string(), "");
        assert_eq!(Cell::from(json!(true)).to_string(), "true");
    }
}
