use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::PAGE_SIZE_ROWS;

/// Server assigned identity of an uploaded spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(name: impl Into<String>) -> Self {
        FileId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    /// Wire value of the `sortDirection` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortState {
    pub column: Option<String>,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterState {
    pub column: String,
    pub query: String,
}

impl FilterState {
    /// A filter only takes effect once a column is picked and the query has non blank text.
    pub fn is_active(&self) -> bool {
        !self.column.is_empty() && !self.query.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.column.clear();
        self.query.clear();
    }
}

/// What the user currently wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub active_file: Option<FileId>,
    pub page: usize,
    pub page_size_rows: usize,
    pub sort: SortState,
    pub filter: FilterState,
}

impl ViewState {
    pub fn new(page_size_rows: usize) -> Self {
        ViewState {
            active_file: None,
            page: 0,
            page_size_rows: page_size_rows.max(1),
            sort: SortState::default(),
            filter: FilterState::default(),
        }
    }

    /// Click on a column header: same column flips the direction, a new column starts ascending.
    pub fn toggle_sort(&mut self, column: &str) {
        if self.sort.column.as_deref() == Some(column) {
            self.sort.direction = self.sort.direction.toggled();
        } else {
            self.sort.column = Some(column.to_string());
            self.sort.direction = SortDirection::Asc;
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState::new(PAGE_SIZE_ROWS)
    }
}
