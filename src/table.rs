use crate::query::{DerivedPaging, QueryResult};
use crate::view_state::{SortDirection, ViewState};

pub const NO_FILE_TEXT: &str = "Please upload a file.";
pub const NO_ROWS_TEXT: &str = "No rows to display.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortIndicator {
    Neutral,
    Ascending,
    Descending,
}

impl SortIndicator {
    pub fn symbol(&self) -> &'static str {
        match self {
            SortIndicator::Neutral => "·",
            SortIndicator::Ascending => "▲",
            SortIndicator::Descending => "▼",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCell {
    pub name: String,
    pub indicator: SortIndicator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationBar {
    pub display_page_number: usize,
    pub total_pages: usize,
    pub previous_enabled: bool,
    pub next_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRender {
    pub headers: Vec<HeaderCell>,
    pub rows: Vec<Vec<String>>,
    pub pagination: PaginationBar,
}

/// What the UI draws. Built fresh for every frame, holds no state of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableView {
    Placeholder(&'static str),
    Table(TableRender),
}

impl TableView {
    pub fn build(result: Option<&QueryResult>, state: &ViewState) -> Self {
        let Some(result) = result else {
            return TableView::Placeholder(NO_FILE_TEXT);
        };
        if result.rows.is_empty() {
            return TableView::Placeholder(NO_ROWS_TEXT);
        }

        // Sorting is not in effect while a filter is.
        let sorted_column = if state.filter.is_active() {
            None
        } else {
            state.sort.column.as_deref()
        };

        let headers = result
            .columns
            .iter()
            .map(|name| HeaderCell {
                name: name.clone(),
                indicator: match sorted_column {
                    Some(c) if c == name => match state.sort.direction {
                        SortDirection::Asc => SortIndicator::Ascending,
                        SortDirection::Desc => SortIndicator::Descending,
                    },
                    _ => SortIndicator::Neutral,
                },
            })
            .collect();

        // Server order, the client never reorders rows.
        let rows = (0..result.rows.len())
            .map(|idx| {
                result
                    .columns
                    .iter()
                    .map(|c| result.cell(idx, c).map(|cell| cell.to_string()).unwrap_or_default())
                    .collect()
            })
            .collect();

        // The page on screen, which lags the view state while a fetch is out or after one failed.
        let shown_page = result.requested_page;
        let paging = DerivedPaging::derive(result, shown_page, state.page_size_rows);
        let next_enabled =
            ((shown_page + 1) * state.page_size_rows) < result.total_row_count as usize;

        TableView::Table(TableRender {
            headers,
            rows,
            pagination: PaginationBar {
                display_page_number: paging.display_page_number,
                total_pages: paging.total_pages,
                previous_enabled: shown_page > 0,
                next_enabled,
            },
        })
    }
}
