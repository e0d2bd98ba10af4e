use crate::view_state::{FileId, SortDirection, ViewState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainFetch {
    pub file: FileId,
    pub page: usize,
    pub sort_column: Option<String>,
    pub sort_direction: SortDirection,
}

/// A filtered page. Carries no sort fields, the filter endpoint ignores them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredFetch {
    pub file: FileId,
    pub column: String,
    pub query: String,
    pub page: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Plain(PlainFetch),
    Filtered(FilteredFetch),
}

impl FetchRequest {
    pub fn file(&self) -> &FileId {
        match self {
            FetchRequest::Plain(r) => &r.file,
            FetchRequest::Filtered(r) => &r.file,
        }
    }

    pub fn page(&self) -> usize {
        match self {
            FetchRequest::Plain(r) => r.page,
            FetchRequest::Filtered(r) => r.page,
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            FetchRequest::Plain(_) => "data",
            FetchRequest::Filtered(_) => "filter",
        }
    }

    /// Query parameters in wire order. `page` is always the 0-based page.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            FetchRequest::Plain(r) => vec![
                ("filename", r.file.to_string()),
                ("page", r.page.to_string()),
                ("sortColumn", r.sort_column.clone().unwrap_or_default()),
                ("sortDirection", r.sort_direction.as_str().to_string()),
            ],
            FetchRequest::Filtered(r) => vec![
                ("filename", r.file.to_string()),
                ("column", r.column.clone()),
                ("query", r.query.clone()),
                ("page", r.page.to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewRequest {
    NoRequest,
    Fetch(FetchRequest),
}

/// Maps the view state to the single request that shows it.
///
/// An active filter wins over sorting: filtering and sorting are separate view modes.
pub fn resolve(state: &ViewState) -> ViewRequest {
    let Some(file) = state.active_file.clone() else {
        return ViewRequest::NoRequest;
    };

    if state.filter.is_active() {
        return ViewRequest::Fetch(FetchRequest::Filtered(FilteredFetch {
            file,
            column: state.filter.column.clone(),
            query: state.filter.query.clone(),
            page: state.page,
        }));
    }

    ViewRequest::Fetch(FetchRequest::Plain(PlainFetch {
        file,
        page: state.page,
        sort_column: state.sort.column.clone(),
        sort_direction: state.sort.direction,
    }))
}
