use std::io;
use std::time::Duration;

use derive_setters::Setters;
use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

use crate::backend::BackendError;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
pub const PAGE_SIZE_ROWS: usize = 10;

pub const HELP_TEXT: &str = "\
q        quit
Left/p   previous page
Right/n  next page
g        go to page
Tab      select next column
S-Tab    select previous column
s        sort by selected column (asc/desc)
f        filter on selected column
/        enter filter query
Enter    search
u        upload file
c        clear file
?        this help
Esc      close popup / cancel input";

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct SheetConfig {
    #[setters(into)]
    pub server_url: String,
    pub request_timeout: Duration,
    pub event_poll_time: u64,
    pub page_size_rows: usize,
    pub workers: usize,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            event_poll_time: 100,
            page_size_rows: PAGE_SIZE_ROWS,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    NextPage,
    PreviousPage,
    GoToPage,
    SelectNextColumn,
    SelectPreviousColumn,
    SortSelectedColumn,
    FilterSelectedColumn,
    EnterQuery,
    Search,
    Upload,
    Clear,
    Help,
    Exit,
    RawKey(KeyEvent),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    Query,
    Page,
    UploadPath,
}

impl InputMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            InputMode::Query => "Search: ",
            InputMode::Page => "Go to page: ",
            InputMode::UploadPath => "Upload file: ",
        }
    }
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("upload failed: {0}")]
    UploadFailed(#[source] BackendError),

    #[error("fetch failed: {0}")]
    FetchFailed(#[source] BackendError),

    #[error("clear failed: {0}")]
    ClearFailed(#[source] BackendError),

    #[error("invalid page {requested}, expected a page between 1 and {total_pages}")]
    InvalidPageNavigation { requested: i64, total_pages: usize },

    #[error("invalid server url {url}: {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("could not start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SheetError {
    /// Short text for the status line. None of these end the session.
    pub fn user_message(&self) -> String {
        match self {
            SheetError::UploadFailed(_) => "Failed to upload file.".to_string(),
            SheetError::FetchFailed(_) => "Failed to fetch data.".to_string(),
            SheetError::ClearFailed(_) => "Failed to clear file.".to_string(),
            SheetError::InvalidPageNavigation {
                requested,
                total_pages,
            } => format!("Invalid page number {requested} (1-{total_pages})."),
            SheetError::InvalidServerUrl { url, .. } => format!("Invalid server url {url}."),
            SheetError::WorkerPool(_) => "Could not start background workers.".to_string(),
            SheetError::Io(e) => format!("Could not read file: {e}"),
        }
    }
}
