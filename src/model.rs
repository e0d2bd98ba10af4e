use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, info, trace, warn};

use crate::backend::{Backend, HttpBackend};
use crate::dispatcher::Dispatcher;
use crate::domain::{InputMode, Message, SheetConfig, SheetError};
use crate::inputter::{InputResult, Inputter};
use crate::sync::SyncController;
use crate::table::TableView;

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    INPUT(InputMode),
}

pub struct Model {
    pub status: Status,
    modus: Modus,
    sync: SyncController,
    dispatcher: Dispatcher,
    input: Inputter,
    selected_column: usize,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(config: &SheetConfig) -> Result<Self, SheetError> {
        let backend = HttpBackend::new(&config.server_url, config.request_timeout).map_err(|e| {
            SheetError::InvalidServerUrl {
                url: config.server_url.clone(),
                reason: e.to_string(),
            }
        })?;
        info!("Talking to {}", config.server_url);
        Model::with_backend(config, Arc::new(backend))
    }

    pub fn with_backend(config: &SheetConfig, backend: Arc<dyn Backend>) -> Result<Self, SheetError> {
        Ok(Self {
            status: Status::READY,
            modus: Modus::TABLE,
            sync: SyncController::new(config.page_size_rows),
            dispatcher: Dispatcher::new(backend, config.workers)?,
            input: Inputter::default(),
            selected_column: 0,
            status_message: "Press u to upload a file, ? for help.".to_string(),
            last_status_message_update: Instant::now(),
        })
    }

    // ----------------------------- UI accessors ------------------------------- //

    pub fn sync(&self) -> &SyncController {
        &self.sync
    }

    pub fn table_view(&self) -> TableView {
        TableView::build(self.sync.result(), self.sync.state())
    }

    pub fn selected_column(&self) -> usize {
        self.selected_column
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_status_message_update(&self) -> Instant {
        self.last_status_message_update
    }

    pub fn show_help(&self) -> bool {
        self.modus == Modus::POPUP
    }

    /// Prompt and current text while an input line is open.
    pub fn input_line(&self) -> Option<(&'static str, InputResult)> {
        match self.modus {
            Modus::INPUT(mode) => Some((mode.prompt(), self.input.get())),
            _ => None,
        }
    }

    /// While an input line is open every key goes to it unmapped.
    pub fn raw_keyevents(&self) -> bool {
        matches!(self.modus, Modus::INPUT(_))
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    // ------------------------------ Updates ---------------------------------- //

    pub fn update(&mut self, message: Option<Message>) -> Result<(), SheetError> {
        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::NextPage => {
                        let outcome = self.sync.next_page();
                        self.report(outcome);
                    }
                    Message::PreviousPage => {
                        let outcome = self.sync.previous_page();
                        self.report(outcome);
                    }
                    Message::GoToPage => {
                        let current = self.sync.state().page + 1;
                        self.enter_input(InputMode::Page, &current.to_string());
                    }
                    Message::SelectNextColumn => self.move_column_selection(1),
                    Message::SelectPreviousColumn => self.move_column_selection(-1),
                    Message::SortSelectedColumn => {
                        if let Some(column) = self.selected_column_name() {
                            self.sync.set_sort(&column);
                        }
                    }
                    Message::FilterSelectedColumn => {
                        if let Some(column) = self.selected_column_name() {
                            self.sync.set_filter_column(&column);
                            self.set_status_message(format!(
                                "Filter column {column}, press / to enter a query."
                            ));
                        }
                    }
                    Message::EnterQuery => {
                        let query = self.sync.state().filter.query.clone();
                        self.enter_input(InputMode::Query, &query);
                    }
                    Message::Search => self.sync.trigger_search(),
                    Message::Upload => self.enter_input(InputMode::UploadPath, ""),
                    Message::Clear => self.sync.clear_all(),
                    Message::Help => self.modus = Modus::POPUP,
                    _ => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Help => self.modus = Modus::TABLE,
                    _ => (),
                },
                Modus::INPUT(mode) => {
                    if let Message::RawKey(key) = msg {
                        self.raw_input(mode, key)
                    }
                }
            }
        }

        self.flush();
        Ok(())
    }

    /// Applies whatever the workers finished since the last frame.
    pub fn poll(&mut self) {
        for completion in self.dispatcher.drain() {
            self.sync.apply(completion);
        }
        self.clamp_column_selection();
        self.flush();
    }

    fn flush(&mut self) {
        let commands = self.sync.take_commands();
        if !commands.is_empty() {
            trace!("Dispatching {} commands", commands.len());
            self.dispatcher.dispatch_all(commands);
        }
        if let Some(notice) = self.sync.take_notice() {
            self.set_status_message(notice.user_message());
        }
    }

    fn report(&mut self, outcome: Result<(), SheetError>) {
        if let Err(e) = outcome {
            debug!("{e}");
            self.set_status_message(e.user_message());
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    fn enter_input(&mut self, mode: InputMode, prefill: &str) {
        trace!("Enter input mode {mode:?}");
        self.input.set(prefill);
        self.modus = Modus::INPUT(mode);
    }

    fn raw_input(&mut self, mode: InputMode, key: KeyEvent) {
        let result = self.input.read(key);
        if !result.finished {
            return;
        }
        self.modus = Modus::TABLE;
        self.input.clear();
        if result.canceled {
            return;
        }

        match mode {
            InputMode::Query => {
                self.sync.set_filter_query(&result.input);
                self.sync.trigger_search();
            }
            InputMode::Page => match result.input.trim().parse::<i64>() {
                Ok(page) => {
                    let outcome = self.sync.go_to_displayed_page(page);
                    self.report(outcome);
                }
                Err(_) => self.set_status_message(format!(
                    "Invalid page number {}.",
                    result.input.trim()
                )),
            },
            InputMode::UploadPath => {
                if let Err(e) = self.upload(&result.input) {
                    warn!("Upload of {} not started: {e}", result.input);
                    self.set_status_message(e.user_message());
                }
            }
        }
    }

    fn upload(&mut self, raw_path: &str) -> Result<(), SheetError> {
        let expanded = shellexpand::full(raw_path.trim())
            .map_err(|e| SheetError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, e)))?;
        let path = Path::new(expanded.as_ref());
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SheetError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} is not a file", path.display()),
                ))
            })?;
        let bytes = fs::read(path)?;
        self.set_status_message(format!("Uploading {file_name} ..."));
        self.sync.upload_file(&file_name, bytes);
        Ok(())
    }

    /// Uploads `path` on startup, same as typing it into the upload prompt.
    pub fn upload_path(&mut self, path: &str) -> Result<(), SheetError> {
        self.upload(path)?;
        self.flush();
        Ok(())
    }

    fn columns(&self) -> &[String] {
        self.sync
            .result()
            .map(|r| r.columns.as_slice())
            .unwrap_or(&[])
    }

    fn selected_column_name(&self) -> Option<String> {
        self.columns().get(self.selected_column).cloned()
    }

    fn move_column_selection(&mut self, delta: isize) {
        let ncolumns = self.columns().len();
        if ncolumns == 0 {
            return;
        }
        self.selected_column =
            (self.selected_column as isize + delta).rem_euclid(ncolumns as isize) as usize;
        trace!("Selected column {}", self.selected_column);
    }

    fn clamp_column_selection(&mut self) {
        let ncolumns = self.columns().len();
        if self.selected_column >= ncolumns {
            self.selected_column = ncolumns.saturating_sub(1);
        }
    }
}
