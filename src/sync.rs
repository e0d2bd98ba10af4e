//! Keeps the view state and the last applied server response in step.
//!
//! Every mutation is followed by an explicit `reconcile` that resolves the view state and queues
//! at most one fetch. Nothing is sent from here: queued `Command`s are taken by the dispatcher and
//! their outcomes come back as `Completion`s through `apply`.
//!
//! Fetches are numbered when queued. A fetch result is applied only if its number is higher than
//! every result seen before it, so the table always ends on the latest intent even when the
//! network reorders responses. Superseded fetches are not aborted, their results are dropped.
//! Uploads are numbered the same way in their own sequence.
//!
//! While a clear is in flight no fetch is queued. Changes made in that window are fetched once the
//! clear is answered, unless the clear succeeded for the file still on screen.

use tracing::{debug, trace, warn};

use crate::backend::BackendError;
use crate::domain::SheetError;
use crate::query::{DerivedPaging, QueryResult};
use crate::resolver::{FetchRequest, ViewRequest, resolve};
use crate::view_state::{FileId, ViewState};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Fetch { seq: u64, request: FetchRequest },
    Upload {
        seq: u64,
        file_name: String,
        bytes: Vec<u8>,
    },
    Clear { file: FileId },
}

#[derive(Debug)]
pub enum Completion {
    Fetched {
        seq: u64,
        request: FetchRequest,
        outcome: Result<QueryResult, BackendError>,
    },
    Uploaded {
        seq: u64,
        outcome: Result<FileId, BackendError>,
    },
    Cleared {
        file: FileId,
        outcome: Result<(), BackendError>,
    },
}

pub struct SyncController {
    state: ViewState,
    result: Option<QueryResult>,
    last_dispatched: u64,
    highest_received: u64,
    last_upload: u64,
    highest_upload: u64,
    clear_pending: Option<FileId>,
    deferred_fetch: bool,
    outbox: Vec<Command>,
    notice: Option<SheetError>,
}

impl SyncController {
    pub fn new(page_size_rows: usize) -> Self {
        Self {
            state: ViewState::new(page_size_rows),
            result: None,
            last_dispatched: 0,
            highest_received: 0,
            last_upload: 0,
            highest_upload: 0,
            clear_pending: None,
            deferred_fetch: false,
            outbox: Vec::new(),
            notice: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn result(&self) -> Option<&QueryResult> {
        self.result.as_ref()
    }

    /// `None` until a result has been applied.
    pub fn total_pages(&self) -> Option<usize> {
        self.result
            .as_ref()
            .map(|r| r.total_pages(self.state.page_size_rows))
    }

    pub fn paging(&self) -> Option<DerivedPaging> {
        self.result
            .as_ref()
            .map(|r| DerivedPaging::derive(r, self.state.page, self.state.page_size_rows))
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_notice(&mut self) -> Option<SheetError> {
        self.notice.take()
    }

    // -------------------------- View state mutations ---------------------------- //

    pub fn set_file(&mut self, file: FileId) {
        trace!("Active file {:?} -> {}", self.state.active_file, file);
        self.state.active_file = Some(file);
        self.state.page = 0;
        self.state.filter.clear();
        self.reconcile();
    }

    /// Moves to 0-based page `page`. Out of range pages are rejected without touching the state.
    pub fn set_page(&mut self, page: usize) -> Result<(), SheetError> {
        if let Some(total_pages) = self.total_pages()
            && page >= total_pages
        {
            debug!("Rejecting page {page}, only {total_pages} pages");
            return Err(SheetError::InvalidPageNavigation {
                requested: page as i64 + 1,
                total_pages,
            });
        }
        if page == self.state.page {
            return Ok(());
        }
        trace!("Page {} -> {page}", self.state.page);
        self.state.page = page;
        self.reconcile();
        Ok(())
    }

    pub fn next_page(&mut self) -> Result<(), SheetError> {
        self.set_page(self.state.page + 1)
    }

    pub fn previous_page(&mut self) -> Result<(), SheetError> {
        match self.state.page.checked_sub(1) {
            Some(page) => self.set_page(page),
            None => Err(SheetError::InvalidPageNavigation {
                requested: 0,
                total_pages: self.total_pages().unwrap_or(0),
            }),
        }
    }

    /// Moves to the 1-based page the user typed in. Only `1..=total_pages` is accepted.
    pub fn go_to_displayed_page(&mut self, page: i64) -> Result<(), SheetError> {
        let total_pages = self.total_pages().unwrap_or(0);
        if page < 1 || page as u64 > total_pages as u64 {
            debug!("Rejecting displayed page {page}, only {total_pages} pages");
            return Err(SheetError::InvalidPageNavigation {
                requested: page,
                total_pages,
            });
        }
        self.set_page((page - 1) as usize)
    }

    /// Keeps the current page, the server re-sorts the whole table.
    pub fn set_sort(&mut self, column: &str) {
        self.state.toggle_sort(column);
        trace!("Sort -> {:?}", self.state.sort);
        self.reconcile();
    }

    pub fn set_filter_column(&mut self, column: &str) {
        self.state.filter.column = column.to_string();
    }

    pub fn set_filter_query(&mut self, query: &str) {
        self.state.filter.query = query.to_string();
    }

    /// Commits the filter fields. A search starts from the first page of the new result.
    /// A blank query drops the filter column too.
    pub fn trigger_search(&mut self) {
        trace!("Search {:?}", self.state.filter);
        if !self.state.filter.is_active() {
            self.state.filter.clear();
        }
        self.state.page = 0;
        self.reconcile();
    }

    /// Asks the server to drop the active file. Local state is reset once the server agrees.
    pub fn clear_all(&mut self) {
        match self.state.active_file.clone() {
            Some(file) => {
                debug!("Clearing {file}");
                self.clear_pending = Some(file.clone());
                self.outbox.push(Command::Clear { file });
            }
            None => self.reset(),
        }
    }

    pub fn upload_file(&mut self, file_name: &str, bytes: Vec<u8>) {
        self.last_upload += 1;
        debug!(
            "Queue upload #{}: {file_name} ({} bytes)",
            self.last_upload,
            bytes.len()
        );
        self.outbox.push(Command::Upload {
            seq: self.last_upload,
            file_name: file_name.to_string(),
            bytes,
        });
    }

    // ---------------------------- Completions --------------------------------- //

    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Fetched {
                seq,
                request,
                outcome,
            } => self.apply_fetch(seq, request, outcome),
            Completion::Uploaded { seq, outcome } => {
                if seq <= self.highest_upload {
                    debug!(
                        "Discarding stale upload #{seq}, already have #{}",
                        self.highest_upload
                    );
                    return;
                }
                self.highest_upload = seq;
                match outcome {
                    Ok(file) => {
                        debug!("Upload #{seq} accepted as {file}");
                        self.set_file(file);
                    }
                    Err(e) => {
                        warn!("Upload #{seq} failed: {e}");
                        self.notice = Some(SheetError::UploadFailed(e));
                    }
                }
            }
            Completion::Cleared { file, outcome } => {
                self.clear_pending = None;
                match outcome {
                    Ok(()) if self.state.active_file.as_ref() == Some(&file) => {
                        debug!("Cleared {file}");
                        self.reset();
                    }
                    Ok(()) => debug!("Cleared {file}, already showing another file"),
                    Err(e) => {
                        warn!("Clearing {file} failed: {e}");
                        self.notice = Some(SheetError::ClearFailed(e));
                    }
                }
                if std::mem::take(&mut self.deferred_fetch) {
                    self.reconcile();
                }
            }
        }
    }

    fn apply_fetch(
        &mut self,
        seq: u64,
        request: FetchRequest,
        outcome: Result<QueryResult, BackendError>,
    ) {
        if seq <= self.highest_received {
            debug!(
                "Discarding stale response #{seq}, already have #{}",
                self.highest_received
            );
            return;
        }
        self.highest_received = seq;

        if self.state.active_file.as_ref() != Some(request.file()) {
            debug!("Discarding response #{seq} for {}", request.file());
            return;
        }

        match outcome {
            Ok(result) => {
                debug!(
                    "Applying response #{seq}: page {} with {} rows of {}",
                    result.requested_page,
                    result.rows.len(),
                    result.total_row_count
                );
                self.result = Some(result);
            }
            Err(e) => {
                warn!("Fetch #{seq} failed: {e}");
                self.notice = Some(SheetError::FetchFailed(e));
            }
        }
    }

    fn reset(&mut self) {
        self.state = ViewState::new(self.state.page_size_rows);
        self.result = None;
        // Anything still in flight belongs to the old file.
        self.highest_received = self.last_dispatched;
        self.deferred_fetch = false;
    }

    fn reconcile(&mut self) {
        if let Some(file) = &self.clear_pending {
            trace!("Not fetching while {file} is being cleared");
            self.deferred_fetch = true;
            return;
        }
        match resolve(&self.state) {
            ViewRequest::NoRequest => trace!("Nothing to fetch"),
            ViewRequest::Fetch(request) => {
                self.last_dispatched += 1;
                debug!("Queue fetch #{}: {:?}", self.last_dispatched, request);
                self.outbox.push(Command::Fetch {
                    seq: self.last_dispatched,
                    request,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Cell, Row};
    use crate::resolver::{FilteredFetch, PlainFetch};
    use crate::view_state::{FilterState, SortDirection};

    fn page_result(page: usize, total: u64, region: &str) -> QueryResult {
        let mut row = Row::new();
        row.insert("Region".into(), Cell::Text(region.into()));
        QueryResult {
            rows: vec![row],
            columns: vec!["Region".into(), "Revenue".into()],
            total_row_count: total,
            requested_page: page,
        }
    }

    fn single_fetch(sync: &mut SyncController) -> (u64, FetchRequest) {
        let mut commands = sync.take_commands();
        assert_eq!(commands.len(), 1, "expected one command: {commands:?}");
        match commands.remove(0) {
            Command::Fetch { seq, request } => (seq, request),
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    fn answer(sync: &mut SyncController, total: u64) {
        let (seq, request) = single_fetch(sync);
        let page = request.page();
        sync.apply(Completion::Fetched {
            seq,
            request,
            outcome: Ok(page_result(page, total, "East")),
        });
    }

    /// Controller showing page 0 of sales.xlsx with `total` rows.
    fn loaded(total: u64) -> SyncController {
        let mut sync = SyncController::new(10);
        sync.set_file(FileId::new("sales.xlsx"));
        answer(&mut sync, total);
        sync
    }

    #[test]
    fn upload_then_first_page() {
        let mut sync = SyncController::new(10);
        sync.upload_file("sales.xlsx", b"xlsx".to_vec());
        let commands = sync.take_commands();
        assert!(matches!(&commands[..], [Command::Upload { file_name, .. }] if file_name == "sales.xlsx"));

        sync.apply(Completion::Uploaded {
            seq: 1,
            outcome: Ok(FileId::new("sales.xlsx")),
        });
        let (seq, request) = single_fetch(&mut sync);
        assert_eq!(
            request,
            FetchRequest::Plain(PlainFetch {
                file: FileId::new("sales.xlsx"),
                page: 0,
                sort_column: None,
                sort_direction: SortDirection::Asc,
            })
        );
        sync.apply(Completion::Fetched {
            seq,
            request,
            outcome: Ok(page_result(0, 25, "East")),
        });

        let paging = sync.paging().unwrap();
        assert_eq!(paging.total_pages, 3);
        assert_eq!(paging.display_page_number, 1);
    }

    #[test]
    fn failed_upload_keeps_state() {
        let mut sync = loaded(25);
        let before = sync.state().clone();
        sync.upload_file("other.xlsx", Vec::new());
        sync.take_commands();
        sync.apply(Completion::Uploaded {
            seq: 1,
            outcome: Err(BackendError::Status {
                status: 400,
                message: "No selected file".into(),
            }),
        });
        assert_eq!(sync.state(), &before);
        assert!(matches!(sync.take_notice(), Some(SheetError::UploadFailed(_))));
        assert!(sync.take_commands().is_empty());
    }

    #[test]
    fn late_response_does_not_overwrite_newer_one() {
        let mut sync = loaded(25);

        sync.set_page(1).unwrap();
        let (first_seq, first) = single_fetch(&mut sync);
        sync.set_page(2).unwrap();
        let (second_seq, second) = single_fetch(&mut sync);
        assert!(second_seq > first_seq);

        sync.apply(Completion::Fetched {
            seq: second_seq,
            request: second,
            outcome: Ok(page_result(2, 25, "West")),
        });
        sync.apply(Completion::Fetched {
            seq: first_seq,
            request: first,
            outcome: Ok(page_result(1, 25, "North")),
        });

        let result = sync.result().unwrap();
        assert_eq!(result.requested_page, 2);
        assert_eq!(result.cell(0, "Region"), Some(&Cell::Text("West".into())));
        assert_eq!(sync.paging().unwrap().display_page_number, 3);
    }

    #[test]
    fn late_response_after_newer_failure_is_dropped() {
        let mut sync = loaded(25);
        sync.set_page(1).unwrap();
        let (first_seq, first) = single_fetch(&mut sync);
        sync.set_page(2).unwrap();
        let (second_seq, second) = single_fetch(&mut sync);

        sync.apply(Completion::Fetched {
            seq: second_seq,
            request: second,
            outcome: Err(BackendError::Transport("timeout".into())),
        });
        sync.apply(Completion::Fetched {
            seq: first_seq,
            request: first,
            outcome: Ok(page_result(1, 25, "North")),
        });

        assert_eq!(sync.result().unwrap().requested_page, 0);
        assert!(matches!(sync.take_notice(), Some(SheetError::FetchFailed(_))));
    }

    #[test]
    fn failed_fetch_keeps_last_result() {
        let mut sync = loaded(25);
        let shown = sync.result().cloned();
        sync.set_sort("Revenue");
        let (seq, request) = single_fetch(&mut sync);
        sync.apply(Completion::Fetched {
            seq,
            request,
            outcome: Err(BackendError::Status {
                status: 500,
                message: "boom".into(),
            }),
        });
        assert_eq!(sync.result().cloned(), shown);
        assert_eq!(sync.state().sort.column.as_deref(), Some("Revenue"));
        assert!(sync.take_commands().is_empty());
    }

    #[test]
    fn out_of_range_pages_are_rejected() {
        let mut sync = loaded(25);
        let before = sync.state().clone();

        assert!(matches!(
            sync.set_page(3),
            Err(SheetError::InvalidPageNavigation { total_pages: 3, .. })
        ));
        assert!(sync.go_to_displayed_page(0).is_err());
        assert!(sync.go_to_displayed_page(-4).is_err());
        assert!(sync.go_to_displayed_page(4).is_err());
        assert!(sync.previous_page().is_err());

        assert_eq!(sync.state(), &before);
        assert!(sync.take_commands().is_empty());
    }

    #[test]
    fn displayed_page_round_trip() {
        let mut sync = loaded(25);
        for k in 1..=3 {
            sync.go_to_displayed_page(k).unwrap();
            sync.take_commands();
            assert_eq!(sync.paging().unwrap().display_page_number, k as usize);
        }
    }

    #[test]
    fn next_stops_at_last_page() {
        let mut sync = loaded(20);
        sync.next_page().unwrap();
        answer(&mut sync, 20);
        assert!(sync.next_page().is_err());
        assert_eq!(sync.state().page, 1);
    }

    #[test]
    fn sort_keeps_page() {
        let mut sync = loaded(25);
        sync.set_page(2).unwrap();
        answer(&mut sync, 25);

        sync.set_sort("Revenue");
        sync.set_sort("Revenue");
        let commands = sync.take_commands();
        assert_eq!(commands.len(), 2);
        match &commands[1] {
            Command::Fetch {
                request: FetchRequest::Plain(r),
                ..
            } => {
                assert_eq!(r.page, 2);
                assert_eq!(r.sort_column.as_deref(), Some("Revenue"));
                assert_eq!(r.sort_direction, SortDirection::Desc);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn filter_edits_do_not_fetch_until_search() {
        let mut sync = loaded(25);
        sync.set_sort("Revenue");
        sync.set_sort("Revenue");
        sync.take_commands();

        sync.set_filter_column("Region");
        sync.set_filter_query("East");
        assert!(sync.take_commands().is_empty());

        sync.trigger_search();
        let (_, request) = single_fetch(&mut sync);
        assert_eq!(
            request,
            FetchRequest::Filtered(FilteredFetch {
                file: FileId::new("sales.xlsx"),
                column: "Region".into(),
                query: "East".into(),
                page: 0,
            })
        );
    }

    #[test]
    fn search_with_blank_query_is_a_plain_fetch() {
        let mut sync = loaded(25);
        sync.set_filter_column("Region");
        sync.set_filter_query("  ");
        sync.trigger_search();
        let (_, request) = single_fetch(&mut sync);
        assert!(matches!(request, FetchRequest::Plain(_)));
        assert_eq!(sync.state().filter, FilterState::default());
    }

    #[test]
    fn new_file_resets_page_and_filter() {
        let mut sync = loaded(25);
        sync.set_page(2).unwrap();
        sync.set_filter_column("Region");
        sync.set_filter_query("East");
        sync.take_commands();

        sync.set_file(FileId::new("q2.xlsx"));
        assert_eq!(sync.state().page, 0);
        assert!(!sync.state().filter.is_active());
        let (_, request) = single_fetch(&mut sync);
        assert_eq!(request.file(), &FileId::new("q2.xlsx"));
    }

    #[test]
    fn clear_resets_on_success_only() {
        let mut sync = loaded(25);
        sync.clear_all();
        let commands = sync.take_commands();
        assert_eq!(
            commands,
            vec![Command::Clear {
                file: FileId::new("sales.xlsx")
            }]
        );

        sync.apply(Completion::Cleared {
            file: FileId::new("sales.xlsx"),
            outcome: Err(BackendError::Status {
                status: 404,
                message: "File not found".into(),
            }),
        });
        assert_eq!(
            sync.state().active_file,
            Some(FileId::new("sales.xlsx"))
        );
        assert!(sync.result().is_some());
        assert!(matches!(sync.take_notice(), Some(SheetError::ClearFailed(_))));

        sync.clear_all();
        sync.take_commands();
        sync.apply(Completion::Cleared {
            file: FileId::new("sales.xlsx"),
            outcome: Ok(()),
        });
        assert_eq!(sync.state(), &ViewState::new(10));
        assert!(sync.result().is_none());
    }

    #[test]
    fn nothing_is_fetched_after_clear() {
        let mut sync = loaded(25);
        sync.clear_all();
        sync.take_commands();
        sync.apply(Completion::Cleared {
            file: FileId::new("sales.xlsx"),
            outcome: Ok(()),
        });

        sync.set_page(1).unwrap();
        sync.set_sort("Revenue");
        sync.trigger_search();
        assert!(sync.take_commands().is_empty());
        assert_eq!(resolve(sync.state()), ViewRequest::NoRequest);
    }

    #[test]
    fn in_flight_fetch_is_ignored_after_clear() {
        let mut sync = loaded(25);
        sync.set_page(1).unwrap();
        let (seq, request) = single_fetch(&mut sync);
        sync.clear_all();
        sync.take_commands();
        sync.apply(Completion::Cleared {
            file: FileId::new("sales.xlsx"),
            outcome: Ok(()),
        });
        sync.apply(Completion::Fetched {
            seq,
            request,
            outcome: Ok(page_result(1, 25, "North")),
        });
        assert!(sync.result().is_none());
    }

    #[test]
    fn no_fetch_while_clear_is_pending() {
        let mut sync = loaded(25);
        sync.clear_all();
        sync.take_commands();
        sync.set_sort("Revenue");
        assert!(sync.take_commands().is_empty());
    }

    #[test]
    fn upload_during_clear_is_fetched_once_clear_is_answered() {
        let mut sync = loaded(25);
        sync.clear_all();
        sync.upload_file("q2.xlsx", Vec::new());
        sync.take_commands();

        sync.apply(Completion::Uploaded {
            seq: 1,
            outcome: Ok(FileId::new("q2.xlsx")),
        });
        assert!(sync.take_commands().is_empty());

        sync.apply(Completion::Cleared {
            file: FileId::new("sales.xlsx"),
            outcome: Ok(()),
        });
        assert_eq!(sync.state().active_file, Some(FileId::new("q2.xlsx")));
        let (seq, request) = single_fetch(&mut sync);
        assert_eq!(request.file(), &FileId::new("q2.xlsx"));

        sync.apply(Completion::Fetched {
            seq,
            request,
            outcome: Ok(page_result(0, 5, "South")),
        });
        assert_eq!(
            sync.result().unwrap().cell(0, "Region"),
            Some(&Cell::Text("South".into()))
        );
    }

    #[test]
    fn sort_during_failed_clear_is_fetched_afterwards() {
        let mut sync = loaded(25);
        sync.clear_all();
        sync.take_commands();
        sync.set_sort("Revenue");
        assert!(sync.take_commands().is_empty());

        sync.apply(Completion::Cleared {
            file: FileId::new("sales.xlsx"),
            outcome: Err(BackendError::Transport("refused".into())),
        });
        let (_, request) = single_fetch(&mut sync);
        match request {
            FetchRequest::Plain(r) => {
                assert_eq!(r.sort_column.as_deref(), Some("Revenue"));
                assert_eq!(r.sort_direction, SortDirection::Asc);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failed_clear_without_changes_fetches_nothing() {
        let mut sync = loaded(25);
        sync.clear_all();
        sync.take_commands();
        sync.apply(Completion::Cleared {
            file: FileId::new("sales.xlsx"),
            outcome: Err(BackendError::Transport("refused".into())),
        });
        assert!(sync.take_commands().is_empty());
    }

    #[test]
    fn older_upload_does_not_replace_newer_one() {
        let mut sync = SyncController::new(10);
        sync.upload_file("q1.xlsx", Vec::new());
        sync.upload_file("q2.xlsx", Vec::new());
        let seqs: Vec<u64> = sync
            .take_commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::Upload { seq, .. } => Some(seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![1, 2]);

        sync.apply(Completion::Uploaded {
            seq: 2,
            outcome: Ok(FileId::new("q2.xlsx")),
        });
        sync.take_commands();
        sync.apply(Completion::Uploaded {
            seq: 1,
            outcome: Ok(FileId::new("q1.xlsx")),
        });

        assert_eq!(sync.state().active_file, Some(FileId::new("q2.xlsx")));
        assert!(sync.take_commands().is_empty());
    }
}
