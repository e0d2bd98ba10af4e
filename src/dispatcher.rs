use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, trace};

use crate::backend::Backend;
use crate::domain::SheetError;
use crate::sync::{Command, Completion};

/// Runs backend calls on a rayon pool and hands their outcomes back to the UI thread.
///
/// Requests are never cancelled. Completions arrive in whatever order the server answers.
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    pool: ThreadPool,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn Backend>, workers: usize) -> Result<Self, SheetError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|idx| format!("sheetview-io-{idx}"))
            .build()?;
        let (tx, rx) = unbounded();
        Ok(Self {
            backend,
            pool,
            tx,
            rx,
        })
    }

    pub fn dispatch(&self, command: Command) {
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let completion = execute(backend.as_ref(), command);
            if tx.send(completion).is_err() {
                trace!("UI is gone, dropping completion");
            }
        });
    }

    pub fn dispatch_all(&self, commands: Vec<Command>) {
        for command in commands {
            self.dispatch(command);
        }
    }

    /// Completions that arrived since the last call, in arrival order.
    pub fn drain(&self) -> Vec<Completion> {
        self.rx.try_iter().collect()
    }

    #[cfg(test)]
    pub fn receiver(&self) -> &Receiver<Completion> {
        &self.rx
    }
}

pub fn execute(backend: &dyn Backend, command: Command) -> Completion {
    match command {
        Command::Fetch { seq, request } => {
            debug!("Fetch #{seq} running");
            let outcome = backend.fetch(&request);
            Completion::Fetched {
                seq,
                request,
                outcome,
            }
        }
        Command::Upload {
            seq,
            file_name,
            bytes,
        } => {
            debug!("Upload #{seq} running");
            Completion::Uploaded {
                seq,
                outcome: backend.upload(&file_name, bytes),
            }
        }
        Command::Clear { file } => {
            let outcome = backend.clear(&file);
            Completion::Cleared { file, outcome }
        }
    }
}
