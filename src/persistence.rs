//! Background write-behind thread for the persistent store.
//!
//! Evaluation must never wait for storage, so new assignments are handed to this thread and
//! written in submission order. Failed writes are logged and dropped: persistence is an
//! optimization for future evaluations, not a requirement of the current one.
use std::sync::{
    mpsc::{self, Receiver, Sender},
    Arc,
};

use crate::{Error, KeyValueStore, Result};

enum Command {
    Write { key: String, value: String },
    /// Reply once every write submitted before it has been applied.
    Flush(mpsc::SyncSender<()>),
}

/// Handle to submit writes to the persistence thread.
#[derive(Clone)]
pub(crate) struct Persister {
    sender: Sender<Command>,
}

impl Persister {
    /// Queue `value` to be written under `key`. Never blocks.
    pub(crate) fn submit(&self, key: String, value: String) -> Result<()> {
        self.sender
            .send(Command::Write { key, value })
            .map_err(|_| Error::PersistenceUnavailable)
    }

    /// Block until all previously submitted writes have been applied (or dropped).
    pub(crate) fn flush(&self) -> Result<()> {
        let (done_sender, done_receiver) = mpsc::sync_channel(1);
        self.sender
            .send(Command::Flush(done_sender))
            .map_err(|_| Error::PersistenceUnavailable)?;
        done_receiver
            .recv()
            .map_err(|_| Error::PersistenceUnavailable)
    }
}

/// The persistence thread.
///
/// The thread exits once every [`Persister`] handle has been dropped, after applying the writes
/// still queued.
pub(crate) struct PersistenceThread {
    join_handle: std::thread::JoinHandle<()>,
    persister: Persister,
}

impl PersistenceThread {
    pub(crate) fn start(store: Arc<dyn KeyValueStore>) -> Result<PersistenceThread> {
        let (sender, receiver) = mpsc::channel::<Command>();

        let join_handle = std::thread::Builder::new()
            .name("featureflags-persistence".to_owned())
            .spawn(move || run(store, receiver))?;

        Ok(PersistenceThread {
            join_handle,
            persister: Persister { sender },
        })
    }

    pub(crate) fn persister(&self) -> Persister {
        self.persister.clone()
    }

    /// Wait for the thread to apply queued writes and exit.
    ///
    /// Blocks until all other `Persister` clones are dropped as well.
    pub(crate) fn shutdown(self) -> Result<()> {
        drop(self.persister);
        log::debug!(target: "featureflags", "waiting for persistence thread to exit");
        self.join_handle
            .join()
            .map_err(|_| Error::PersistenceThreadPanicked)
    }
}

fn run(store: Arc<dyn KeyValueStore>, receiver: Receiver<Command>) {
    log::debug!(target: "featureflags", "persistence thread started");
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Write { key, value } => {
                if let Err(err) = store.set(&key, &value) {
                    log::warn!(target: "featureflags",
                               storage_key = key.as_str();
                               "failed to persist value, dropping write: {:?}", err);
                }
            }
            Command::Flush(done) => {
                // The requester may have given up waiting.
                let _ = done.send(());
            }
        }
    }
    log::debug!(target: "featureflags", "persistence thread exiting");
}
