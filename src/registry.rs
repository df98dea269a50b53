//! Registry of tail sessions, one per tracked file.

use crate::config::TailOptions;
use crate::error::{Error, Result};
use crate::observer::Observer;
use crate::runner::{SessionHandle, spawn_session};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

struct SessionEntry {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

/// Owns every running session and routes watch requests to them.
///
/// Requests for the same file share one session. A session that stopped on
/// its own (its last observer left) is replaced by a fresh one on the next
/// request.
pub struct TailRegistry {
    options: TailOptions,
    sessions: HashMap<PathBuf, SessionEntry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TailRegistry {
    pub fn new(options: TailOptions) -> Result<Self> {
        options.validate()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            options,
            sessions: HashMap::new(),
            shutdown_tx,
        })
    }

    /// Subscribes to `path`, starting its session if needed.
    ///
    /// The returned observer first yields the current backlog as a snapshot.
    pub async fn watch<P: AsRef<Path>>(&mut self, path: P) -> Result<Observer> {
        let path = path.as_ref();
        let key = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| Error::at_start(path, e))?;

        // Sessions that stopped on their own leave a closed handle behind.
        self.sessions.retain(|_, entry| !entry.handle.is_closed());

        if let Some(handle) = self.sessions.get(&key).map(|entry| entry.handle.clone()) {
            match handle.subscribe().await {
                Err(Error::SessionClosed) => {
                    self.sessions.remove(&key);
                }
                result => return result,
            }
        }

        let (handle, task) = spawn_session(
            key.clone(),
            self.options.clone(),
            Some(self.shutdown_tx.subscribe()),
        )
        .await?;
        let observer = handle.subscribe().await?;
        self.sessions.insert(key, SessionEntry { handle, task });

        Ok(observer)
    }

    /// Paths with a running session.
    pub fn sessions(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .sessions
            .iter()
            .filter(|(_, entry)| !entry.handle.is_closed())
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Stops the session for `path`, ending its observers' streams.
    ///
    /// Returns `false` if no session was registered for it.
    pub async fn stop<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let path = path.as_ref();
        let key = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());

        match self.sessions.remove(&key) {
            Some(entry) => {
                entry.handle.stop();
                join_session(&key, entry.task).await;
                true
            }
            None => false,
        }
    }

    /// Stops every session and waits for their tasks to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        for (path, entry) in self.sessions.drain() {
            join_session(&path, entry.task).await;
        }
    }

    #[cfg(test)]
    fn entries(&self) -> usize {
        self.sessions.len()
    }
}

async fn join_session(path: &Path, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        tracing::warn!(path = %path.display(), error = %e, "Tail session task failed");
    }
}

impl Drop for TailRegistry {
    fn drop(&mut self) {
        // Ignore errors if no session is listening
        let _ = self.shutdown_tx.send(());
    }
}
