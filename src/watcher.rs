//! Filesystem change notifications for a tracked file, using the notify crate.

use crate::error::{Error, Result};
use crate::message::TailMessage;
use crate::session::TailSession;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Watches the directory of a file and queues its raw notify events.
pub(crate) struct FileWatcher {
    watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    file_path: PathBuf,
}

impl FileWatcher {
    /// Creates a new file watcher for the specified path.
    pub(crate) fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();

        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            receiver: rx,
            file_path,
        })
    }

    /// Starts watching the file's parent directory, so removal and
    /// re-creation of the file are observed too.
    pub(crate) fn start_watching(&mut self) -> Result<()> {
        let watch_path = match self.file_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        self.watcher.watch(watch_path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// Returns the next file system event.
    pub(crate) async fn next_event(&mut self) -> Option<notify::Result<Event>> {
        self.receiver.recv().await
    }

    #[cfg(test)]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &str) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy() == target_file_name)
            .unwrap_or(false)
    })
}

/// Opens and reads (our own included) do not change the file.
pub(crate) fn is_content_event(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}

/// What a notification turned out to mean for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The file grew, or did not change at all.
    Appended,
    /// The file is now shorter than the session offset.
    Truncated,
    /// The file could not be stated.
    Unreadable,
}

/// Classifies a notification from the current size (if the file could be
/// stated) and the session offset.
pub fn classify(current_size: Option<u64>, offset: u64) -> ChangeKind {
    match current_size {
        None => ChangeKind::Unreadable,
        Some(size) if size < offset => ChangeKind::Truncated,
        Some(_) => ChangeKind::Appended,
    }
}

/// Bridges notifications for one file into calls on its [`TailSession`].
///
/// Nothing is debounced: each notification re-reads the full delta up to the
/// current size, so coalesced notifications never skip bytes.
pub struct ChangeWatcher {
    watcher: FileWatcher,
    file_name: String,
    degraded: bool,
}

impl ChangeWatcher {
    pub(crate) fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidConfig {
                message: format!("{} does not name a file", path.display()),
            })?;

        Ok(Self {
            watcher: FileWatcher::new(path)?,
            file_name,
            degraded: false,
        })
    }

    pub(crate) fn start(&mut self) -> Result<()> {
        self.watcher.start_watching()
    }

    /// Waits for the next notification that concerns the tracked file.
    ///
    /// Returns `None` once the underlying watcher has shut down.
    pub(crate) async fn next_notification(&mut self) -> Option<Result<()>> {
        loop {
            match self.watcher.next_event().await? {
                Ok(event) => {
                    if is_content_event(&event) && is_event_relevant_to_file(&event, &self.file_name)
                    {
                        return Some(Ok(()));
                    }
                }
                Err(e) => return Some(Err(Error::Watcher(e))),
            }
        }
    }

    /// Whether the file was unreadable at the last check.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Stats the file and applies whatever changed to `session`.
    ///
    /// Returns the messages to publish, in order. A transient read failure
    /// is returned as an error and leaves both session and watcher state
    /// as they were.
    pub async fn process(&mut self, session: &mut TailSession) -> Result<Vec<TailMessage>> {
        let stat = tokio::fs::metadata(session.path()).await;
        let kind = classify(stat.as_ref().ok().map(|m| m.len()), session.offset());
        let current_size = match stat {
            Ok(metadata) => metadata.len(),
            Err(source) => return Ok(self.mark_unreadable(session.path(), source)),
        };

        // Continuity is unknown after a stall, so recovery rebuilds as well.
        let update = if kind == ChangeKind::Truncated || self.degraded {
            let lines = session.apply_truncation(current_size).await?;
            Some(TailMessage::Reset { lines })
        } else {
            let lines = session.apply_append(current_size).await?;
            (!lines.is_empty()).then_some(TailMessage::Batch { lines })
        };

        let mut messages = Vec::new();
        if self.degraded {
            self.degraded = false;
            tracing::info!(path = %session.path().display(), "File readable again");
            messages.push(TailMessage::Resumed);
        }
        messages.extend(update);
        Ok(messages)
    }

    fn mark_unreadable(&mut self, path: &Path, source: std::io::Error) -> Vec<TailMessage> {
        if self.degraded {
            return Vec::new();
        }
        self.degraded = true;

        let error = Error::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        tracing::warn!(error = %error, "Tail stalled");
        vec![TailMessage::Stalled {
            reason: error.to_string(),
        }]
    }
}
