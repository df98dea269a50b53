//! The task that owns a tail session.
//!
//! Every change to a session (notifications, retries, subscriptions) is
//! handled by one task, one event at a time, so scans and delta reads for
//! the same file never overlap.

use crate::config::TailOptions;
use crate::error::{Error, Result};
use crate::hub::BroadcastHub;
use crate::observer::{Observer, ObserverId};
use crate::session::TailSession;
use crate::watcher::ChangeWatcher;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Sleep;

/// Requests accepted by a running session.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe { reply: oneshot::Sender<Observer> },
    Unsubscribe { id: ObserverId },
    Stop,
}

/// Sending side of a running session.
///
/// The session stays up while a handle or any of its observers is alive,
/// unless it is stopped or shut down first.
#[derive(Debug, Clone)]
pub(crate) struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    pub(crate) async fn subscribe(&self) -> Result<Observer> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Subscribe { reply })
            .map_err(|_| Error::SessionClosed)?;
        response.await.map_err(|_| Error::SessionClosed)
    }

    pub(crate) fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// A one-shot delay owned by the session and dropped with it.
pub(crate) struct RetryTimer {
    cooldown: Duration,
    delay: Option<Pin<Box<Sleep>>>,
}

impl RetryTimer {
    pub(crate) fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            delay: None,
        }
    }

    /// Arms the timer unless it is already armed.
    pub(crate) fn schedule(&mut self) {
        if self.delay.is_none() {
            self.delay = Some(Box::pin(tokio::time::sleep(self.cooldown)));
        }
    }

    pub(crate) fn cancel(&mut self) {
        self.delay = None;
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self) -> bool {
        self.delay.is_some()
    }

    /// Completes when the armed delay elapses; never, if unarmed.
    pub(crate) async fn fired(&mut self) {
        match self.delay.as_mut() {
            Some(delay) => {
                delay.as_mut().await;
                self.delay = None;
            }
            None => std::future::pending().await,
        }
    }
}

/// Scans `path`, arms its watch and spawns the task that owns it.
///
/// Fails with `NotFound` when the file does not exist.
pub(crate) async fn spawn_session(
    path: PathBuf,
    options: TailOptions,
    shutdown: Option<broadcast::Receiver<()>>,
) -> Result<(SessionHandle, JoinHandle<()>)> {
    options.validate()?;
    tokio::fs::metadata(&path)
        .await
        .map_err(|e| Error::at_start(&path, e))?;

    // Armed before the scan so writes racing startup still raise a notification.
    let mut watcher = ChangeWatcher::new(&path)?;
    watcher.start()?;

    let mut session = TailSession::new(&path, &options)?;
    session.initialize().await?;

    tracing::info!(
        path = %path.display(),
        offset = session.offset(),
        lines = session.snapshot().len(),
        "Tail session started"
    );

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let runner = SessionRunner {
        hub: BroadcastHub::new(options.queue_capacity, commands_tx.downgrade()),
        session,
        watcher,
        retry: RetryTimer::new(options.retry_cooldown),
        stop_when_idle: options.stop_when_idle,
        served: false,
    };
    let task = tokio::spawn(runner.run(commands_rx, shutdown));

    Ok((
        SessionHandle {
            commands: commands_tx,
        },
        task,
    ))
}

struct SessionRunner {
    session: TailSession,
    watcher: ChangeWatcher,
    hub: BroadcastHub,
    retry: RetryTimer,
    stop_when_idle: bool,
    /// Set by the first subscription; a session is never idle before it.
    served: bool,
}

impl SessionRunner {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut shutdown: Option<broadcast::Receiver<()>>,
    ) {
        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,

                command = commands.recv() => match command {
                    Some(Command::Subscribe { reply }) => {
                        self.served = true;
                        let observer = self.hub.subscribe(self.session.snapshot(), self.session.offset());
                        // A requester that gave up drops the observer, which unsubscribes it.
                        let _ = reply.send(observer);
                    }
                    Some(Command::Unsubscribe { id }) => {
                        self.hub.unsubscribe(id);
                    }
                    Some(Command::Stop) | None => break,
                },

                notification = self.watcher.next_notification() => match notification {
                    Some(Ok(())) => self.process().await,
                    Some(Err(e)) => {
                        tracing::warn!(path = %self.path().display(), error = %e, "Watcher error");
                        self.retry.schedule();
                    }
                    None => break,
                },

                _ = self.retry.fired() => self.process().await,
            }

            if self.is_idle() {
                break;
            }
        }

        self.retry.cancel();
        let observers = self.hub.len();
        self.hub.close_all();
        tracing::info!(path = %self.path().display(), observers, "Tail session stopped");
    }

    async fn process(&mut self) {
        match self.watcher.process(&mut self.session).await {
            Ok(messages) => {
                for message in &messages {
                    let observers = self.hub.publish(message);
                    tracing::debug!(
                        path = %self.session.path().display(),
                        offset = self.session.offset(),
                        lines = message.lines().map_or(0, |lines| lines.len()),
                        observers,
                        "Published"
                    );
                }
                if self.watcher.is_degraded() {
                    self.retry.schedule();
                } else {
                    self.retry.cancel();
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path().display(),
                    offset = self.session.offset(),
                    error = %e,
                    "Read failed, will retry"
                );
                self.retry.schedule();
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.stop_when_idle && self.served && self.hub.is_empty()
    }

    fn path(&self) -> &Path {
        self.session.path()
    }
}

async fn wait_for_shutdown(shutdown: &mut Option<broadcast::Receiver<()>>) {
    match shutdown {
        // A dropped sender counts as a shutdown too.
        Some(receiver) => {
            let _ = receiver.recv().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TailMessage;
    use crate::test_helpers::TempLogFile;

    const WAIT: Duration = Duration::from_secs(5);

    async fn next(observer: &mut Observer) -> TailMessage {
        tokio::time::timeout(WAIT, observer.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("observer stream ended")
    }

    #[tokio::test]
    async fn test_retry_timer_fires_once() {
        let mut timer = RetryTimer::new(Duration::from_millis(5));
        assert!(!timer.is_scheduled());

        timer.schedule();
        assert!(timer.is_scheduled());
        tokio::time::timeout(WAIT, timer.fired()).await.unwrap();
        assert!(!timer.is_scheduled());
    }

    #[tokio::test]
    async fn test_retry_timer_cancel() {
        let mut timer = RetryTimer::new(Duration::from_millis(5));
        timer.schedule();
        timer.cancel();

        let result = tokio::time::timeout(Duration::from_millis(50), timer.fired()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_spawn_missing_file_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = spawn_session(temp_dir.path().join("none.log"), TailOptions::default(), None).await;

        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_options() {
        let temp_file = TempLogFile::with_content("a\n").unwrap();
        let options = TailOptions::default().with_backlog_size(0);

        let result = spawn_session(temp_file.path().to_path_buf(), options, None).await;

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_session_streams_appends() {
        let temp_file = TempLogFile::with_content("a\nb\nc\n").unwrap();
        let options = TailOptions::default().with_backlog_size(3);
        let (handle, _task) = spawn_session(temp_file.path().to_path_buf(), options, None)
            .await
            .unwrap();

        let mut observer = handle.subscribe().await.unwrap();
        assert_eq!(
            next(&mut observer).await,
            TailMessage::Snapshot {
                lines: vec!["a".into(), "b".into(), "c".into()]
            }
        );

        temp_file.append("d\n").unwrap();
        assert_eq!(
            next(&mut observer).await,
            TailMessage::Batch {
                lines: vec!["d".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_session_stops_when_last_observer_leaves() {
        let temp_file = TempLogFile::with_content("a\n").unwrap();
        let (handle, task) = spawn_session(
            temp_file.path().to_path_buf(),
            TailOptions::default(),
            None,
        )
        .await
        .unwrap();

        let observer = handle.subscribe().await.unwrap();
        observer.unsubscribe();

        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        assert!(handle.is_closed());
        assert!(matches!(handle.subscribe().await, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn test_stop_command_ends_observer_streams() {
        let temp_file = TempLogFile::with_content("a\n").unwrap();
        let (handle, task) = spawn_session(
            temp_file.path().to_path_buf(),
            TailOptions::default(),
            None,
        )
        .await
        .unwrap();
        let mut observer = handle.subscribe().await.unwrap();

        handle.stop();
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

        assert!(matches!(observer.recv().await, Some(TailMessage::Snapshot { .. })));
        assert_eq!(observer.recv().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_session() {
        let temp_file = TempLogFile::with_content("a\n").unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, task) = spawn_session(
            temp_file.path().to_path_buf(),
            TailOptions::default().with_stop_when_idle(false),
            Some(shutdown_rx),
        )
        .await
        .unwrap();

        let _ = shutdown_tx.send(());

        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        assert!(handle.is_closed());
    }
}
