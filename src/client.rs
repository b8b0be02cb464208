use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::connection::Connection;
use crate::error::{Od11Error, Result};
use crate::keepalive;
use crate::session::Session;
use crate::sources;
use crate::state::{DeviceSnapshot, SessionPhase};
use crate::subscription::StateReceiver;
use crate::types::{ConnectOptions, SessionId, SourceId, Volume};

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Client for controlling a Teenage Engineering OD-11 speaker group
///
/// The `Od11Client` dials the speaker's WebSocket endpoint, runs the
/// two-step join handshake in the background, and mirrors the pushed
/// device state into a local snapshot. Control methods are synchronous
/// and fire-and-forget; confirmation arrives as a state update.
pub struct Od11Client {
    session: Arc<Session>,
    connection: Connection,
    shutdown_tx: broadcast::Sender<()>,
    keepalive_handle: Option<JoinHandle<()>>,
}

impl Od11Client {
    /// Connect to a speaker and start the join handshake
    ///
    /// Returns as soon as the WebSocket is up; use
    /// [`wait_until_ready`](Self::wait_until_ready) to block until the
    /// group has been joined.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use od11::{ConnectOptions, Od11Client};
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let mut client = Od11Client::connect(ConnectOptions::for_host("10.0.0.42")).await?;
    ///     client.wait_until_ready(Duration::from_secs(10)).await?;
    ///     let source = client.resolve_source("bt")?;
    ///     client.set_input(source)?;
    ///     client.set_volume_absolute(35)?;
    ///     client.close().await;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(opts: ConnectOptions) -> Result<Self> {
        let (ws_tx, ws_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(opts.join.clone(), ws_tx));
        let (shutdown_tx, _) = broadcast::channel(1);

        let connection = Connection::open(&opts, session.clone(), ws_rx, &shutdown_tx).await?;
        session.begin_handshake()?;

        let keepalive_handle = opts
            .keepalive
            .map(|period| keepalive::spawn(session.clone(), period, &shutdown_tx));

        Ok(Self {
            session,
            connection,
            shutdown_tx,
            keepalive_handle,
        })
    }

    /// Block until the session is ready for group commands
    ///
    /// Fails with [`Od11Error::Timeout`] if the handshake has not finished
    /// within `ceiling`, or [`Od11Error::ConnectionClosed`] if the
    /// connection died first.
    pub async fn wait_until_ready(&self, ceiling: Duration) -> Result<()> {
        let mut rx = self.subscribe();
        let deadline = tokio::time::Instant::now() + ceiling;
        loop {
            match self.session.phase() {
                SessionPhase::Ready => return Ok(()),
                SessionPhase::Closed => return Err(Od11Error::ConnectionClosed),
                _ => {}
            }
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or(Od11Error::Timeout)?;
            if timeout(remaining, rx.recv()).await.is_err() {
                return Err(Od11Error::Timeout);
            }
        }
    }

    /// Wait up to `ceiling` for the next state change, then return the
    /// snapshot.
    ///
    /// Handy for read-modify flows that want a fresh volume before
    /// computing a delta. Returns the current snapshot as-is once the
    /// connection is closed.
    pub async fn poll_snapshot(&self, ceiling: Duration) -> DeviceSnapshot {
        let mut rx = self.subscribe();
        if self.session.phase() != SessionPhase::Closed {
            let _ = timeout(ceiling, rx.recv()).await;
        }
        self.session.snapshot()
    }

    /// Current handshake phase
    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Copy of the last-known device state
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.session.snapshot()
    }

    /// Session identifier assigned by group_joined, if any
    pub fn sid(&self) -> Option<SessionId> {
        self.session.snapshot().sid
    }

    /// Last observed group volume (0-100)
    pub fn volume(&self) -> Option<Volume> {
        self.session.snapshot().volume
    }

    /// Last observed active input source ID
    pub fn source_id(&self) -> Option<SourceId> {
        self.session.snapshot().source_id
    }

    /// Input sources advertised by the speaker, keyed by ID
    pub fn sources(&self) -> BTreeMap<SourceId, String> {
        self.session.snapshot().sources
    }

    /// Switch the active input source by ID
    pub fn set_input(&self, source: SourceId) -> Result<()> {
        self.session.set_input(source)
    }

    /// Resolve a human-friendly source name and switch to it
    ///
    /// Accepts anything [`resolve_source`](Self::resolve_source) accepts
    /// and returns the ID that was sent.
    pub fn set_input_by_name(&self, name: &str) -> Result<SourceId> {
        let source = self.resolve_source(name)?;
        self.session.set_input(source)?;
        Ok(source)
    }

    /// Change the group volume by a signed delta
    pub fn nudge_volume(&self, amount: i64) -> Result<()> {
        self.session.nudge_volume(amount)
    }

    /// Drive the group volume to an absolute target (clamped to 0-100)
    ///
    /// Encoded as a single relative change against the last observed
    /// volume; an unreported volume counts as 0.
    pub fn set_volume_absolute(&self, target: Volume) -> Result<()> {
        self.session.set_volume_absolute(target)
    }

    /// Resolve a source token against the live source table
    ///
    /// Accepts numeric IDs, full names, prefixes, substrings, and the
    /// usual short aliases ("bt", "opt", "air", ...). Case and
    /// punctuation are ignored. Falls back to the fixed OD-11 source
    /// numbering when the speaker has not advertised a matching name.
    pub fn resolve_source(&self, token: &str) -> Result<SourceId> {
        sources::resolve_source(&self.session.snapshot().sources, token)
    }

    /// Register a callback invoked after every state change
    ///
    /// Callbacks run on the reader task and should return quickly. A
    /// panicking callback is logged and does not affect the others.
    pub fn add_listener(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.session.add_listener(cb);
    }

    /// Subscribe to the stream of state updates
    ///
    /// # Example
    ///
    /// ```no_run
    /// use od11::{ConnectOptions, Od11Client};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = Od11Client::connect(ConnectOptions::for_host("10.0.0.42")).await?;
    ///     let mut rx = client.subscribe();
    ///
    ///     while let Ok(update) = rx.recv().await {
    ///         println!("State update: {:?}", update);
    ///     }
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> StateReceiver {
        self.session.subscribe()
    }

    /// Shut down the background tasks and close the socket
    ///
    /// Waits briefly for each task; safe to call more than once.
    pub async fn close(&mut self) {
        self.session.mark_closed();
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.keepalive_handle.take() {
            let _ = timeout(SHUTDOWN_GRACE, handle).await;
        }
        self.connection.close().await;
    }
}
