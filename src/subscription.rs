use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::error::{Od11Error, Result};
use crate::types::{SourceId, Volume};

/// State change published to subscribers
#[derive(Debug, Clone)]
pub enum StateUpdate {
    /// Handshake completed and the initial snapshot is in place
    Ready,

    /// Volume changed; carries the new value
    VolumeChanged(Volume),

    /// Active input changed; carries the new source ID
    InputSourceChanged(SourceId),

    /// A keepalive pong arrived; round-trip time when it matched our ping
    Pong { rtt_ms: Option<i64> },

    /// The connection is gone
    Closed,
}

/// Fans state changes out to registered callbacks and to the broadcast
/// stream behind [`StateReceiver`]
pub(crate) struct Dispatcher {
    listeners: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
    update_tx: broadcast::Sender<StateUpdate>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (update_tx, _) = broadcast::channel(100);
        Self {
            listeners: Mutex::new(Vec::new()),
            update_tx,
        }
    }

    /// Register a callback invoked after every state change.
    ///
    /// Invocation order across callbacks is unspecified.
    pub fn add_listener(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.listeners.lock().unwrap().push(Arc::new(cb));
    }

    /// Subscribe to the update stream
    pub fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.update_tx.subscribe())
    }

    /// Publish an update and run one listener round
    pub fn notify(&self, update: StateUpdate) {
        let _ = self.update_tx.send(update);
        self.run_listeners();
    }

    /// Publish an update without a listener round
    pub fn publish(&self, update: StateUpdate) {
        let _ = self.update_tx.send(update);
    }

    fn run_listeners(&self) {
        // Invoked outside the lock; callbacks may register listeners
        let listeners: Vec<_> = self.listeners.lock().unwrap().clone();
        for cb in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| cb())) {
                tracing::error!("Listener callback panicked: {}", panic_message(&panic));
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Receiver for state updates
pub struct StateReceiver {
    rx: broadcast::Receiver<StateUpdate>,
}

impl StateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<StateUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next state update.
    ///
    /// Fails with [`Od11Error::ConnectionClosed`] once the client has been
    /// dropped and no buffered updates remain.
    pub async fn recv(&mut self) -> Result<StateUpdate> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => Od11Error::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                Od11Error::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive a state update without blocking.
    ///
    /// Returns `None` if no update is pending.
    pub fn try_recv(&mut self) -> Result<Option<StateUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(Od11Error::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(Od11Error::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
