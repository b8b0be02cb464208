use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::session::Session;

/// Milliseconds since the Unix epoch, used as the ping payload
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Spawn the periodic application-level ping task.
///
/// The speaker drops sessions it considers idle; a ping every `period`
/// keeps the session alive and doubles as a liveness probe since the echoed
/// pong carries the send timestamp back. The task ends on the shutdown
/// signal or on the first send failure.
pub(crate) fn spawn(
    session: Arc<Session>,
    period: Duration,
    shutdown_tx: &broadcast::Sender<()>,
) -> JoinHandle<()> {
    let mut shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = session.send_ping() {
                        tracing::debug!("Keepalive stopped: {}", e);
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JoinOptions;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test(start_paused = true)]
    async fn pings_are_sent_each_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(JoinOptions::default(), tx));
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = spawn(session, Duration::from_secs(25), &shutdown_tx);

        tokio::time::sleep(Duration::from_secs(24)).await;
        assert!(rx.try_recv().is_err(), "ping arrived before the period");

        tokio::time::sleep(Duration::from_secs(2)).await;
        match rx.try_recv() {
            Ok(Message::Text(text)) => assert!(text.contains("speaker_ping")),
            other => panic!("expected a ping frame, got {:?}", other),
        }

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(rx.try_recv().is_ok(), "second ping missing");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_stops_once_the_session_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(JoinOptions::default(), tx));
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = spawn(session.clone(), Duration::from_secs(25), &shutdown_tx);
        session.mark_closed();

        tokio::time::sleep(Duration::from_secs(26)).await;
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
