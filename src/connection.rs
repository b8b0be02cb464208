use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{Od11Error, Result};
use crate::session::Session;
use crate::types::ConnectOptions;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Build the WebSocket handshake request, attaching the optional Origin
/// and Cookie headers some firmware versions require.
fn build_request(
    opts: &ConnectOptions,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = opts.url.as_str().into_client_request()?;
    if let Some(origin) = &opts.origin {
        if !origin.starts_with("http://") && !origin.starts_with("https://") {
            return Err(Od11Error::Config(format!(
                "Origin must be http(s), e.g. http://10.0.0.42: {}",
                origin
            )));
        }
        let value = HeaderValue::from_str(origin.trim_end_matches('/'))
            .map_err(|e| Od11Error::Config(format!("Invalid origin header: {}", e)))?;
        request.headers_mut().insert("Origin", value);
    }
    if let Some(cookie) = &opts.cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| Od11Error::Config(format!("Invalid cookie header: {}", e)))?;
        request.headers_mut().insert("Cookie", value);
    }
    Ok(request)
}

/// Low-level WebSocket transport.
///
/// Owns the writer and reader tasks. Frames queued by the session are
/// drained onto the socket by the writer; inbound text frames are fed back
/// into [`Session::handle_frame`] by the reader. Both tasks stop on the
/// shared shutdown signal, and the reader marks the session closed when the
/// socket goes away underneath it.
pub(crate) struct Connection {
    writer_handle: Option<JoinHandle<()>>,
    reader_handle: Option<JoinHandle<()>>,
}

impl Connection {
    /// Dial the speaker and start the transport tasks
    pub async fn open(
        opts: &ConnectOptions,
        session: Arc<Session>,
        mut ws_rx: mpsc::UnboundedReceiver<Message>,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Result<Self> {
        session.set_phase(crate::state::SessionPhase::Connecting);
        tracing::info!("Connecting to {}", opts.url);

        let request = build_request(opts)?;
        let (ws_stream, _) = connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let mut writer_shutdown = shutdown_tx.subscribe();
        let writer_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_shutdown.recv() => {
                        let _ = write.close().await;
                        break;
                    }
                    msg = ws_rx.recv() => match msg {
                        Some(msg) => {
                            if let Err(e) = write.send(msg).await {
                                tracing::error!("Failed to send message: {}", e);
                                break;
                            }
                        }
                        None => {
                            let _ = write.close().await;
                            break;
                        }
                    },
                }
            }
        });

        let mut reader_shutdown = shutdown_tx.subscribe();
        let reader_session = session.clone();
        let reader_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_shutdown.recv() => break,
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = reader_session.handle_frame(&text) {
                                tracing::warn!("Dropping frame: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("WebSocket connection closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            break;
                        }
                        None => break,
                    },
                }
            }
            reader_session.mark_closed();
        });

        Ok(Self {
            writer_handle: Some(writer_handle),
            reader_handle: Some(reader_handle),
        })
    }

    /// Wait briefly for both transport tasks to finish
    pub async fn close(&mut self) {
        if let Some(handle) = self.writer_handle.take() {
            let _ = timeout(SHUTDOWN_GRACE, handle).await;
        }
        if let Some(handle) = self.reader_handle.take() {
            let _ = timeout(SHUTDOWN_GRACE, handle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_and_cookie_land_in_the_handshake() {
        let opts = ConnectOptions::new("ws://10.0.0.42/ws")
            .with_origin("http://10.0.0.42/")
            .with_cookie("session=abc");
        let request = build_request(&opts).unwrap();
        assert_eq!(request.headers()["Origin"], "http://10.0.0.42");
        assert_eq!(request.headers()["Cookie"], "session=abc");
    }

    #[test]
    fn plain_urls_add_no_extra_headers() {
        let opts = ConnectOptions::new("ws://10.0.0.42/ws");
        let request = build_request(&opts).unwrap();
        assert!(request.headers().get("Origin").is_none());
        assert!(request.headers().get("Cookie").is_none());
    }

    #[test]
    fn non_http_origins_are_rejected() {
        let opts = ConnectOptions::new("ws://10.0.0.42/ws").with_origin("ws://10.0.0.42");
        assert!(matches!(build_request(&opts), Err(Od11Error::Config(_))));
    }
}
