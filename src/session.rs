use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Od11Error, Result};
use crate::keepalive::now_ms;
use crate::protocol::{Command, Frame, Reply, SourceEntry, Update};
use crate::state::{DeviceSnapshot, SessionPhase, SessionState};
use crate::subscription::{Dispatcher, StateReceiver, StateUpdate};
use crate::types::{JoinOptions, SessionId, SourceId, Volume};

/// Protocol engine for one speaker connection.
///
/// Owns the handshake state machine and the device snapshot. The transport
/// feeds inbound text frames to [`Session::handle_frame`]; outbound
/// commands are queued onto the writer channel handed over at construction.
/// All methods are synchronous; the snapshot lock is never held across an
/// await point.
pub(crate) struct Session {
    join: JoinOptions,
    state: Mutex<SessionState>,
    ws_tx: mpsc::UnboundedSender<Message>,
    dispatcher: Dispatcher,
}

impl Session {
    pub fn new(join: JoinOptions, ws_tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            join,
            state: Mutex::new(SessionState::new()),
            ws_tx,
            dispatcher: Dispatcher::new(),
        }
    }

    /// Current connection phase
    pub fn phase(&self) -> SessionPhase {
        self.state.lock().unwrap().phase
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        self.state.lock().unwrap().phase = phase;
    }

    /// Copy of the last-known device state
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.lock().unwrap().snapshot.clone()
    }

    /// Register a callback invoked after every state change
    pub fn add_listener(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.dispatcher.add_listener(cb);
    }

    /// Subscribe to the state update stream
    pub fn subscribe(&self) -> StateReceiver {
        self.dispatcher.subscribe()
    }

    /// Send global_join and start waiting for the reply.
    ///
    /// Refused once the session is closed; `Closed` is terminal even when
    /// the transport died before the handshake started.
    pub fn begin_handshake(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.phase == SessionPhase::Closed {
                return Err(Od11Error::ConnectionClosed);
            }
            state.phase = SessionPhase::AwaitingGlobalJoin;
        }
        self.send_raw(Command::global_join(&self.join))
    }

    /// Switch the active input source.
    ///
    /// The ID is sent verbatim; the speaker rejects unknown IDs itself.
    pub fn set_input(&self, source: SourceId) -> Result<()> {
        self.send_command(Command::GroupSetInputSource { source, sid: None })
    }

    /// Change volume by a signed delta; the speaker clamps at its bounds
    pub fn nudge_volume(&self, amount: i64) -> Result<()> {
        self.send_command(Command::GroupChangeVolume { amount, sid: None })
    }

    /// Drive volume to an absolute target by sending one delta computed
    /// against the last observed volume.
    ///
    /// The wire protocol only has relative changes. `target` is clamped to
    /// 0-100 and an unreported current volume counts as 0, so callers that
    /// need precision should wait until the snapshot's volume is known.
    pub fn set_volume_absolute(&self, target: Volume) -> Result<()> {
        let target = target.clamp(0, 100);
        let current = self.snapshot().volume.unwrap_or(0);
        let delta = target - current;
        if delta != 0 {
            self.nudge_volume(delta)?;
        }
        Ok(())
    }

    /// Send an application-level ping and remember its timestamp for pong
    /// matching
    pub fn send_ping(&self) -> Result<()> {
        let value = now_ms();
        {
            let mut state = self.state.lock().unwrap();
            if state.phase == SessionPhase::Closed {
                return Err(Od11Error::ConnectionClosed);
            }
            state.last_ping_sent = Some(value);
        }
        self.send_raw(Command::SpeakerPing { value })
    }

    /// Queue a control command, stamping the session identifier onto
    /// group-scoped commands that lack one.
    ///
    /// Fails with [`Od11Error::NotJoined`] until the group_joined snapshot
    /// has assigned a sid; nothing reaches the wire in that case.
    pub fn send_command(&self, mut command: Command) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if state.phase == SessionPhase::Closed {
                return Err(Od11Error::ConnectionClosed);
            }
            if command.is_group_scoped() {
                match state.snapshot.sid {
                    Some(sid) => command.stamp_sid(sid),
                    None => return Err(Od11Error::NotJoined),
                }
            }
        }
        self.send_raw(command)
    }

    fn send_raw(&self, command: Command) -> Result<()> {
        let json = serde_json::to_string(&command)?;
        tracing::debug!("Sending: {}", json);
        self.ws_tx
            .send(Message::Text(json))
            .map_err(|_| Od11Error::ConnectionClosed)
    }

    /// Parse and apply one inbound text frame.
    ///
    /// Malformed frames and frames that do not fit the current phase fail
    /// with [`Od11Error::Protocol`]; the caller logs them and the
    /// connection stays open.
    pub fn handle_frame(&self, raw: &str) -> Result<()> {
        tracing::debug!("Received: {}", raw);
        let frame: Frame = serde_json::from_str(raw)
            .map_err(|e| Od11Error::Protocol(format!("undecodable frame: {}", e)))?;
        match frame {
            Frame::Reply(reply) => self.handle_reply(reply),
            Frame::Update(update) => self.handle_update(update),
        }
    }

    /// Drop to the terminal phase and tell subscribers the connection is
    /// gone. Safe to call more than once.
    pub fn mark_closed(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.phase == SessionPhase::Closed {
                return;
            }
            state.phase = SessionPhase::Closed;
        }
        self.dispatcher.notify(StateUpdate::Closed);
    }

    fn handle_reply(&self, reply: Reply) -> Result<()> {
        match reply {
            Reply::GlobalJoined { mac, ssid, state } => self.on_global_joined(mac, ssid, state),
            Reply::GroupJoined {
                sid,
                sources,
                state,
            } => self.on_group_joined(sid, sources, state),
            Reply::SpeakerPong { value } => {
                self.on_pong(value);
                Ok(())
            }
            Reply::Other => {
                tracing::debug!("Ignoring unrecognized reply");
                Ok(())
            }
        }
    }

    fn on_global_joined(
        &self,
        mac: Option<String>,
        ssid: Option<String>,
        state: Vec<Update>,
    ) -> Result<()> {
        {
            let mut guard = self.state.lock().unwrap();
            if guard.phase != SessionPhase::AwaitingGlobalJoin {
                return Err(Od11Error::Protocol(format!(
                    "global_joined in phase {:?}",
                    guard.phase
                )));
            }
            guard.snapshot.mac = mac;
            guard.snapshot.ssid = ssid;
            for entry in state {
                guard.snapshot.apply(entry);
            }
            guard.phase = SessionPhase::AwaitingGroupJoin;
        }
        self.send_raw(Command::group_join(&self.join))
    }

    fn on_group_joined(
        &self,
        sid: Option<SessionId>,
        sources: Vec<SourceEntry>,
        state: Vec<Update>,
    ) -> Result<()> {
        {
            let mut guard = self.state.lock().unwrap();
            if guard.phase != SessionPhase::AwaitingGroupJoin {
                return Err(Od11Error::Protocol(format!(
                    "group_joined in phase {:?}",
                    guard.phase
                )));
            }
            // Group commands require a sid; without one the session
            // cannot become ready
            let Some(sid) = sid else {
                return Err(Od11Error::Protocol("group_joined without sid".to_string()));
            };
            guard.snapshot.sid = Some(sid);
            guard.snapshot.sources = sources.into_iter().map(|s| (s.id, s.name)).collect();
            for entry in state {
                guard.snapshot.apply(entry);
            }
            guard.phase = SessionPhase::Ready;
            tracing::info!("Joined group, sid {}", sid);
        }
        self.dispatcher.notify(StateUpdate::Ready);
        Ok(())
    }

    fn on_pong(&self, value: Option<i64>) {
        let rtt_ms = {
            let state = self.state.lock().unwrap();
            match (value, state.last_ping_sent) {
                (Some(echo), Some(sent)) if echo == sent => Some(now_ms() - sent),
                _ => None,
            }
        };
        if let Some(rtt) = rtt_ms {
            tracing::debug!("speaker_pong matched, rtt {} ms", rtt);
        }
        self.dispatcher.publish(StateUpdate::Pong { rtt_ms });
    }

    fn handle_update(&self, update: Update) -> Result<()> {
        let event = {
            let mut guard = self.state.lock().unwrap();
            if guard.phase != SessionPhase::Ready {
                return Err(Od11Error::Protocol(format!(
                    "update frame in phase {:?}",
                    guard.phase
                )));
            }
            let event = match &update {
                Update::GroupVolumeChanged { vol } => {
                    Some(StateUpdate::VolumeChanged((*vol).clamp(0, 100)))
                }
                Update::GroupInputSourceChanged { source } => {
                    Some(StateUpdate::InputSourceChanged(*source))
                }
                _ => None,
            };
            guard.snapshot.apply(update);
            event
        };
        if let Some(event) = event {
            self.dispatcher.notify(event);
        }
        Ok(())
    }
}
