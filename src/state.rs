use std::collections::BTreeMap;

use crate::protocol::Update;
use crate::types::{SessionId, SourceId, Volume};

/// Connection phase of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No transport yet
    Disconnected,
    /// Transport dial in progress
    Connecting,
    /// global_join sent, waiting for global_joined
    AwaitingGlobalJoin,
    /// group_join sent, waiting for the group_joined snapshot
    AwaitingGroupJoin,
    /// Handshake complete; sid assigned and commands accepted
    Ready,
    /// Transport gone or close requested; terminal
    Closed,
}

/// Last-known device state, mirrored from push notifications.
///
/// Fields stay `None` until the speaker first reports them. Command
/// issuance never mutates the snapshot; new values arrive asynchronously
/// when the speaker echoes the change.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    /// Session identifier assigned on group join
    pub sid: Option<SessionId>,

    /// Volume in percent
    pub volume: Option<Volume>,

    /// Active source ID
    pub source_id: Option<SourceId>,

    /// Source ID to display name
    pub sources: BTreeMap<SourceId, String>,

    /// Device MAC address
    pub mac: Option<String>,

    /// Network the speaker is on
    pub ssid: Option<String>,

    /// Wifi signal quality
    pub wifi_quality: Option<i64>,

    /// Firmware revision
    pub revision: Option<String>,
}

impl DeviceSnapshot {
    /// Display name of the active source, when both it and the source map
    /// are known
    pub fn source_name(&self) -> Option<&str> {
        self.source_id
            .and_then(|id| self.sources.get(&id))
            .map(String::as_str)
    }

    /// Fold one tagged update into the snapshot.
    ///
    /// Volume reports are clamped to the protocol's 0-100 range.
    pub(crate) fn apply(&mut self, entry: Update) {
        match entry {
            Update::GroupVolumeChanged { vol } => self.volume = Some(vol.clamp(0, 100)),
            Update::GroupInputSourceChanged { source } => self.source_id = Some(source),
            Update::SpeakerAdded { speaker } => {
                self.revision = speaker.revision;
                self.wifi_quality = speaker.wifi_quality;
            }
            Update::Other => {}
        }
    }
}

/// Everything the frame handler mutates, behind one lock
#[derive(Debug)]
pub(crate) struct SessionState {
    pub phase: SessionPhase,
    pub snapshot: DeviceSnapshot,
    /// ms timestamp of the last keepalive ping, for pong matching
    pub last_ping_sent: Option<i64>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            snapshot: DeviceSnapshot::default(),
            last_ping_sent: None,
        }
    }
}
