use serde::{Deserialize, Serialize};

use crate::types::{JoinOptions, SessionId, SourceId, Volume};

/// Outbound handshake and control messages, tagged by `action`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// First handshake phase: announce the protocol version
    GlobalJoin {
        protocol_major_version: i64,
        protocol_minor_version: i64,
    },

    /// Second handshake phase: join the speaker group
    GroupJoin {
        color_index: i64,
        name: String,
        realtime_data: bool,
        uid: String,
    },

    /// Switch the active input source
    GroupSetInputSource {
        source: SourceId,
        #[serde(skip_serializing_if = "Option::is_none")]
        sid: Option<SessionId>,
    },

    /// Change volume by a signed delta
    GroupChangeVolume {
        amount: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        sid: Option<SessionId>,
    },

    /// Application-level liveness probe; `value` is a ms epoch timestamp
    /// echoed back in the matching speaker_pong
    SpeakerPing { value: i64 },
}

impl Command {
    /// Build the global_join request from handshake options
    pub fn global_join(opts: &JoinOptions) -> Self {
        Command::GlobalJoin {
            protocol_major_version: opts.protocol_major,
            protocol_minor_version: opts.protocol_minor,
        }
    }

    /// Build the group_join request from handshake options
    pub fn group_join(opts: &JoinOptions) -> Self {
        Command::GroupJoin {
            color_index: opts.color_index,
            name: opts.name.clone(),
            realtime_data: opts.realtime_data,
            uid: opts.uid.clone(),
        }
    }

    /// True for commands that operate on the joined group and must carry
    /// the session identifier
    pub fn is_group_scoped(&self) -> bool {
        matches!(
            self,
            Command::GroupSetInputSource { .. } | Command::GroupChangeVolume { .. }
        )
    }

    /// Stamp the session identifier onto a group-scoped command, keeping
    /// any sid the caller already supplied
    pub fn stamp_sid(&mut self, session: SessionId) {
        match self {
            Command::GroupSetInputSource { sid, .. } | Command::GroupChangeVolume { sid, .. } => {
                if sid.is_none() {
                    *sid = Some(session);
                }
            }
            _ => {}
        }
    }
}

/// Any inbound frame: a reply carrying a `response` tag or an unsolicited
/// update carrying an `update` tag
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Reply(Reply),
    Update(Update),
}

/// Replies to requests this client sends
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum Reply {
    /// Global scope established; carries device identity
    GlobalJoined {
        #[serde(default)]
        mac: Option<String>,
        #[serde(default)]
        ssid: Option<String>,
        #[serde(default)]
        state: Vec<Update>,
    },

    /// Group scope established; carries the session snapshot
    GroupJoined {
        #[serde(default)]
        sid: Option<SessionId>,
        #[serde(default)]
        sources: Vec<SourceEntry>,
        #[serde(default)]
        state: Vec<Update>,
    },

    /// Echo of a speaker_ping
    SpeakerPong {
        #[serde(default)]
        value: Option<i64>,
    },

    /// Replies this client does not model
    #[serde(other)]
    Other,
}

/// Push notifications, sent standalone after the handshake or embedded in
/// the `state` list of a join reply
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "update", rename_all = "snake_case")]
pub enum Update {
    GroupVolumeChanged { vol: Volume },

    GroupInputSourceChanged { source: SourceId },

    SpeakerAdded { speaker: SpeakerInfo },

    /// Updates this client does not model
    #[serde(other)]
    Other,
}

/// Device details reported by a speaker_added update
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerInfo {
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub wifi_quality: Option<i64>,
}

/// One selectable input as reported in the group_joined snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub id: SourceId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn global_join_serializes_with_version_fields() {
        let cmd = Command::global_join(&JoinOptions::default());
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "global_join",
                "protocol_major_version": 0,
                "protocol_minor_version": 4,
            })
        );
    }

    #[test]
    fn group_join_carries_no_sid_field() {
        let cmd = Command::group_join(&JoinOptions::default());
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "group_join",
                "color_index": 0,
                "name": "guest",
                "realtime_data": true,
                "uid": "uid-od11-rs",
            })
        );
        assert!(!cmd.is_group_scoped());
    }

    #[test]
    fn sid_is_omitted_until_stamped() {
        let mut cmd = Command::GroupSetInputSource {
            source: 4,
            sid: None,
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert!(value.get("sid").is_none());

        cmd.stamp_sid(9);
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["sid"], 9);
        assert_eq!(value["source"], 4);
    }

    #[test]
    fn stamp_keeps_caller_supplied_sid() {
        let mut cmd = Command::GroupChangeVolume {
            amount: -5,
            sid: Some(3),
        };
        cmd.stamp_sid(9);
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["sid"], 3);
    }

    #[test]
    fn ping_is_not_group_scoped() {
        let mut cmd = Command::SpeakerPing { value: 1234 };
        assert!(!cmd.is_group_scoped());
        cmd.stamp_sid(9);
        let value = serde_json::to_value(&cmd).unwrap();
        assert!(value.get("sid").is_none());
    }

    #[test]
    fn outbound_commands_round_trip() {
        let commands = vec![
            Command::global_join(&JoinOptions::default()),
            Command::group_join(&JoinOptions::default()),
            Command::GroupSetInputSource {
                source: 5,
                sid: Some(7),
            },
            Command::GroupChangeVolume {
                amount: -12,
                sid: Some(7),
            },
            Command::SpeakerPing { value: 1700000000000 },
        ];
        for cmd in commands {
            let json = serde_json::to_string(&cmd).unwrap();
            let back: Command = serde_json::from_str(&json).unwrap();
            assert_eq!(back, cmd);
        }
    }

    #[test]
    fn group_joined_reply_decodes_snapshot() {
        let raw = json!({
            "response": "group_joined",
            "sid": 7,
            "sources": [
                {"id": 0, "name": "AirPlay"},
                {"id": 4, "name": "Optical"},
            ],
            "state": [
                {"update": "group_volume_changed", "vol": 30},
                {"update": "group_input_source_changed", "source": 4},
            ],
        })
        .to_string();

        let frame: Frame = serde_json::from_str(&raw).unwrap();
        let Frame::Reply(Reply::GroupJoined { sid, sources, state }) = frame else {
            panic!("expected a group_joined reply");
        };
        assert_eq!(sid, Some(7));
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].name, "Optical");
        assert!(matches!(state[0], Update::GroupVolumeChanged { vol: 30 }));
        assert!(matches!(
            state[1],
            Update::GroupInputSourceChanged { source: 4 }
        ));
    }

    #[test]
    fn standalone_update_decodes_as_update_frame() {
        let frame: Frame =
            serde_json::from_str(r#"{"update": "group_volume_changed", "vol": 55}"#).unwrap();
        assert!(matches!(
            frame,
            Frame::Update(Update::GroupVolumeChanged { vol: 55 })
        ));
    }

    #[test]
    fn unknown_tags_fall_back_to_other() {
        let frame: Frame =
            serde_json::from_str(r#"{"response": "group_left", "sid": 7}"#).unwrap();
        assert!(matches!(frame, Frame::Reply(Reply::Other)));

        let frame: Frame =
            serde_json::from_str(r#"{"update": "speaker_removed", "speaker": {}}"#).unwrap();
        assert!(matches!(frame, Frame::Update(Update::Other)));
    }

    #[test]
    fn untagged_frames_fail_to_decode() {
        assert!(serde_json::from_str::<Frame>(r#"{"foo": 1}"#).is_err());
    }
}
