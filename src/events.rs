//! Typed gateway events.
//!
//! Instead of matching on raw `(op, t, serde_json::Value)` tuples everywhere,
//! the gateway module deserialises payloads into this enum so the rest of the
//! bot can pattern-match on strongly-typed data.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::types::*;

/// A fully-parsed event coming off the Discord gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// We've successfully identified, the session is established.
    Ready(ReadyEvent),

    /// An interaction was created (slash command, button, select, modal submit).
    InteractionCreate(Interaction),

    /// Heartbeat ACK from the gateway (op 11).
    HeartbeatAck,

    /// The gateway is asking us to heartbeat immediately (op 1).
    HeartbeatRequest,

    /// Gateway told us to reconnect (op 7).
    Reconnect,

    /// Session has been invalidated (op 9). `true` if it can be resumed.
    InvalidSession(bool),

    /// A transport fault the session is recovering from. Informational only.
    Error(String),

    /// An event we received but don't have a typed variant for.
    Unknown {
        event_name: Option<String>,
        op: u8,
        data: Option<serde_json::Value>,
    },
}

impl GatewayEvent {
    /// Convert a raw [`GatewayPayload`] into a typed event.
    ///
    /// This never fails; unrecognised or malformed events become
    /// [`GatewayEvent::Unknown`].
    pub fn from_payload(payload: GatewayPayload) -> Self {
        match payload.op {
            0 => Self::parse_dispatch(payload.t, payload.d),
            1 => GatewayEvent::HeartbeatRequest,
            7 => GatewayEvent::Reconnect,
            9 => {
                let resumable = payload
                    .d
                    .as_ref()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                GatewayEvent::InvalidSession(resumable)
            }
            11 => GatewayEvent::HeartbeatAck,
            _ => GatewayEvent::Unknown {
                event_name: payload.t,
                op: payload.op,
                data: payload.d,
            },
        }
    }

    /// Parse an op-0 DISPATCH event by its `t` name.
    fn parse_dispatch(event_name: Option<String>, data: Option<serde_json::Value>) -> Self {
        let (Some(name), Some(d)) = (event_name.as_deref(), data.as_ref()) else {
            return GatewayEvent::Unknown {
                event_name,
                op: 0,
                data,
            };
        };

        let parsed = match name {
            "READY" => parse_as(name, d).map(GatewayEvent::Ready),
            "INTERACTION_CREATE" => parse_as(name, d).map(GatewayEvent::InteractionCreate),
            _ => None,
        };

        parsed.unwrap_or(GatewayEvent::Unknown {
            event_name,
            op: 0,
            data,
        })
    }
}

fn parse_as<T: DeserializeOwned>(name: &str, data: &serde_json::Value) -> Option<T> {
    match T::deserialize(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(event = name, error = %e, "failed to parse dispatch payload");
            None
        }
    }
}
