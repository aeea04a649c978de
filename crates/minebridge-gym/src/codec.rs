//! Binary encoding of actions and observations.
//!
//! An action is a CBOR map `{mouse_dx, mouse_dy, key_events}` where each key
//! event is `{key, event_type}` with `event_type` one of `PRESS`/`RELEASE`.
//! Only pressed keys are emitted.
//!
//! An observation carries raw pixels after a CBOR header:
//!
//! ```text
//! +------------------+---------------------+--------------------------+
//! | Header len (4 LE)| CBOR header         | RGB pixels (w * h * 3)   |
//! +------------------+---------------------+--------------------------+
//! ```
//!
//! The header holds `width`, `height`, `reward`, `terminal`, an optional
//! echoed `action`, and an `info` map of arbitrary values.

use std::collections::HashSet;
use std::sync::Arc;

use minebridge_core::error::CodecError;
use minebridge_core::keys::KeyMap;
use minebridge_core::types::{Action, Image, Info, Observation};
use serde::{Deserialize, Serialize};
use tracing::trace;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Press,
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: u32,
    pub event_type: EventType,
}

/// Action as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAction {
    pub mouse_dx: i32,
    pub mouse_dy: i32,
    #[serde(default)]
    pub key_events: Vec<KeyEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObservationHeader {
    width: u32,
    height: u32,
    reward: f32,
    terminal: bool,
    #[serde(default)]
    action: Option<WireAction>,
    #[serde(default)]
    info: Info,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Translates between [`Action`]/[`Observation`] and wire bytes.
///
/// Pure and cheap to clone; the key table is shared.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use minebridge_core::keys::{Key, KeyMap};
/// use minebridge_core::types::Action;
/// use minebridge_gym::codec::Codec;
///
/// let codec = Codec::new(Arc::new(KeyMap::standard()));
/// let action = Action::noop().press(Key::Forward).with_mouse(5, -3);
/// let bytes = codec.encode_action(&action).unwrap();
/// assert_eq!(codec.decode_action(&bytes).unwrap(), action);
/// ```
#[derive(Debug, Clone)]
pub struct Codec {
    keys: Arc<KeyMap>,
}

impl Codec {
    #[must_use]
    pub const fn new(keys: Arc<KeyMap>) -> Self {
        Self { keys }
    }

    #[must_use]
    pub fn key_map(&self) -> &KeyMap {
        &self.keys
    }

    /// Wire form of an action. Keys missing from the key map are dropped.
    #[must_use]
    pub fn to_wire(&self, action: &Action) -> WireAction {
        let [mouse_dx, mouse_dy] = action.mouse();
        let key_events = action
            .pressed()
            .filter_map(|key| {
                let id = self.keys.id(key);
                if id.is_none() {
                    trace!(%key, "key has no wire id, not sent");
                }
                id
            })
            .map(|key| KeyEvent {
                key,
                event_type: EventType::Press,
            })
            .collect();
        WireAction {
            mouse_dx,
            mouse_dy,
            key_events,
        }
    }

    /// Action from its wire form.
    ///
    /// Unknown key ids and release events are ignored.
    ///
    /// # Errors
    ///
    /// [`CodecError::DuplicateKey`] if a key id appears in more than one event.
    pub fn from_wire(&self, wire: &WireAction) -> Result<Action, CodecError> {
        let mut seen = HashSet::new();
        let mut action = Action::noop().with_mouse(wire.mouse_dx, wire.mouse_dy);
        for event in &wire.key_events {
            if !seen.insert(event.key) {
                return Err(CodecError::DuplicateKey(event.key));
            }
            match (self.keys.key(event.key), event.event_type) {
                (Some(key), EventType::Press) => action.set(key, true),
                (Some(_), EventType::Release) => {}
                (None, _) => trace!(id = event.key, "unknown key id dropped"),
            }
        }
        Ok(action)
    }

    /// What `action` looks like after one trip over the wire.
    #[must_use]
    pub fn normalize(&self, action: &Action) -> Action {
        let mut out = Action::noop().with_mouse(action.mouse()[0], action.mouse()[1]);
        for key in action.pressed().filter(|k| self.keys.id(*k).is_some()) {
            out.set(key, true);
        }
        out
    }

    /// Encode an action for the client.
    ///
    /// # Errors
    ///
    /// [`CodecError::Cbor`] if serialization fails.
    pub fn encode_action(&self, action: &Action) -> Result<Vec<u8>, CodecError> {
        Ok(serde_cbor::to_vec(&self.to_wire(action))?)
    }

    /// Decode an action (client side of the protocol).
    ///
    /// # Errors
    ///
    /// [`CodecError::Cbor`] on malformed input, or see [`from_wire`](Self::from_wire).
    pub fn decode_action(&self, bytes: &[u8]) -> Result<Action, CodecError> {
        let wire: WireAction = serde_cbor::from_slice(bytes)?;
        self.from_wire(&wire)
    }

    /// Encode an observation (client side of the protocol).
    ///
    /// # Errors
    ///
    /// [`CodecError::Cbor`] if the header cannot be serialized, or
    /// [`CodecError::Truncated`] if it is too large for its length prefix.
    pub fn encode_observation(&self, obs: &Observation) -> Result<Vec<u8>, CodecError> {
        let header = ObservationHeader {
            width: obs.image.width(),
            height: obs.image.height(),
            reward: obs.reward,
            terminal: obs.terminal,
            action: obs.last_action.as_ref().map(|a| self.to_wire(a)),
            info: obs.info.clone(),
        };
        let header_bytes = serde_cbor::to_vec(&header)?;
        let header_len = u32::try_from(header_bytes.len()).map_err(|_| CodecError::Truncated {
            needed: header_bytes.len(),
            got: u32::MAX as usize,
        })?;

        let pixels = obs.image.as_bytes();
        let mut out = Vec::with_capacity(4 + header_bytes.len() + pixels.len());
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(pixels);
        Ok(out)
    }

    /// Decode an observation received from the client.
    ///
    /// # Errors
    ///
    /// [`CodecError::Truncated`] if the buffer ends inside the header,
    /// [`CodecError::ImageSize`] if the pixel block does not match
    /// `width * height * 3`, [`CodecError::Cbor`] for a malformed header, and
    /// [`CodecError::DuplicateKey`] for a malformed echoed action.
    pub fn decode_observation(&self, bytes: &[u8]) -> Result<Observation, CodecError> {
        let Some(prefix) = bytes.first_chunk::<4>() else {
            return Err(CodecError::Truncated {
                needed: 4,
                got: bytes.len(),
            });
        };
        let header_len = u32::from_le_bytes(*prefix) as usize;
        let header_end = 4 + header_len;
        if bytes.len() < header_end {
            return Err(CodecError::Truncated {
                needed: header_end,
                got: bytes.len(),
            });
        }

        let header: ObservationHeader = serde_cbor::from_slice(&bytes[4..header_end])?;
        let pixels = &bytes[header_end..];
        let expected = Image::byte_len(header.width, header.height);
        if pixels.len() != expected {
            return Err(CodecError::ImageSize {
                width: header.width,
                height: header.height,
                expected,
                got: pixels.len(),
            });
        }
        let image = Image::new(header.width, header.height, pixels.to_vec()).ok_or(
            CodecError::ImageSize {
                width: header.width,
                height: header.height,
                expected,
                got: pixels.len(),
            },
        )?;
        let last_action = header
            .action
            .as_ref()
            .map(|wire| self.from_wire(wire))
            .transpose()?;

        Ok(Observation {
            image,
            reward: header.reward,
            terminal: header.terminal,
            info: header.info,
            last_action,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
