//! The key enumeration and its wire mapping.
//!
//! [`Key`] names every input the external client understands. [`KeyMap`] is
//! an immutable bidirectional table between keys and the integer ids used on
//! the wire. It is built once and handed to each codec explicitly.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// A key or button the agent can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Key {
    Forward,
    Backward,
    Left,
    Right,
    Jump,
    /// Shift key in menus.
    Sneak,
    /// Left mouse button.
    Dig,
    /// Middle mouse button.
    Middle,
    /// Right mouse button.
    Place,
    Drop,
    /// Mouse wheel up.
    HotbarNext,
    /// Mouse wheel down.
    HotbarPrev,
    #[serde(rename = "SLOT_1")]
    Slot1,
    #[serde(rename = "SLOT_2")]
    Slot2,
    #[serde(rename = "SLOT_3")]
    Slot3,
    #[serde(rename = "SLOT_4")]
    Slot4,
    #[serde(rename = "SLOT_5")]
    Slot5,
    #[serde(rename = "SLOT_6")]
    Slot6,
    #[serde(rename = "SLOT_7")]
    Slot7,
    #[serde(rename = "SLOT_8")]
    Slot8,
    Inventory,
}

impl Key {
    /// Every key, in wire-id order.
    pub const ALL: [Self; 21] = [
        Self::Forward,
        Self::Backward,
        Self::Left,
        Self::Right,
        Self::Jump,
        Self::Sneak,
        Self::Dig,
        Self::Middle,
        Self::Place,
        Self::Drop,
        Self::HotbarNext,
        Self::HotbarPrev,
        Self::Slot1,
        Self::Slot2,
        Self::Slot3,
        Self::Slot4,
        Self::Slot5,
        Self::Slot6,
        Self::Slot7,
        Self::Slot8,
        Self::Inventory,
    ];

    /// Canonical upper-case name (e.g. `"HOTBAR_NEXT"`).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Forward => "FORWARD",
            Self::Backward => "BACKWARD",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Jump => "JUMP",
            Self::Sneak => "SNEAK",
            Self::Dig => "DIG",
            Self::Middle => "MIDDLE",
            Self::Place => "PLACE",
            Self::Drop => "DROP",
            Self::HotbarNext => "HOTBAR_NEXT",
            Self::HotbarPrev => "HOTBAR_PREV",
            Self::Slot1 => "SLOT_1",
            Self::Slot2 => "SLOT_2",
            Self::Slot3 => "SLOT_3",
            Self::Slot4 => "SLOT_4",
            Self::Slot5 => "SLOT_5",
            Self::Slot6 => "SLOT_6",
            Self::Slot7 => "SLOT_7",
            Self::Slot8 => "SLOT_8",
            Self::Inventory => "INVENTORY",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Key {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "key".into(),
                message: format!("unknown key {s:?}"),
            })
    }
}

// ---------------------------------------------------------------------------
// KeyMap
// ---------------------------------------------------------------------------

/// Immutable bidirectional mapping between [`Key`]s and wire ids.
///
/// # Example
///
/// ```
/// use minebridge_core::keys::{Key, KeyMap};
///
/// let map = KeyMap::standard();
/// let id = map.id(Key::Jump).unwrap();
/// assert_eq!(map.key(id), Some(Key::Jump));
/// assert_eq!(map.key(9999), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMap {
    to_id: HashMap<Key, u32>,
    to_key: HashMap<u32, Key>,
}

impl KeyMap {
    /// The standard mapping: ids follow [`Key::ALL`] order starting at zero.
    #[must_use]
    pub fn standard() -> Self {
        let pairs = Key::ALL.iter().zip(0u32..).map(|(k, id)| (*k, id));
        let to_id: HashMap<Key, u32> = pairs.clone().collect();
        let to_key = pairs.map(|(k, id)| (id, k)).collect();
        Self { to_id, to_key }
    }

    /// Build a custom mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Collision`] if a key or an id appears twice.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Key, u32)>) -> Result<Self, ConfigError> {
        let mut to_id = HashMap::new();
        let mut to_key = HashMap::new();
        for (key, id) in pairs {
            if to_key.insert(id, key).is_some() {
                return Err(ConfigError::Collision {
                    resource: "key id",
                    value: u64::from(id),
                });
            }
            if to_id.insert(key, id).is_some() {
                return Err(ConfigError::InvalidValue {
                    field: "key".into(),
                    message: format!("{key} mapped twice"),
                });
            }
        }
        Ok(Self { to_id, to_key })
    }

    /// Wire id for a key, if mapped.
    #[must_use]
    pub fn id(&self, key: Key) -> Option<u32> {
        self.to_id.get(&key).copied()
    }

    /// Key for a wire id. Unknown ids yield `None`.
    #[must_use]
    pub fn key(&self, id: u32) -> Option<Key> {
        self.to_key.get(&id).copied()
    }

    /// Number of mapped keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_id.is_empty()
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
