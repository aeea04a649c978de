use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::keys::Key;

/// Opaque info payload carried alongside an observation.
pub type Info = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One step of agent input: the set of keys held down plus a mouse delta.
///
/// Keys absent from `pressed` are released for this step.
///
/// # Example
///
/// ```
/// use minebridge_core::keys::Key;
/// use minebridge_core::types::Action;
///
/// let action = Action::noop().press(Key::Forward).with_mouse(5, -3);
/// assert!(action.is_pressed(Key::Forward));
/// assert_eq!(action.mouse(), [5, -3]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pressed: BTreeSet<Key>,
    mouse: [i32; 2],
}

impl Action {
    /// No keys pressed, no mouse movement.
    #[must_use]
    pub fn noop() -> Self {
        Self::default()
    }

    /// Build an action from pressed keys and a mouse delta.
    #[must_use]
    pub fn new(pressed: impl IntoIterator<Item = Key>, mouse: [i32; 2]) -> Self {
        Self {
            pressed: pressed.into_iter().collect(),
            mouse,
        }
    }

    /// Press `key` (builder style).
    #[must_use]
    pub fn press(mut self, key: Key) -> Self {
        self.pressed.insert(key);
        self
    }

    /// Set the mouse delta (builder style).
    #[must_use]
    pub const fn with_mouse(mut self, dx: i32, dy: i32) -> Self {
        self.mouse = [dx, dy];
        self
    }

    /// Set the state of one key.
    pub fn set(&mut self, key: Key, pressed: bool) {
        if pressed {
            self.pressed.insert(key);
        } else {
            self.pressed.remove(&key);
        }
    }

    #[must_use]
    pub fn is_pressed(&self, key: Key) -> bool {
        self.pressed.contains(&key)
    }

    /// Pressed keys in wire-id order.
    pub fn pressed(&self) -> impl Iterator<Item = Key> + '_ {
        self.pressed.iter().copied()
    }

    /// Mouse delta `[dx, dy]`.
    #[must_use]
    pub const fn mouse(&self) -> [i32; 2] {
        self.mouse
    }

    /// Uniformly random action: each key pressed with probability 1/2, mouse
    /// delta in `[-max_dx, max_dx] x [-max_dy, max_dy]`.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, max_dx: u32, max_dy: u32) -> Self {
        let pressed = Key::ALL.iter().copied().filter(|_| rng.r#gen::<bool>()).collect();
        let dx = i32::try_from(max_dx).unwrap_or(i32::MAX);
        let dy = i32::try_from(max_dy).unwrap_or(i32::MAX);
        Self {
            pressed,
            mouse: [rng.gen_range(-dx..=dx), rng.gen_range(-dy..=dy)],
        }
    }

    /// True when nothing is pressed and the mouse does not move.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.pressed.is_empty() && self.mouse == [0, 0]
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mouse=({}, {}) keys={{", self.mouse[0], self.mouse[1])?;
        for (i, key) in self.pressed.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}")?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// Row-major RGB image, `height x width x 3` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Image {
    /// Channels per pixel.
    pub const CHANNELS: u32 = 3;

    /// Wrap raw pixel bytes. Returns `None` if the length does not match.
    #[must_use]
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == Self::byte_len(width, height)).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Black image of the given size.
    #[must_use]
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; Self::byte_len(width, height)],
        }
    }

    /// Number of bytes an image of this size occupies.
    #[must_use]
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::CHANNELS as usize
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Array shape `(height, width, channels)`.
    #[must_use]
    pub const fn shape(&self) -> (u32, u32, u32) {
        (self.height, self.width, Self::CHANNELS)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// RGB value at (`row`, `col`), if in bounds.
    #[must_use]
    pub fn pixel(&self, row: u32, col: u32) -> Option<[u8; 3]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let i = (row as usize * self.width as usize + col as usize) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Everything the external client reports in one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub image: Image,
    pub reward: f32,
    pub terminal: bool,
    #[serde(default)]
    pub info: Info,
    /// Echo of the action the client applied last, if it reports one.
    #[serde(default)]
    pub last_action: Option<Action>,
}

impl Observation {
    /// Observation carrying only an image.
    #[must_use]
    pub fn from_image(image: Image) -> Self {
        Self {
            image,
            reward: 0.0,
            terminal: false,
            info: Info::new(),
            last_action: None,
        }
    }
}

// ---------------------------------------------------------------------------
// StepResult / ResetResult
// ---------------------------------------------------------------------------

/// Result of `env.step(action)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub image: Image,
    pub reward: f32,
    /// Episode ended: reported by the client, or a supervised process died.
    pub terminated: bool,
    /// Episode ended due to the step limit.
    pub truncated: bool,
    pub info: Info,
}

impl StepResult {
    /// Terminal transition with zero reward, used when the peer is gone.
    #[must_use]
    pub fn terminal(image: Image, info: Info) -> Self {
        Self {
            image,
            reward: 0.0,
            terminated: true,
            truncated: false,
            info,
        }
    }

    /// Whether the episode is over for either reason.
    #[must_use]
    pub const fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Result of `env.reset()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResult {
    pub image: Image,
    pub info: Info,
}

/// How `render` presents the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Hand the frame to an installed on-screen sink.
    Human,
    /// Return the frame to the caller.
    RgbArray,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
