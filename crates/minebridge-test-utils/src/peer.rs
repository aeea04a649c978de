//! Mock engine client speaking the bridge wire protocol.
//!
//! A [`MockPeer`] connects to the bridge's env port, sends a first
//! observation, then answers every action with a new observation. Pixel
//! values equal the step number (wrapping), so tests can tell frames apart.

use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use minebridge_core::keys::{Key, KeyMap};
use minebridge_core::types::{Action, Image, Info, Observation};
use minebridge_gym::codec::Codec;
use minebridge_gym::framing::{read_frame, write_frame};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_RETRY: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How the peer echoes the action it received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMode {
    /// Echo the decoded action back unchanged.
    Exact,
    /// Omit the echo.
    None,
    /// Echo an action that differs from the one received.
    Tampered,
}

/// Behaviour of a [`MockPeer`].
#[derive(Debug, Clone)]
pub struct MockPeerConfig {
    pub width: u32,
    pub height: u32,
    pub echo: EchoMode,
    /// Reward reported on every step.
    pub reward: f32,
    /// Report `terminal` from this step on.
    pub terminal_after: Option<u32>,
    /// Disconnect instead of answering this step.
    pub close_after: Option<u32>,
}

impl MockPeerConfig {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            echo: EchoMode::Exact,
            reward: 1.0,
            terminal_after: None,
            close_after: None,
        }
    }

    #[must_use]
    pub const fn with_echo(mut self, echo: EchoMode) -> Self {
        self.echo = echo;
        self
    }

    #[must_use]
    pub const fn with_terminal_after(mut self, step: u32) -> Self {
        self.terminal_after = Some(step);
        self
    }

    #[must_use]
    pub const fn with_close_after(mut self, step: u32) -> Self {
        self.close_after = Some(step);
        self
    }
}

/// What the peer saw during its session.
#[derive(Debug, Default)]
pub struct PeerLog {
    /// Actions received, in order.
    pub actions: Vec<Action>,
    /// Error that ended the session early, if any.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// MockPeer
// ---------------------------------------------------------------------------

/// Background thread playing the engine client for one connection.
pub struct MockPeer {
    handle: JoinHandle<PeerLog>,
}

impl MockPeer {
    /// Start a peer that connects to `127.0.0.1:port` once the bridge binds.
    #[must_use]
    pub fn spawn(port: u16, config: MockPeerConfig) -> Self {
        let handle = thread::spawn(move || {
            let mut log = PeerLog::default();
            if let Err(e) = run(port, &config, &mut log) {
                log.error = Some(e.to_string());
            }
            log
        });
        Self { handle }
    }

    /// Start a peer that waits for `previous` to finish before connecting.
    ///
    /// Used across bridge resets: the previous session ends when the bridge
    /// rebinds, and only then is the new listener reachable. Actions of both
    /// sessions accumulate in the returned log.
    #[must_use]
    pub fn spawn_after(previous: Self, port: u16, config: MockPeerConfig) -> Self {
        let handle = thread::spawn(move || {
            let mut log = previous.join();
            if let Err(e) = run(port, &config, &mut log) {
                log.error = Some(e.to_string());
            }
            log
        });
        Self { handle }
    }

    /// Wait for the session to end.
    ///
    /// # Panics
    ///
    /// Panics if the peer thread panicked.
    #[must_use]
    pub fn join(self) -> PeerLog {
        self.handle.join().expect("mock peer panicked")
    }
}

fn connect(port: u16) -> io::Result<TcpStream> {
    let deadline = Instant::now() + CONNECT_TIMEOUT;
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => return Ok(stream),
            Err(e) if Instant::now() >= deadline => return Err(e),
            Err(_) => thread::sleep(CONNECT_RETRY),
        }
    }
}

fn frame(config: &MockPeerConfig, step: u32) -> Image {
    let fill = u8::try_from(step % 256).unwrap_or_default();
    let len = Image::byte_len(config.width, config.height);
    Image::new(config.width, config.height, vec![fill; len])
        .unwrap_or_else(|| Image::zeros(config.width, config.height))
}

fn echo(mode: EchoMode, action: &Action) -> Option<Action> {
    match mode {
        EchoMode::Exact => Some(action.clone()),
        EchoMode::None => None,
        EchoMode::Tampered => {
            let mut tampered = action.clone();
            tampered.set(Key::Sneak, !action.is_pressed(Key::Sneak));
            Some(tampered)
        }
    }
}

fn run(port: u16, config: &MockPeerConfig, log: &mut PeerLog) -> Result<(), Box<dyn std::error::Error>> {
    let codec = Codec::new(Arc::new(KeyMap::standard()));
    let mut stream = connect(port)?;
    debug!(port, "mock peer connected");

    let first = Observation::from_image(frame(config, 0));
    write_frame(&mut stream, &codec.encode_observation(&first)?)?;

    let mut step = 0u32;
    // EOF or a reset connection both mean the bridge is done with us.
    while let Ok(Some(bytes)) = read_frame(&mut stream) {
        step += 1;
        let action = codec.decode_action(&bytes)?;
        if config.close_after == Some(step) {
            log.actions.push(action);
            debug!(step, "mock peer disconnecting");
            return Ok(());
        }

        let mut info = Info::new();
        info.insert("step".into(), step.into());
        let obs = Observation {
            image: frame(config, step),
            reward: config.reward,
            terminal: config.terminal_after.is_some_and(|t| step >= t),
            info,
            last_action: echo(config.echo, &action),
        };
        log.actions.push(action);
        write_frame(&mut stream, &codec.encode_observation(&obs)?)?;
    }
    Ok(())
}
