//! Shared test fixtures and utilities for minebridge crates.
//!
//! Provides a fake engine executable, a mock client peer speaking the wire
//! protocol, free-port helpers and deterministic RNG setup.

pub mod engine;
pub mod net;
pub mod peer;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use engine::EngineFixture;
pub use net::{free_port, free_ports};
pub use peer::{EchoMode, MockPeer, MockPeerConfig, PeerLog};
pub use rng::{random_action, seeded_rng};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a `tracing` subscriber writing through the test harness, once
/// per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}
