// minebridge-gym: Wire codec, transport, environment bridge and vectorized runner.

pub mod codec;
pub mod env;
pub mod framing;
pub mod state_machine;
pub mod transport;
pub mod vec_env;

pub use codec::Codec;
pub use env::{BridgeEnv, BridgeState};
pub use transport::Transport;
pub use vec_env::VecRunner;
