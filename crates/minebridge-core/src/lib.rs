// minebridge-core: Keys, types, traits, config and errors for the minebridge environment bridge.

pub mod conf;
pub mod config;
pub mod error;
pub mod keys;
pub mod seed;
pub mod traits;
pub mod types;

pub mod prelude {
    pub use crate::conf::{ConfMap, ConfValue};
    pub use crate::config::{BridgeConfig, DisplayMode, EnginePaths, InstanceConfig, SyncConfig};
    pub use crate::error::{
        BridgeError, CodecError, ConfigError, ProcessError, ProtocolError, ProvisionError,
        TransportError,
    };
    pub use crate::keys::{Key, KeyMap};
    pub use crate::traits::{Environment, FrameSink};
    pub use crate::types::{Action, Image, Info, Observation, RenderMode, ResetResult, StepResult};
}
