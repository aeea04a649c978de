//! The environment bridge.
//!
//! [`BridgeEnv`] owns one provisioned instance, its supervised engine
//! processes and its transport, and exposes them through [`Environment`].
//!
//! ```text
//! Uninitialized --reset--> Ready --close--> Terminated
//!                          Ready --reset/step--> Ready
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use minebridge_core::config::{BridgeConfig, DisplayMode, InstanceConfig};
use minebridge_core::error::{BridgeError, ProtocolError, TransportError};
use minebridge_core::keys::KeyMap;
use minebridge_core::traits::{Environment, FrameSink};
use minebridge_core::types::{Action, Image, Info, Observation, RenderMode, ResetResult, StepResult};
use minebridge_process::{
    ClientLaunch, DisplayLaunch, ProcessHandle, ProcessKind, ProcessSupervisor, ServerLaunch,
    SupervisorConfig,
};
use minebridge_provision::{ConfigProvisioner, ModDirs};
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::transport::Transport;

/// How long a closed connection may precede the exit of the process that
/// closed it.
const EXIT_GRACE: Duration = Duration::from_secs(2);
const EXIT_POLL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// BridgeState
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`BridgeEnv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Constructed; no observation received yet.
    Uninitialized,
    /// An episode is running.
    Ready,
    /// Closed; every resource released.
    Terminated,
}

// ---------------------------------------------------------------------------
// BridgeEnv
// ---------------------------------------------------------------------------

/// Bridge between the control loop and one external engine instance.
pub struct BridgeEnv {
    config: BridgeConfig,
    instance: InstanceConfig,
    provisioner: ConfigProvisioner,
    supervisor: ProcessSupervisor,
    codec: Codec,
    transport: Transport,
    server: Option<ProcessHandle>,
    client: Option<ProcessHandle>,
    display: Option<ProcessHandle>,
    sink: Option<Box<dyn FrameSink>>,
    last_image: Image,
    state: BridgeState,
    steps: u32,
}

impl BridgeEnv {
    /// Construct with the standard key map.
    ///
    /// # Errors
    ///
    /// See [`with_key_map`](Self::with_key_map).
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::with_key_map(config, Arc::new(KeyMap::standard()))
    }

    /// Validate `config`, provision the instance and write its files.
    ///
    /// Nothing is launched or bound until [`reset`](Environment::reset).
    ///
    /// # Errors
    ///
    /// Configuration errors from validation, and provisioning errors while
    /// enabling mods or writing the engine config.
    pub fn with_key_map(config: BridgeConfig, keys: Arc<KeyMap>) -> Result<Self, BridgeError> {
        config.validate()?;
        let provisioner = ConfigProvisioner::new(
            ModDirs::from_config(&config),
            config.paths.root_dir.clone(),
        );
        let instance = provisioner.provision(&config);
        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            log_dir: config.paths.log_dir(),
            instance_id: instance.instance_id,
        });
        let [width, height] = config.display_size;

        provisioner.enable_client_mods(&instance)?;
        provisioner.enable_server_mods(&instance)?;
        provisioner.write_config(&instance)?;
        info!(
            instance = %instance.instance_id,
            env_port = instance.env_port,
            server_port = instance.server_port,
            "bridge created"
        );

        Ok(Self {
            config,
            instance,
            provisioner,
            supervisor,
            codec: Codec::new(keys),
            transport: Transport::new(),
            server: None,
            client: None,
            display: None,
            sink: None,
            last_image: Image::zeros(width, height),
            state: BridgeState::Uninitialized,
            steps: 0,
        })
    }

    /// Re-seed the instance.
    ///
    /// Owned world and config files at the old paths are removed, the new
    /// identity is derived from `seed`, and the config and server mods are
    /// provisioned at the new paths. Takes effect for processes on the next
    /// reset.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Closed`] after close; provisioning errors otherwise.
    pub fn seed(&mut self, seed: u64) -> Result<(), BridgeError> {
        if self.state == BridgeState::Terminated {
            return Err(BridgeError::Closed);
        }
        self.delete_owned_files()?;
        self.provisioner.seed(&mut self.instance, seed);
        self.supervisor.set_instance_id(self.instance.instance_id);
        self.provisioner.enable_server_mods(&self.instance)?;
        self.provisioner.write_config(&self.instance)?;
        Ok(())
    }

    /// Install the on-screen sink used by [`RenderMode::Human`].
    pub fn set_frame_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    #[must_use]
    pub const fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> BridgeState {
        self.state
    }

    /// Address the transport is bound to, once reset has bound it.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    /// Steps taken in the current episode.
    #[must_use]
    pub const fn episode_steps(&self) -> u32 {
        self.steps
    }

    /// True unless a supervised server or client has exited.
    pub fn processes_alive(&mut self) -> bool {
        self.dead_process().is_none()
    }

    fn dead_process(&mut self) -> Option<ProcessKind> {
        for handle in [self.server.as_mut(), self.client.as_mut()]
            .into_iter()
            .flatten()
        {
            if !handle.is_alive() {
                return Some(handle.kind());
            }
        }
        None
    }

    /// Poll for an exited server or client for up to [`EXIT_GRACE`].
    fn await_dead_process(&mut self) -> Option<ProcessKind> {
        if self.server.is_none() && self.client.is_none() {
            return None;
        }
        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            if let Some(kind) = self.dead_process() {
                return Some(kind);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(EXIT_POLL);
        }
    }

    fn stop_processes(&mut self) {
        for handle in [self.client.as_mut(), self.server.as_mut(), self.display.as_mut()]
            .into_iter()
            .flatten()
        {
            ProcessSupervisor::stop(handle);
        }
        self.client = None;
        self.server = None;
        self.display = None;
        if let DisplayMode::Virtual { index, .. } = self.instance.display {
            ProcessSupervisor::sweep_display(index);
        }
    }

    fn start_processes(&mut self) -> Result<(), BridgeError> {
        let instance = &self.instance;
        let paths = &self.config.paths;
        let world_dir = instance.require_world_dir()?;
        let config_path = instance.require_config_path()?;

        if let DisplayMode::Virtual {
            index,
            start: true,
            depth,
        } = instance.display
        {
            let [width, height] = instance.display_size;
            self.display = Some(self.supervisor.start_display(&DisplayLaunch {
                index,
                width,
                height,
                depth,
            })?);
        }

        self.server = Some(self.supervisor.start_server(&ServerLaunch {
            executable: &paths.executable,
            world_dir,
            game_id: &self.config.game_id,
            config_path,
            port: instance.server_port,
            sync: instance.sync,
        })?);

        let cursor = paths.cursor_image();
        let cache = paths.media_cache_dir();
        self.client = Some(self.supervisor.start_client(&ClientLaunch {
            executable: &paths.executable,
            config_path,
            client_name: &self.config.client_name,
            server_port: instance.server_port,
            env_port: instance.env_port,
            cursor_image: Some(&cursor),
            media_cache_dir: &cache,
            sync: instance.sync,
            headless: instance.headless(),
            display: instance.display_index(),
            gpu_env: self.config.gpu_env,
            disable_vsync: self.config.disable_vsync,
        })?);
        Ok(())
    }

    fn receive(&mut self) -> Result<Observation, BridgeError> {
        let bytes = self.transport.recv()?;
        let obs = self.codec.decode_observation(&bytes)?;
        let expected = self.image_shape();
        let got = obs.image.shape();
        if got != expected {
            return Err(ProtocolError::ShapeMismatch { expected, got }.into());
        }
        Ok(obs)
    }

    fn dead_process_step(&self, kind: ProcessKind) -> StepResult {
        warn!(instance = %self.instance.instance_id, %kind, "supervised process exited, ending episode");
        let mut info = Info::new();
        info.insert("dead_process".into(), kind.name().into());
        StepResult::terminal(self.last_image.clone(), info)
    }

    fn delete_owned_files(&self) -> Result<(), BridgeError> {
        if self.instance.owns_world {
            self.provisioner.delete_world(&self.instance)?;
        }
        if self.instance.owns_config {
            self.provisioner.delete_config(&self.instance)?;
        }
        Ok(())
    }
}

impl Environment for BridgeEnv {
    fn reset(&mut self) -> Result<ResetResult, BridgeError> {
        if self.state == BridgeState::Terminated {
            return Err(BridgeError::Closed);
        }
        self.state = BridgeState::Uninitialized;
        self.steps = 0;

        if self.config.start_processes {
            self.stop_processes();
            if self.instance.owns_world {
                self.provisioner.delete_world(&self.instance)?;
            }
            self.provisioner.enable_server_mods(&self.instance)?;
        }
        self.transport.bind_port(self.instance.env_port)?;
        if self.config.start_processes {
            self.supervisor.begin_reset();
            self.start_processes()?;
        }

        debug!(instance = %self.instance.instance_id, "waiting for first observation");
        let obs = self.receive()?;
        debug!(shape = ?obs.image.shape(), "received first observation");
        self.last_image = obs.image.clone();
        self.state = BridgeState::Ready;
        Ok(ResetResult {
            image: obs.image,
            info: obs.info,
        })
    }

    fn step(&mut self, action: &Action) -> Result<StepResult, BridgeError> {
        match self.state {
            BridgeState::Uninitialized => return Err(BridgeError::NotReady),
            BridgeState::Terminated => return Err(BridgeError::Closed),
            BridgeState::Ready => {}
        }
        if let Some(kind) = self.dead_process() {
            return Ok(self.dead_process_step(kind));
        }

        debug!(%action, "sending action");
        let bytes = self.codec.encode_action(action)?;
        self.transport.send(&bytes)?;
        let obs = match self.receive() {
            Ok(obs) => obs,
            Err(BridgeError::Transport(TransportError::PeerClosed)) => {
                if let Some(kind) = self.await_dead_process() {
                    return Ok(self.dead_process_step(kind));
                }
                return Err(TransportError::PeerClosed.into());
            }
            Err(e) => return Err(e),
        };

        if let Some(echo) = &obs.last_action {
            let sent = self.codec.normalize(action);
            if *echo != sent {
                return Err(ProtocolError::EchoMismatch {
                    sent: sent.to_string(),
                    echoed: echo.to_string(),
                }
                .into());
            }
        }

        self.steps += 1;
        let truncated = !obs.terminal
            && self
                .config
                .max_episode_steps
                .is_some_and(|max| self.steps >= max);
        debug!(reward = obs.reward, terminal = obs.terminal, truncated, "received observation");
        self.last_image = obs.image.clone();
        Ok(StepResult {
            image: obs.image,
            reward: obs.reward,
            terminated: obs.terminal,
            truncated,
            info: obs.info,
        })
    }

    fn render(&mut self, mode: RenderMode) -> Result<Option<Image>, BridgeError> {
        match self.state {
            BridgeState::Uninitialized => return Err(BridgeError::NotReady),
            BridgeState::Terminated => return Err(BridgeError::Closed),
            BridgeState::Ready => {}
        }
        match mode {
            RenderMode::RgbArray => Ok(Some(self.last_image.clone())),
            RenderMode::Human => {
                let sink = self
                    .sink
                    .as_mut()
                    .ok_or_else(|| BridgeError::RenderUnavailable("no frame sink installed".into()))?;
                sink.show(&self.last_image);
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<(), BridgeError> {
        if self.state == BridgeState::Terminated {
            return Ok(());
        }
        self.state = BridgeState::Terminated;

        if let Some(mut sink) = self.sink.take() {
            sink.release();
        }
        self.transport.close();
        self.stop_processes();
        if self.config.start_processes {
            if let Some(path) = self.instance.config_path.as_deref() {
                ProcessSupervisor::sweep_engine(path);
            }
        }
        let result = self.delete_owned_files();
        info!(instance = %self.instance.instance_id, "bridge closed");
        result
    }

    fn image_shape(&self) -> (u32, u32, u32) {
        self.config.image_shape()
    }
}

impl Drop for BridgeEnv {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close bridge cleanly");
        }
    }
}

impl std::fmt::Debug for BridgeEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeEnv")
            .field("instance", &self.instance.instance_id)
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("server", &self.server)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use minebridge_core::error::{ConfigError, ProvisionError};
    use minebridge_test_utils::engine::EngineFixture;

    use super::*;

    fn attach_config(fixture: &EngineFixture) -> BridgeConfig {
        BridgeConfig {
            start_processes: false,
            ..fixture.config(minebridge_test_utils::net::free_port(), 30000)
        }
    }

    #[test]
    fn step_before_reset_is_not_ready() {
        let fixture = EngineFixture::sleeping();
        let mut env = BridgeEnv::new(attach_config(&fixture)).unwrap();
        assert!(matches!(env.step(&Action::noop()), Err(BridgeError::NotReady)));
        assert!(matches!(env.render(RenderMode::RgbArray), Err(BridgeError::NotReady)));
    }

    #[test]
    fn calls_after_close_are_rejected() {
        let fixture = EngineFixture::sleeping();
        let mut env = BridgeEnv::new(attach_config(&fixture)).unwrap();
        env.close().unwrap();
        env.close().unwrap();
        assert_eq!(env.state(), BridgeState::Terminated);
        assert!(matches!(env.reset(), Err(BridgeError::Closed)));
        assert!(matches!(env.step(&Action::noop()), Err(BridgeError::Closed)));
        assert!(matches!(env.seed(1), Err(BridgeError::Closed)));
    }

    #[test]
    fn construction_writes_config_and_close_removes_it() {
        let fixture = EngineFixture::sleeping();
        let mut config = attach_config(&fixture);
        config.seed = Some(11);
        let mut env = BridgeEnv::new(config).unwrap();
        let conf = env.instance().config_path.clone().unwrap();
        let world = env.instance().world_dir.clone().unwrap();
        assert!(conf.exists());
        assert!(world.join("worldmods").is_dir());

        env.close().unwrap();
        assert!(!conf.exists());
        assert!(!world.exists());
    }

    #[test]
    fn explicit_paths_survive_close() {
        let fixture = EngineFixture::sleeping();
        let mut config = attach_config(&fixture);
        let world = fixture.root().join("my_world");
        let conf = fixture.root().join("my.conf");
        config.paths.world_dir = Some(world.clone());
        config.paths.config_path = Some(conf.clone());
        let mut env = BridgeEnv::new(config).unwrap();
        env.close().unwrap();
        assert!(world.is_dir());
        assert!(conf.is_file());
    }

    #[test]
    fn reseed_moves_owned_files() {
        let fixture = EngineFixture::sleeping();
        let mut config = attach_config(&fixture);
        config.seed = Some(1);
        let mut env = BridgeEnv::new(config).unwrap();
        let old_conf = env.instance().config_path.clone().unwrap();

        env.seed(2).unwrap();
        let new_conf = env.instance().config_path.clone().unwrap();
        assert_ne!(old_conf, new_conf);
        assert!(!old_conf.exists());
        assert!(new_conf.exists());
        assert_eq!(env.instance().seed, Some(2));
    }

    #[test]
    fn invalid_config_is_rejected_before_provisioning() {
        let fixture = EngineFixture::sleeping();
        let mut config = attach_config(&fixture);
        config.display_size = [0, 0];
        assert!(matches!(
            BridgeEnv::new(config),
            Err(BridgeError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn missing_mod_root_is_reported() {
        let fixture = EngineFixture::sleeping();
        let mut config = attach_config(&fixture);
        config.paths.client_mods_dir = Some(fixture.root().join("nowhere"));
        assert!(matches!(
            BridgeEnv::new(config),
            Err(BridgeError::Provision(ProvisionError::MissingModRoot { .. }))
        ));
    }
}
