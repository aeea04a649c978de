//! `VecRunner`: drives N independent environments in parallel.
//!
//! Each environment is reset and stepped on a rayon pool owned by the runner,
//! with one worker per slot so blocking receives never queue behind each
//! other; results come back in slot order. A slot whose environment errors or panics is marked
//! crashed and reported as terminal for that slot only. Crashed slots stay
//! terminal on every step until they are reset successfully.

use std::panic::{AssertUnwindSafe, catch_unwind};

use minebridge_core::config::BridgeConfig;
use minebridge_core::error::BridgeError;
use minebridge_core::traits::Environment;
use minebridge_core::types::{Action, Image, Info, ResetResult, StepResult};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{error, info};

use crate::env::BridgeEnv;

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

struct Slot<E> {
    env: E,
    crashed: bool,
    last_image: Image,
}

impl<E: Environment> Slot<E> {
    fn new(env: E) -> Self {
        let (height, width, _) = env.image_shape();
        Self {
            env,
            crashed: false,
            last_image: Image::zeros(width, height),
        }
    }

    fn crash(&mut self, index: usize, message: String) -> Info {
        error!(slot = index, error = %message, "environment crashed");
        self.crashed = true;
        crash_info(&message)
    }

    fn reset(&mut self, index: usize) -> ResetResult {
        match guarded(|| self.env.reset()) {
            Ok(result) => {
                self.crashed = false;
                self.last_image = result.image.clone();
                result
            }
            Err(message) => {
                let info = self.crash(index, message);
                ResetResult {
                    image: self.last_image.clone(),
                    info,
                }
            }
        }
    }

    fn step(&mut self, index: usize, action: &Action) -> StepResult {
        if self.crashed {
            return StepResult::terminal(self.last_image.clone(), crash_info("crashed earlier"));
        }
        match guarded(|| self.env.step(action)) {
            Ok(result) => {
                self.last_image = result.image.clone();
                result
            }
            Err(message) => {
                let info = self.crash(index, message);
                StepResult::terminal(self.last_image.clone(), info)
            }
        }
    }
}

/// Run `f`, turning errors and panics into a message.
fn guarded<T>(f: impl FnOnce() -> Result<T, BridgeError>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "environment panicked".into())),
    }
}

fn crash_info(message: &str) -> Info {
    let mut info = Info::new();
    info.insert("crashed".into(), true.into());
    info.insert("error".into(), message.into());
    info
}

// ---------------------------------------------------------------------------
// VecRunner
// ---------------------------------------------------------------------------

/// Parallel runner over independent environments.
///
/// # Example
///
/// ```
/// use minebridge_core::error::BridgeError;
/// use minebridge_core::traits::Environment;
/// use minebridge_core::types::*;
/// use minebridge_gym::vec_env::VecRunner;
///
/// struct Flat;
/// impl Environment for Flat {
///     fn reset(&mut self) -> Result<ResetResult, BridgeError> {
///         Ok(ResetResult { image: Image::zeros(2, 2), info: Info::new() })
///     }
///     fn step(&mut self, _: &Action) -> Result<StepResult, BridgeError> {
///         Ok(StepResult {
///             image: Image::zeros(2, 2), reward: 1.0,
///             terminated: false, truncated: false, info: Info::new(),
///         })
///     }
///     fn render(&mut self, _: RenderMode) -> Result<Option<Image>, BridgeError> { Ok(None) }
///     fn close(&mut self) -> Result<(), BridgeError> { Ok(()) }
///     fn image_shape(&self) -> (u32, u32, u32) { (2, 2, 3) }
/// }
///
/// let mut runner = VecRunner::new(vec![Flat, Flat]).unwrap();
/// runner.reset_all();
/// let steps = runner.step_all(&[Action::noop(), Action::noop()]).unwrap();
/// assert_eq!(steps.len(), 2);
/// ```
pub struct VecRunner<E> {
    slots: Vec<Slot<E>>,
    pool: ThreadPool,
}

impl<E: Environment + Send> VecRunner<E> {
    /// Wrap `envs`, starting one worker thread per environment.
    ///
    /// # Errors
    ///
    /// [`BridgeError::WorkerPool`] if the worker threads cannot be spawned.
    pub fn new(envs: Vec<E>) -> Result<Self, BridgeError> {
        let slots: Vec<Slot<E>> = envs.into_iter().map(Slot::new).collect();
        let pool = ThreadPoolBuilder::new()
            .num_threads(slots.len().max(1))
            .thread_name(|i| format!("minebridge-slot-{i}"))
            .build()
            .map_err(|e| BridgeError::WorkerPool(e.to_string()))?;
        Ok(Self { slots, pool })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether slot `index` is currently crashed.
    #[must_use]
    pub fn is_crashed(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.crashed)
    }

    /// Environment in slot `index`.
    #[must_use]
    pub fn env(&self, index: usize) -> Option<&E> {
        self.slots.get(index).map(|s| &s.env)
    }

    pub fn env_mut(&mut self, index: usize) -> Option<&mut E> {
        self.slots.get_mut(index).map(|s| &mut s.env)
    }

    /// Reset every slot in parallel.
    ///
    /// A slot that fails to reset returns its last image with `crashed` and
    /// `error` entries in its info.
    pub fn reset_all(&mut self) -> Vec<ResetResult> {
        let slots = &mut self.slots;
        self.pool.install(|| {
            slots
                .par_iter_mut()
                .enumerate()
                .map(|(i, slot)| slot.reset(i))
                .collect()
        })
    }

    /// Step every slot with its action, in parallel.
    ///
    /// # Errors
    ///
    /// [`BridgeError::BatchSize`] if `actions.len()` differs from the number
    /// of slots. Per-slot failures never surface here.
    pub fn step_all(&mut self, actions: &[Action]) -> Result<Vec<StepResult>, BridgeError> {
        if actions.len() != self.slots.len() {
            return Err(BridgeError::BatchSize {
                expected: self.slots.len(),
                got: actions.len(),
            });
        }
        let slots = &mut self.slots;
        Ok(self.pool.install(|| {
            slots
                .par_iter_mut()
                .zip(actions.par_iter())
                .enumerate()
                .map(|(i, (slot, action))| slot.step(i, action))
                .collect()
        }))
    }

    /// Reset one slot, surfacing its error directly.
    ///
    /// # Errors
    ///
    /// [`BridgeError::SlotOutOfRange`] for a bad index; the environment's own
    /// reset error otherwise (the slot is then marked crashed).
    pub fn reset_slot(&mut self, index: usize) -> Result<ResetResult, BridgeError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(BridgeError::SlotOutOfRange { index, len })?;
        match slot.env.reset() {
            Ok(result) => {
                slot.crashed = false;
                slot.last_image = result.image.clone();
                Ok(result)
            }
            Err(e) => {
                slot.crashed = true;
                Err(e)
            }
        }
    }

    /// Close every environment. All are closed even if some fail; the first
    /// failure is returned.
    ///
    /// # Errors
    ///
    /// The first close error in slot order.
    pub fn close_all(&mut self) -> Result<(), BridgeError> {
        let slots = &mut self.slots;
        let results: Vec<Result<(), BridgeError>> = self
            .pool
            .install(|| slots.par_iter_mut().map(|slot| slot.env.close()).collect());
        results.into_iter().collect()
    }
}

impl VecRunner<BridgeEnv> {
    /// Build one bridge per configuration.
    ///
    /// # Errors
    ///
    /// The first bridge construction error; bridges built before it are
    /// closed on drop.
    pub fn from_configs(configs: Vec<BridgeConfig>) -> Result<Self, BridgeError> {
        let envs = configs
            .into_iter()
            .map(BridgeEnv::new)
            .collect::<Result<Vec<_>, _>>()?;
        info!(num_envs = envs.len(), "vectorized runner created");
        Self::new(envs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
