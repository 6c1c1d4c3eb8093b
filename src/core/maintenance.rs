//! Maintenance switches with a delayed cutover.
//!
//! Turning maintenance on for a module rejects new work immediately and
//! schedules a cutover after a grace window. At cutover, everything still
//! running in that module is terminated. Turning maintenance off before then
//! cancels the cutover.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};

/// Parts of the bot that can be put under maintenance independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    /// Command file execution
    Executor,
    /// AI authoring sessions
    Authoring,
    /// Market browsing and listing
    Market,
}

impl Module {
    /// Lower-case name used in messages and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Executor => "executor",
            Self::Authoring => "authoring",
            Self::Market => "market",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Something holding live sessions that a cutover can terminate.
#[async_trait]
pub trait CutoverTarget: Send + Sync {
    /// Terminates every live session and returns how many there were.
    async fn terminate_all(&self) -> usize;
}

struct ModuleState {
    enabled_at: Instant,
    cutover: Option<JoinHandle<()>>,
}

/// Current state of one module's switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceStatus {
    /// Accepting work
    Off,
    /// Rejecting new work; cutover at `cutover_at`
    On {
        /// When active sessions will be terminated
        cutover_at: Instant,
    },
}

/// Process-wide maintenance switches.
#[derive(Clone)]
pub struct Maintenance {
    states: Arc<Mutex<HashMap<Module, ModuleState>>>,
    grace: Duration,
}

impl Maintenance {
    /// Creates switches, all off, with the given grace window.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            grace,
        }
    }

    /// Grace window between enabling and cutover.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        self.grace
    }

    /// Whether `module` is under maintenance.
    #[must_use]
    pub fn is_active(&self, module: Module) -> bool {
        self.states
            .lock()
            .is_ok_and(|states| states.contains_key(&module))
    }

    /// Current status of `module`.
    #[must_use]
    pub fn status(&self, module: Module) -> MaintenanceStatus {
        let Ok(states) = self.states.lock() else {
            return MaintenanceStatus::Off;
        };
        states
            .get(&module)
            .map_or(MaintenanceStatus::Off, |state| MaintenanceStatus::On {
                cutover_at: state.enabled_at + self.grace,
            })
    }

    /// Fails with [`Error::Maintenance`] while `module` is under maintenance.
    pub fn check(&self, module: Module) -> Result<()> {
        if self.is_active(module) {
            return Err(Error::Maintenance {
                module: module.name().to_string(),
            });
        }
        Ok(())
    }

    /// Flips the switch for `module` and returns the new state.
    ///
    /// Enabling spawns the cutover task; must be called inside a Tokio runtime.
    pub fn toggle(&self, module: Module, target: Arc<dyn CutoverTarget>) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return false;
        };

        if let Some(state) = states.remove(&module) {
            if let Some(cutover) = state.cutover {
                cutover.abort();
            }
            tracing::info!(%module, "Maintenance disabled");
            return false;
        }

        let cutover = self.spawn_cutover(module, target);
        states.insert(
            module,
            ModuleState {
                enabled_at: Instant::now(),
                cutover: Some(cutover),
            },
        );
        tracing::info!(%module, grace_secs = self.grace.as_secs(), "Maintenance enabled");
        true
    }

    fn spawn_cutover(&self, module: Module, target: Arc<dyn CutoverTarget>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.grace).await;
            if !this.is_active(module) {
                return;
            }
            let terminated = target.terminate_all().await;
            tracing::warn!(%module, terminated, "Maintenance cutover terminated active sessions");
            if let Ok(mut states) = this.states.lock() {
                if let Some(state) = states.get_mut(&module) {
                    state.cutover = None;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::CountingTarget;

    #[tokio::test(start_paused = true)]
    async fn test_enable_rejects_immediately() {
        let maintenance = Maintenance::new(Duration::from_secs(900));
        let target = Arc::new(CountingTarget::default());

        assert!(maintenance.check(Module::Executor).is_ok());
        assert!(maintenance.toggle(Module::Executor, target.clone()));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(matches!(
            maintenance.check(Module::Executor),
            Err(Error::Maintenance { .. })
        ));
        // Other modules are unaffected.
        assert!(maintenance.check(Module::Market).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cutover_fires_after_grace_window() {
        let maintenance = Maintenance::new(Duration::from_secs(900));
        let target = Arc::new(CountingTarget::default());
        maintenance.toggle(Module::Authoring, target.clone());

        tokio::time::sleep(Duration::from_secs(899)).await;
        assert_eq!(target.calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(target.calls(), 1);
        assert!(maintenance.is_active(Module::Authoring));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_cancels_cutover() {
        let maintenance = Maintenance::new(Duration::from_secs(900));
        let target = Arc::new(CountingTarget::default());

        assert!(maintenance.toggle(Module::Executor, target.clone()));
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert!(!maintenance.toggle(Module::Executor, target.clone()));

        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(target.calls(), 0);
        assert_eq!(maintenance.status(Module::Executor), MaintenanceStatus::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_cutover_time() {
        let maintenance = Maintenance::new(Duration::from_secs(60));
        let start = Instant::now();
        maintenance.toggle(Module::Market, Arc::new(CountingTarget::default()));

        let MaintenanceStatus::On { cutover_at } = maintenance.status(Module::Market) else {
            panic!("expected maintenance on");
        };
        assert_eq!(cutover_at, start + Duration::from_secs(60));
    }
}
