//! Committing command files for execution.
//!
//! [`Executor::commit`] is the single entry point: it checks maintenance,
//! claims the user's execution slot, reads the file, resolves the tier and
//! hands the statements to the [`Engine`]. A user holds at most one slot at a
//! time; the slot is released when the run ends, however it ends.

use crate::{
    core::{
        artifact::{ArtifactRef, ArtifactStore},
        engine::{CancelFlag, Engine, ExecutionReport, ExecutionSession, ProgressSurface},
        maintenance::{CutoverTarget, Maintenance, Module},
        preprocess::preprocess,
        tier::{Tier, resolve_tier},
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Users with a run in progress, each with the flag that cancels it.
#[derive(Clone, Default)]
pub struct ActiveExecutions {
    running: Arc<Mutex<HashMap<u64, CancelFlag>>>,
}

/// Holds a user's execution slot. Dropping it frees the slot.
pub struct ExecutionGuard {
    active: ActiveExecutions,
    user_id: u64,
    cancel: CancelFlag,
}

impl ExecutionGuard {
    /// Flag that cancels this run.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.active.running.lock() {
            if running
                .get(&self.user_id)
                .is_some_and(|flag| flag.same_as(&self.cancel))
            {
                running.remove(&self.user_id);
            }
        }
    }
}

impl ActiveExecutions {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the user's slot.
    ///
    /// # Errors
    /// Returns [`Error::ExecutionInProgress`] if the user already has a run.
    pub fn try_begin(&self, user_id: u64) -> Result<ExecutionGuard> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| Error::ExecutionInProgress { user_id })?;
        if running.contains_key(&user_id) {
            return Err(Error::ExecutionInProgress { user_id });
        }
        let cancel = CancelFlag::new();
        running.insert(user_id, cancel.clone());
        Ok(ExecutionGuard {
            active: self.clone(),
            user_id,
            cancel,
        })
    }

    /// Whether the user has a run in progress.
    #[must_use]
    pub fn is_active(&self, user_id: u64) -> bool {
        self.running
            .lock()
            .is_ok_and(|running| running.contains_key(&user_id))
    }

    /// Number of runs in progress.
    #[must_use]
    pub fn len(&self) -> usize {
        self.running.lock().map_or(0, |running| running.len())
    }

    /// Whether no run is in progress.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CutoverTarget for ActiveExecutions {
    async fn terminate_all(&self) -> usize {
        let Ok(running) = self.running.lock() else {
            return 0;
        };
        for flag in running.values() {
            flag.cancel();
        }
        running.len()
    }
}

/// A request to run one command file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    /// Committing user
    pub user_id: u64,
    /// File to run
    pub artifact: ArtifactRef,
}

/// Ties the artifact store, maintenance switches and engine together.
pub struct Executor<C> {
    engine: Engine<C>,
    store: ArtifactStore,
    active: ActiveExecutions,
    maintenance: Maintenance,
}

impl<C> Executor<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Creates an executor.
    pub fn new(engine: Engine<C>, store: ArtifactStore, maintenance: Maintenance) -> Self {
        Self {
            engine,
            store,
            active: ActiveExecutions::new(),
            maintenance,
        }
    }

    /// Runs registered for cutover.
    #[must_use]
    pub const fn active(&self) -> &ActiveExecutions {
        &self.active
    }

    /// Engine used for runs.
    #[must_use]
    pub const fn engine(&self) -> &Engine<C> {
        &self.engine
    }

    /// Artifact store files are read from.
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Runs a command file to completion and returns its report.
    ///
    /// # Errors
    /// Fails without running anything if the executor is under maintenance,
    /// the user already has a run, or the file cannot be read.
    pub async fn commit(
        &self,
        request: CommitRequest,
        ctx: &C,
        surface: &dyn ProgressSurface,
    ) -> Result<ExecutionReport> {
        self.start(request, None, ctx, surface).await
    }

    /// Overwrites the file with `replacement`, then runs it as an undo.
    ///
    /// Nothing is written unless the run can start. Only the committing user's
    /// own files can be replaced; market files never are.
    ///
    /// # Errors
    /// As for [`commit`](Self::commit), plus [`Error::ArtifactPermission`] for
    /// files the user does not own and write failures.
    pub async fn commit_replacement(
        &self,
        request: CommitRequest,
        replacement: &str,
        ctx: &C,
        surface: &dyn ProgressSurface,
    ) -> Result<ExecutionReport> {
        self.start(request, Some(replacement), ctx, surface).await
    }

    async fn start(
        &self,
        request: CommitRequest,
        replacement: Option<&str>,
        ctx: &C,
        surface: &dyn ProgressSurface,
    ) -> Result<ExecutionReport> {
        let CommitRequest { user_id, artifact } = request;
        self.maintenance.check(Module::Executor)?;
        if replacement.is_some() && !owns(&artifact, user_id) {
            tracing::warn!(
                user_id,
                file = %artifact.display_name(),
                "Refusing to overwrite a file the user does not own"
            );
            return Err(Error::ArtifactPermission {
                name: artifact.display_name(),
            });
        }
        let guard = self.active.try_begin(user_id)?;

        if let Some(content) = replacement {
            self.store.write(&artifact, content).await?;
            tracing::info!(user_id, file = %artifact.display_name(), "Overwrote file for undo");
        }

        let content = self.store.read(&artifact).await.inspect_err(|e| {
            tracing::warn!(user_id, file = %artifact.display_name(), "Cannot read file: {e}");
        })?;

        let tier = match &artifact {
            ArtifactRef::Saved { user_id, uid } => resolve_tier(&self.store, *user_id, Some(uid)).await,
            ArtifactRef::Ephemeral { .. } | ArtifactRef::Market { .. } => Tier::lowest(),
        };

        let statements = preprocess(&content);
        let session = ExecutionSession::new(
            user_id,
            artifact,
            tier,
            replacement.is_some(),
            guard.cancel_flag(),
        );
        let report = self
            .engine
            .run(session, &statements, content, ctx, surface)
            .await;
        drop(guard);
        Ok(report)
    }
}

fn owns(artifact: &ArtifactRef, user_id: u64) -> bool {
    match artifact {
        ArtifactRef::Ephemeral { user_id: owner } | ArtifactRef::Saved { user_id: owner, .. } => {
            *owner == user_id
        }
        ArtifactRef::Market { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{core::engine::RunState, test_utils::*};
    use std::time::Duration;

    #[test]
    fn test_one_slot_per_user() {
        let active = ActiveExecutions::new();
        let guard = active.try_begin(1).unwrap();
        assert!(matches!(
            active.try_begin(1),
            Err(Error::ExecutionInProgress { user_id: 1 })
        ));
        let other = active.try_begin(2).unwrap();
        assert_eq!(active.len(), 2);

        drop(guard);
        assert!(!active.is_active(1));
        assert!(active.try_begin(1).is_ok());
        drop(other);
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_terminate_all_sets_flags() {
        let active = ActiveExecutions::new();
        let a = active.try_begin(1).unwrap();
        let b = active.try_begin(2).unwrap();
        assert_eq!(active.terminate_all().await, 2);
        assert!(a.cancel_flag().is_cancelled());
        assert!(b.cancel_flag().is_cancelled());
    }

    #[tokio::test]
    async fn test_commit_ephemeral_runs_at_lowest_tier() -> Result<()> {
        let (_dir, executor, ctx) = setup_test_executor().await;
        executor.store().write_ephemeral(1, "ok\nrestricted").await?;

        let report = executor
            .commit(
                CommitRequest {
                    user_id: 1,
                    artifact: ArtifactRef::Ephemeral { user_id: 1 },
                },
                &ctx,
                &RecordingSurface::default(),
            )
            .await?;
        assert_eq!(report.tier, Tier::Drifter);
        assert_eq!(report.counts.succeeded, 1);
        assert_eq!(report.counts.skipped, 1);
        assert!(!executor.active().is_active(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_saved_uses_recorded_tier() -> Result<()> {
        let (_dir, executor, ctx) = setup_test_executor().await;
        let meta = save_test_artifact(executor.store(), 1, "restricted", Tier::Seeker).await?;

        let report = executor
            .commit(
                CommitRequest {
                    user_id: 1,
                    artifact: ArtifactRef::Saved {
                        user_id: 1,
                        uid: meta.uid,
                    },
                },
                &ctx,
                &RecordingSurface::default(),
            )
            .await?;
        assert_eq!(report.tier, Tier::Seeker);
        assert_eq!(report.counts.succeeded, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_market_file_runs_at_lowest_tier() -> Result<()> {
        let (_dir, executor, ctx) = setup_test_executor().await;
        let meta = save_test_artifact(executor.store(), 9, "restricted", Tier::Abysswalker).await?;

        let report = executor
            .commit(
                CommitRequest {
                    user_id: 1,
                    artifact: ArtifactRef::Market {
                        owner_id: 9,
                        uid: meta.uid,
                    },
                },
                &ctx,
                &RecordingSurface::default(),
            )
            .await?;
        assert_eq!(report.counts.skipped, 1);
        assert!(report.undo.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_replacement_never_touches_market_file() -> Result<()> {
        let (_dir, executor, ctx) = setup_test_executor().await;
        let meta = save_test_artifact(executor.store(), 9, "ok", Tier::Seeker).await?;
        let market = ArtifactRef::Market {
            owner_id: 9,
            uid: meta.uid.clone(),
        };

        let err = executor
            .commit_replacement(
                CommitRequest {
                    user_id: 1,
                    artifact: market,
                },
                "fail",
                &ctx,
                &RecordingSurface::default(),
            )
            .await
            .err();
        assert!(matches!(err, Some(Error::ArtifactPermission { .. })));

        let owned = ArtifactRef::Saved {
            user_id: 9,
            uid: meta.uid,
        };
        let err = executor
            .commit_replacement(
                CommitRequest {
                    user_id: 1,
                    artifact: owned.clone(),
                },
                "fail",
                &ctx,
                &RecordingSurface::default(),
            )
            .await
            .err();
        assert!(matches!(err, Some(Error::ArtifactPermission { .. })));
        assert_eq!(executor.store().read(&owned).await?, "ok");
        assert!(!executor.active().is_active(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal_and_frees_slot() {
        let (_dir, executor, ctx) = setup_test_executor().await;
        let request = CommitRequest {
            user_id: 1,
            artifact: ArtifactRef::Ephemeral { user_id: 1 },
        };
        let err = executor
            .commit(request, &ctx, &RecordingSurface::default())
            .await
            .err();
        assert!(matches!(err, Some(Error::ArtifactNotFound { .. })));
        assert!(!executor.active().is_active(1));
    }

    #[tokio::test]
    async fn test_maintenance_rejects_before_reading() {
        let (_dir, executor, ctx) = setup_test_executor().await;
        executor
            .maintenance
            .toggle(Module::Executor, Arc::new(CountingTarget::default()));
        let request = CommitRequest {
            user_id: 1,
            artifact: ArtifactRef::Ephemeral { user_id: 1 },
        };
        let err = executor
            .commit(request, &ctx, &RecordingSurface::default())
            .await
            .err();
        assert!(matches!(err, Some(Error::Maintenance { .. })));
    }

    #[tokio::test]
    async fn test_second_commit_rejected_while_running() -> Result<()> {
        let (_dir, executor, ctx) = setup_test_executor().await;
        let executor = Arc::new(executor);
        executor.store().write_ephemeral(1, "slow\nslow").await?;

        let running = {
            let executor = Arc::clone(&executor);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let request = CommitRequest {
                    user_id: 1,
                    artifact: ArtifactRef::Ephemeral { user_id: 1 },
                };
                executor
                    .commit(request, &ctx, &RecordingSurface::default())
                    .await
            })
        };
        while !executor.active().is_active(1) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = executor
            .commit(
                CommitRequest {
                    user_id: 1,
                    artifact: ArtifactRef::Ephemeral { user_id: 1 },
                },
                &ctx,
                &RecordingSurface::default(),
            )
            .await;
        assert!(matches!(second, Err(Error::ExecutionInProgress { .. })));

        let first = running.await.unwrap()?;
        assert_eq!(first.state, RunState::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_replacement_overwrites_and_flags_undo() -> Result<()> {
        let (_dir, executor, ctx) = setup_test_executor().await;
        executor.store().write_ephemeral(1, "fail").await?;
        let artifact = ArtifactRef::Ephemeral { user_id: 1 };

        let report = executor
            .commit_replacement(
                CommitRequest {
                    user_id: 1,
                    artifact: artifact.clone(),
                },
                "ok",
                &ctx,
                &RecordingSurface::default(),
            )
            .await?;
        assert!(report.is_undo);
        assert!(report.undo.is_none());
        assert_eq!(report.counts.succeeded, 1);
        assert_eq!(executor.store().read(&artifact).await?, "ok");
        Ok(())
    }
}
