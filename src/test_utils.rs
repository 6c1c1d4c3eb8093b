//! Shared test utilities for Osiris.
//!
//! Temp-dir backed stores and registries, an in-memory market database,
//! scripted AI backends, mock command handlers and a recording progress surface.

#![allow(clippy::unwrap_used)]

use crate::{
    config::{AiConfig, tiers::TierTable},
    core::{
        ai::{BackendError, BackendFactory, ChatBackend, ChatMessage, QueryPolicy},
        artifact::{ArtifactMetadata, ArtifactStore},
        authoring::Authoring,
        engine::{CancelFlag, Engine, EngineConfig, ProgressSnapshot, ProgressSurface, SurfaceError},
        execution::Executor,
        maintenance::{CutoverTarget, Maintenance},
        parser::Arguments,
        prompts::{Prompt, PromptLibrary},
        registry::{CommandHandler, CommandRegistry, HandlerError},
        tier::{Classification, Tier},
    },
    errors::Result,
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::{
    collections::VecDeque,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Routes tracing output through the test harness. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with the market tables.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates an artifact store in a fresh temp dir. Keep the dir alive for the
/// duration of the test.
pub fn setup_test_store() -> (TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    (dir, store)
}

/// Saves a file with placeholder name and description.
pub async fn save_test_artifact(
    store: &ArtifactStore,
    user_id: u64,
    content: &str,
    tier: Tier,
) -> Result<ArtifactMetadata> {
    store
        .create_saved(user_id, content, "Test file", "For tests", tier)
        .await
}

/// Execution context handed to mock handlers.
#[derive(Clone, Default)]
pub struct TestContext {
    invocations: Arc<Mutex<Vec<Arguments>>>,
    cancel: Option<CancelFlag>,
}

impl TestContext {
    /// Arguments of every recorded invocation, in order.
    pub fn invocations(&self) -> Vec<Arguments> {
        self.invocations.lock().unwrap().clone()
    }

    /// A copy whose `cancel` handler flips `flag`.
    #[must_use]
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }
}

/// Records its arguments and succeeds.
pub struct RecordingHandler;

#[async_trait]
impl CommandHandler<TestContext> for RecordingHandler {
    async fn execute(
        &self,
        ctx: &TestContext,
        args: &Arguments,
    ) -> std::result::Result<(), HandlerError> {
        ctx.invocations.lock().unwrap().push(args.clone());
        Ok(())
    }
}

/// Fails with the `reason` argument, or "boom".
pub struct FailingHandler;

#[async_trait]
impl CommandHandler<TestContext> for FailingHandler {
    async fn execute(
        &self,
        _ctx: &TestContext,
        args: &Arguments,
    ) -> std::result::Result<(), HandlerError> {
        Err(HandlerError::Failed(args.get("reason").unwrap_or("boom").to_string()))
    }
}

/// Panics.
pub struct PanickingHandler;

#[async_trait]
impl CommandHandler<TestContext> for PanickingHandler {
    #[allow(clippy::panic)]
    async fn execute(
        &self,
        _ctx: &TestContext,
        _args: &Arguments,
    ) -> std::result::Result<(), HandlerError> {
        panic!("handler exploded");
    }
}

/// Takes 600ms, then succeeds.
pub struct SlowHandler;

#[async_trait]
impl CommandHandler<TestContext> for SlowHandler {
    async fn execute(
        &self,
        _ctx: &TestContext,
        _args: &Arguments,
    ) -> std::result::Result<(), HandlerError> {
        tokio::time::sleep(Duration::from_millis(600)).await;
        Ok(())
    }
}

/// Requests cancellation of the current run, then succeeds.
pub struct CancelHandler;

#[async_trait]
impl CommandHandler<TestContext> for CancelHandler {
    async fn execute(
        &self,
        ctx: &TestContext,
        _args: &Arguments,
    ) -> std::result::Result<(), HandlerError> {
        if let Some(flag) = &ctx.cancel {
            flag.cancel();
        }
        Ok(())
    }
}

/// Registry with `ok`, `fail`, `panic`, `slow`, `cancel` (open) and
/// `restricted` (restricted), manifests seeded.
pub async fn setup_test_registry(root: &Path) -> CommandRegistry<TestContext> {
    let mut registry = CommandRegistry::new(root);
    registry.register("ok", Classification::Open, "Succeeds", Arc::new(RecordingHandler));
    registry.register("fail", Classification::Open, "Fails", Arc::new(FailingHandler));
    registry.register("panic", Classification::Open, "Panics", Arc::new(PanickingHandler));
    registry.register("slow", Classification::Open, "Sleeps", Arc::new(SlowHandler));
    registry.register("cancel", Classification::Open, "Cancels", Arc::new(CancelHandler));
    registry.register(
        "restricted",
        Classification::Restricted,
        "Needs an elevated tier",
        Arc::new(RecordingHandler),
    );
    registry.seed_manifests().await.unwrap();
    registry
}

fn test_engine_config() -> EngineConfig {
    EngineConfig {
        loading_lines: Arc::new(vec!["Working on it...".to_string()]),
        ..EngineConfig::default()
    }
}

/// Engine over [`setup_test_registry`], plus a fresh context.
pub async fn setup_test_engine() -> (TempDir, Engine<TestContext>, TestContext) {
    init_test_tracing();
    let (dir, _) = setup_test_store();
    let registry = setup_test_registry(&dir.path().join("commands")).await;
    let engine = Engine::new(Arc::new(registry), test_engine_config());
    (dir, engine, TestContext::default())
}

/// Executor with its store under `<tmp>/data` and a 900s maintenance grace.
pub async fn setup_test_executor() -> (TempDir, Executor<TestContext>, TestContext) {
    let (dir, engine, ctx) = setup_test_engine().await;
    let store = ArtifactStore::new(dir.path().join("data"));
    let executor = Executor::new(engine, store, Maintenance::new(Duration::from_secs(900)));
    (dir, executor, ctx)
}

/// One scripted backend response.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Successful reply text
    Text(String),
    /// Transport failure
    Fail,
    /// Never completes
    Hang,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Reply>,
    repeat: Option<String>,
    calls: Vec<Vec<ChatMessage>>,
}

/// Backend that plays back scripted replies. Clones share one script, so a
/// test can keep a handle while conversations own boxed copies.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    /// Plays `replies` in order, then fails.
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                replies: replies.into(),
                ..Script::default()
            })),
        }
    }

    /// Always replies with `text`.
    pub fn repeating(text: &str) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                repeat: Some(text.to_string()),
                ..Script::default()
            })),
        }
    }

    /// Message histories received, one entry per call.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.script.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> std::result::Result<String, BackendError> {
        let next = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(messages.to_vec());
            match &script.repeat {
                Some(text) => Some(Reply::Text(text.clone())),
                None => script.replies.pop_front(),
            }
        };
        match next {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Fail) | None => Err(BackendError::Transport("scripted failure".to_string())),
        }
    }
}

/// Hands out clones of one [`ScriptedBackend`].
pub struct ScriptedFactory {
    backend: ScriptedBackend,
}

impl ScriptedFactory {
    /// Factory over a new script.
    pub fn new(replies: Vec<Reply>) -> Self {
        Self::from(ScriptedBackend::new(replies))
    }
}

impl From<ScriptedBackend> for ScriptedFactory {
    fn from(backend: ScriptedBackend) -> Self {
        Self { backend }
    }
}

impl BackendFactory for ScriptedFactory {
    fn create(&self) -> Box<dyn ChatBackend> {
        Box::new(self.backend.clone())
    }
}

/// The production policy: 30s timeout, 2 retries, 2s doubling backoff.
pub fn test_policy() -> QueryPolicy {
    QueryPolicy::default()
}

/// Writes every prompt file into `dir`.
pub fn write_test_prompts(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    for prompt in [
        Prompt::Intro,
        Prompt::UserInstructions,
        Prompt::Authoring,
        Prompt::EphemeralRefine,
        Prompt::PermanentRefine,
        Prompt::PermanentFinalize,
        Prompt::Undo,
    ] {
        let text = format!("Instructions from {}", prompt.file_name());
        std::fs::write(dir.join(prompt.file_name()), text).unwrap();
    }
}

/// Authoring service with prompts in `<tmp>/prompts`, files in `<tmp>/data`,
/// and every conversation backed by one shared script.
pub async fn setup_test_authoring(replies: Vec<Reply>) -> (TempDir, Authoring, ScriptedBackend) {
    init_test_tracing();
    let (dir, _) = setup_test_store();
    let prompts_dir = dir.path().join("prompts");
    write_test_prompts(&prompts_dir);

    let backend = ScriptedBackend::new(replies);
    let authoring = Authoring::new(
        &AiConfig::default(),
        TierTable::default(),
        PromptLibrary::new(prompts_dir),
        Arc::new(ScriptedFactory::from(backend.clone())),
        ArtifactStore::new(dir.path().join("data")),
        Maintenance::new(Duration::from_secs(900)),
    );
    (dir, authoring, backend)
}

/// Cutover target that counts how often it was triggered.
#[derive(Default)]
pub struct CountingTarget {
    calls: AtomicUsize,
}

impl CountingTarget {
    /// Times `terminate_all` ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CutoverTarget for CountingTarget {
    async fn terminate_all(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst);
        0
    }
}

#[derive(Clone, Copy, Default)]
enum SurfaceMode {
    #[default]
    Healthy,
    GoneAfter(usize),
    Failing,
}

/// Progress surface that records every accepted snapshot.
#[derive(Default)]
pub struct RecordingSurface {
    snapshots: Mutex<Vec<ProgressSnapshot>>,
    attempts: AtomicUsize,
    mode: SurfaceMode,
}

impl RecordingSurface {
    /// Accepts `n` updates, then reports the target gone.
    pub fn gone_after(n: usize) -> Self {
        Self {
            mode: SurfaceMode::GoneAfter(n),
            ..Self::default()
        }
    }

    /// Rejects every update with a non-fatal error.
    pub fn failing() -> Self {
        Self {
            mode: SurfaceMode::Failing,
            ..Self::default()
        }
    }

    /// Snapshots accepted so far.
    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSurface for RecordingSurface {
    async fn update(&self, snapshot: &ProgressSnapshot) -> std::result::Result<(), SurfaceError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            SurfaceMode::GoneAfter(n) if attempt >= n => Err(SurfaceError::Gone),
            SurfaceMode::Failing => Err(SurfaceError::Other("rate limited".to_string())),
            _ => {
                self.snapshots.lock().unwrap().push(snapshot.clone());
                Ok(())
            }
        }
    }
}
