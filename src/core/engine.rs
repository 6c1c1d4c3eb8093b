//! Execution engine.
//!
//! Runs preprocessed statements one at a time against the command registry.
//! Every statement ends up in exactly one bucket (succeeded, failed, skipped)
//! or is a notice; nothing a handler does can abort the rest of the run.
//!
//! The run stops early in two cases: the session's cancel flag is set
//! (maintenance cutover, checked between statements) or the progress surface
//! reports that its target is gone.

use crate::core::{
    artifact::ArtifactRef,
    parser::{ParsedLine, Statement, parse_line},
    preprocess::RawStatement,
    registry::{CommandRegistry, ResolveError},
    tier::{Classification, Tier, authorize},
};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::time::Instant;

/// Lifecycle of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Reading and preprocessing the file
    Preparing,
    /// Executing statements
    Running,
    /// Every statement was processed
    Completed,
    /// Stopped by a maintenance cutover
    Cancelled,
    /// Stopped because progress could no longer be reported
    Stalled,
}

/// What a notice is about. Drives the icon shown in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Text from a `NOTICE:` line
    Message,
    /// Informational note from the engine
    Info,
    /// A statement was skipped
    Skipped,
    /// A statement failed
    Failed,
}

/// One entry in the execution log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Source line, if the notice belongs to a statement
    pub line: Option<usize>,
    /// Category
    pub kind: NoticeKind,
    /// Message without the line prefix
    pub text: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.line) {
            (NoticeKind::Message, _) | (_, None) => f.write_str(&self.text),
            (_, Some(line)) => write!(f, "Line {line}: {}", self.text),
        }
    }
}

/// Statement outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Statements in the file
    pub total: usize,
    /// Handler returned cleanly
    pub succeeded: usize,
    /// Parse, resolution or handler failure
    pub failed: usize,
    /// Not authorized at the session's tier
    pub skipped: usize,
}

/// Shared flag used to ask a running execution to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether two flags are the same underlying flag.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Live state of one in-progress execution.
#[derive(Debug)]
pub struct ExecutionSession {
    /// User who committed the file
    pub user_id: u64,
    /// File being executed
    pub artifact: ArtifactRef,
    /// Tier the statements run under
    pub tier: Tier,
    /// Whether this run replays an undo
    pub is_undo: bool,
    /// When the session was created
    pub started_at: Instant,
    cancel: CancelFlag,
    state: RunState,
    counts: Counts,
    notices: Vec<Notice>,
}

impl ExecutionSession {
    /// Creates a session in the `Preparing` state.
    #[must_use]
    pub fn new(
        user_id: u64,
        artifact: ArtifactRef,
        tier: Tier,
        is_undo: bool,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            user_id,
            artifact,
            tier,
            is_undo,
            started_at: Instant::now(),
            cancel,
            state: RunState::Preparing,
            counts: Counts::default(),
            notices: Vec::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    fn note(&mut self, line: Option<usize>, kind: NoticeKind, text: String) {
        self.notices.push(Notice { line, kind, text });
    }
}

/// Lets a user reverse a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoTicket {
    /// File that was executed
    pub artifact: ArtifactRef,
    /// Its content before execution
    pub original_content: String,
}

/// Final outcome of an execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// User who committed the file
    pub user_id: u64,
    /// File that was executed
    pub artifact: ArtifactRef,
    /// Tier used
    pub tier: Tier,
    /// Terminal state
    pub state: RunState,
    /// Whether this run replayed an undo
    pub is_undo: bool,
    /// Wall time from session creation to the end of the run
    pub duration: Duration,
    /// Final counters
    pub counts: Counts,
    /// Statements never reached
    pub unprocessed: usize,
    /// Full log, in statement order
    pub notices: Vec<Notice>,
    /// Present only for completed, non-undo runs
    pub undo: Option<UndoTicket>,
}

/// State pushed to the progress surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// File being executed
    pub file_name: String,
    /// Counters so far
    pub counts: Counts,
    /// Statements processed so far
    pub processed: usize,
    /// Most recent notices, oldest first
    pub recent: Vec<Notice>,
    /// Flavour text
    pub loading_line: Option<String>,
}

/// Why a progress update failed.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// The report target no longer exists
    #[error("progress target no longer exists")]
    Gone,
    /// Any other failure; the run continues
    #[error("progress update failed: {0}")]
    Other(String),
}

/// An editable place where progress is shown.
#[async_trait]
pub trait ProgressSurface: Send + Sync {
    /// Replaces the displayed progress with `snapshot`.
    async fn update(&self, snapshot: &ProgressSnapshot) -> Result<(), SurfaceError>;
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum time between routine progress updates
    pub progress_interval: Duration,
    /// Notices kept in the rolling window
    pub notice_window: usize,
    /// Flavour lines picked at random for progress updates
    pub loading_lines: Arc<Vec<String>>,
    /// Longest handler diagnostic kept in the user-facing log
    pub max_diagnostic_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_secs(1),
            notice_window: 5,
            loading_lines: Arc::new(Vec::new()),
            max_diagnostic_len: 200,
        }
    }
}

/// Last line of an error message, cut to `max` characters.
fn diagnostic(message: &str, max: usize) -> String {
    let last = message
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or(message)
        .trim();
    if last.chars().count() <= max {
        return last.to_string();
    }
    let cut: String = last.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

fn required_tiers() -> String {
    Tier::ALL
        .into_iter()
        .filter(|t| authorize(Classification::Restricted, *t))
        .map(Tier::name)
        .collect::<Vec<_>>()
        .join("/")
}

/// Sequential statement executor.
pub struct Engine<C> {
    registry: Arc<CommandRegistry<C>>,
    config: EngineConfig,
}

impl<C> Engine<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Creates an engine over a registry.
    pub const fn new(registry: Arc<CommandRegistry<C>>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Command registry used for resolution.
    #[must_use]
    pub const fn registry(&self) -> &Arc<CommandRegistry<C>> {
        &self.registry
    }

    /// Runs `statements` to a terminal state and returns the report.
    ///
    /// `original_content` is carried into the undo ticket of a completed run.
    #[tracing::instrument(
        skip_all,
        fields(user_id = session.user_id, file = %session.artifact.display_name(), undo = session.is_undo)
    )]
    pub async fn run(
        &self,
        mut session: ExecutionSession,
        statements: &[RawStatement],
        original_content: String,
        ctx: &C,
        surface: &dyn ProgressSurface,
    ) -> ExecutionReport {
        let total = statements.len();
        session.counts.total = total;
        session.state = RunState::Running;
        tracing::info!(total, tier = %session.tier, "Execution started");

        let mut unprocessed = 0;
        let mut last_update = Instant::now();
        if self.publish(&session, 0, surface).await {
            for (index, raw) in statements.iter().enumerate() {
                if session.cancel.is_cancelled() {
                    unprocessed = total - index;
                    session.state = RunState::Cancelled;
                    session.note(
                        None,
                        NoticeKind::Info,
                        format!(
                            "Execution terminated for maintenance. {unprocessed} statement(s) not processed."
                        ),
                    );
                    tracing::warn!(unprocessed, "Execution cancelled by maintenance");
                    break;
                }

                let was_notice = self.step(&mut session, raw, ctx).await;
                let processed = index + 1;

                if was_notice || last_update.elapsed() >= self.config.progress_interval {
                    if !self.publish(&session, processed, surface).await {
                        unprocessed = total - processed;
                        session.state = RunState::Stalled;
                        break;
                    }
                    last_update = Instant::now();
                }
            }
        } else {
            unprocessed = total;
            session.state = RunState::Stalled;
        }

        if session.state == RunState::Running {
            session.state = RunState::Completed;
        }
        self.finish(session, unprocessed, original_content)
    }

    /// Pushes progress. Returns `false` if the run must stop as stalled.
    async fn publish(
        &self,
        session: &ExecutionSession,
        processed: usize,
        surface: &dyn ProgressSurface,
    ) -> bool {
        let snapshot = self.snapshot(session, processed);
        match surface.update(&snapshot).await {
            Ok(()) => true,
            Err(SurfaceError::Gone) => {
                tracing::warn!(
                    user_id = session.user_id,
                    "Stopping execution, progress target is gone"
                );
                false
            }
            Err(e) => {
                tracing::warn!("Skipping progress update: {e}");
                true
            }
        }
    }

    fn snapshot(&self, session: &ExecutionSession, processed: usize) -> ProgressSnapshot {
        let window = self.config.notice_window;
        let start = session.notices.len().saturating_sub(window);
        let loading_line = self
            .config
            .loading_lines
            .choose(&mut rand::thread_rng())
            .cloned();
        ProgressSnapshot {
            file_name: session.artifact.display_name(),
            counts: session.counts,
            processed,
            recent: session.notices[start..].to_vec(),
            loading_line,
        }
    }

    /// Processes one statement. Returns whether it was a `NOTICE`.
    async fn step(&self, session: &mut ExecutionSession, raw: &RawStatement, ctx: &C) -> bool {
        let line = raw.line;
        match parse_line(&raw.text) {
            ParsedLine::Skip => false,
            ParsedLine::Invalid(error) => {
                tracing::warn!(line, "Parse error: {error}");
                session.counts.failed += 1;
                session.note(
                    Some(line),
                    NoticeKind::Failed,
                    format!("Parse Error - {error}"),
                );
                false
            }
            ParsedLine::Notice(message) => {
                tracing::info!(line, "NOTICE: {message}");
                session.note(Some(line), NoticeKind::Message, message);
                true
            }
            ParsedLine::Command { name, args } => {
                let statement = Statement {
                    command_name: name,
                    arguments: args,
                    source_line_index: line,
                };
                self.invoke(session, statement, ctx).await;
                false
            }
        }
    }

    async fn invoke(&self, session: &mut ExecutionSession, statement: Statement, ctx: &C) {
        let Statement {
            command_name: name,
            arguments: args,
            source_line_index: line,
        } = statement;

        let resolved = match self.registry.resolve(&name).await {
            Ok(resolved) => resolved,
            Err(ResolveError::NotFound { .. }) => {
                tracing::warn!(line, "Command '{name}' not found");
                session.counts.failed += 1;
                session.note(
                    Some(line),
                    NoticeKind::Failed,
                    format!("Command '{name}' not found."),
                );
                return;
            }
            Err(e) => {
                tracing::error!(line, "Command '{name}' could not be loaded: {e:?}");
                session.counts.failed += 1;
                session.note(
                    Some(line),
                    NoticeKind::Failed,
                    format!("Execution error for '{name}' (Invalid command file)."),
                );
                return;
            }
        };

        if !authorize(resolved.classification, session.tier) {
            tracing::warn!(line, tier = %session.tier, "Skipping restricted command '{name}'");
            session.counts.skipped += 1;
            session.note(
                Some(line),
                NoticeKind::Skipped,
                format!(
                    "Skipped restricted command '{name}' (Requires {}).",
                    required_tiers()
                ),
            );
            return;
        }

        tracing::info!(line, "Executing command '{name}' with {} args", args.len());
        let handler = Arc::clone(&resolved.handler);
        let task_ctx = ctx.clone();
        // Spawned so a panicking handler surfaces as a join error.
        let outcome = tokio::spawn(async move { handler.execute(&task_ctx, &args).await }).await;

        let failure = match outcome {
            Ok(Ok(())) => {
                session.counts.succeeded += 1;
                return;
            }
            Ok(Err(e)) => {
                tracing::error!(line, error = ?e, "Command '{name}' failed");
                e.to_string()
            }
            Err(e) => {
                tracing::error!(line, error = ?e, "Command '{name}' panicked");
                "handler panicked".to_string()
            }
        };

        session.counts.failed += 1;
        session.note(
            Some(line),
            NoticeKind::Failed,
            format!(
                "❌ {name} failed - {}",
                diagnostic(&failure, self.config.max_diagnostic_len)
            ),
        );
    }

    fn finish(
        &self,
        session: ExecutionSession,
        unprocessed: usize,
        original_content: String,
    ) -> ExecutionReport {
        let state = session.state;
        // Market files belong to their owner and are never rewritten.
        let undoable = state == RunState::Completed
            && !session.is_undo
            && !matches!(session.artifact, ArtifactRef::Market { .. });
        let undo = undoable.then(|| UndoTicket {
            artifact: session.artifact.clone(),
            original_content,
        });
        let duration = session.started_at.elapsed();
        let counts = session.counts;

        tracing::info!(
            ?state,
            succeeded = counts.succeeded,
            failed = counts.failed,
            skipped = counts.skipped,
            unprocessed,
            duration_secs = duration.as_secs_f64(),
            "Execution finished"
        );

        ExecutionReport {
            user_id: session.user_id,
            artifact: session.artifact,
            tier: session.tier,
            state,
            is_undo: session.is_undo,
            duration,
            counts,
            unprocessed,
            notices: session.notices,
            undo,
        }
    }
}
