//! AI-assisted undo of a completed run.
//!
//! Proposing always uses a brand-new conversation seeded with the undo prompt,
//! never the one that wrote the file. Committing overwrites the file with the
//! accepted candidate and runs it flagged as an undo, so its report offers no
//! further undo.

use crate::{
    core::{
        ai::{BackendFactory, Conversation, QueryPolicy},
        engine::{ExecutionReport, ProgressSurface, UndoTicket},
        execution::{CommitRequest, Executor},
        prompts::{Prompt, PromptLibrary},
    },
    errors::Result,
};
use std::sync::Arc;
use uuid::Uuid;

/// A candidate inverse awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoProposal {
    /// Identity of the conversation that produced the candidate
    pub session_id: Uuid,
    /// Proposed replacement content
    pub candidate: String,
}

/// Produces undo proposals.
pub struct UndoEngine {
    prompts: PromptLibrary,
    factory: Arc<dyn BackendFactory>,
    policy: QueryPolicy,
}

impl UndoEngine {
    /// Creates an undo engine.
    #[must_use]
    pub fn new(prompts: PromptLibrary, factory: Arc<dyn BackendFactory>, policy: QueryPolicy) -> Self {
        Self {
            prompts,
            factory,
            policy,
        }
    }

    /// Asks a fresh conversation for the inverse of `original_content`.
    ///
    /// The conversation is closed before returning, on success or failure.
    ///
    /// # Errors
    /// [`crate::errors::Error::Prompt`] if the undo prompt is unavailable, or
    /// the query error.
    #[tracing::instrument(skip_all)]
    pub async fn propose(&self, original_content: &str) -> Result<UndoProposal> {
        let system = self.prompts.load(Prompt::Undo).await?;
        let mut conversation = Conversation::new(&system, self.factory.create(), self.policy);
        let session_id = conversation.id();
        let outcome = conversation.query(original_content).await;
        drop(conversation);
        tracing::info!(%session_id, ok = outcome.is_ok(), "Undo proposal session closed");

        Ok(UndoProposal {
            session_id,
            candidate: outcome?,
        })
    }
}

/// Writes `candidate` over the ticket's file and runs it as an undo.
///
/// # Errors
/// As for [`Executor::commit_replacement`].
pub async fn commit_undo<C>(
    executor: &Executor<C>,
    user_id: u64,
    ticket: &UndoTicket,
    candidate: &str,
    ctx: &C,
    surface: &dyn ProgressSurface,
) -> Result<ExecutionReport>
where
    C: Clone + Send + Sync + 'static,
{
    let request = CommitRequest {
        user_id,
        artifact: ticket.artifact.clone(),
    };
    executor
        .commit_replacement(request, candidate, ctx, surface)
        .await
}
