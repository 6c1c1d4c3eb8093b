//! AI authoring workflow.
//!
//! A user begins a session at a tier, converses with the model, and ends by
//! saving the last reply (to scratch or permanently) or by retreating. Every
//! save passes through refinement prompts first; a refinement that fails
//! leaves the best earlier content in place instead of aborting the save.
//! Ending a session counts as one use toward the tier's cooldown.

use crate::{
    config::{AiConfig, tiers::TierTable},
    core::{
        ai::{BackendFactory, Conversation, QueryPolicy},
        artifact::{ArtifactMetadata, ArtifactStore},
        cooldown::CooldownTracker,
        guild::GuildSnapshot,
        maintenance::{Maintenance, Module},
        prompts::{Prompt, PromptLibrary},
        session::{AiSession, AiSessions, Allowance},
        tier::Tier,
    },
    errors::{Error, Result},
};
use std::{fmt, sync::Arc, time::Duration};
use uuid::Uuid;

/// A reply and what is left of the session's budgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Conversation identity
    pub session_id: Uuid,
    /// Model reply
    pub reply: String,
    /// Remaining budgets after this reply
    pub allowance: Allowance,
}

/// Stages of a permanent save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStage {
    /// Refinement inside the authoring conversation
    Refine,
    /// Second pass in a fresh conversation
    Finalize,
}

impl fmt::Display for SaveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refine => f.write_str("refine"),
            Self::Finalize => f.write_str("finalize"),
        }
    }
}

/// Owns every authoring session and the services they need.
pub struct Authoring {
    sessions: AiSessions,
    cooldowns: CooldownTracker,
    prompts: PromptLibrary,
    factory: Arc<dyn BackendFactory>,
    policy: QueryPolicy,
    tiers: TierTable,
    store: ArtifactStore,
    maintenance: Maintenance,
    include_server_info: bool,
    session_idle: Duration,
}

impl Authoring {
    /// Creates the authoring service.
    #[must_use]
    pub fn new(
        ai: &AiConfig,
        tiers: TierTable,
        prompts: PromptLibrary,
        factory: Arc<dyn BackendFactory>,
        store: ArtifactStore,
        maintenance: Maintenance,
    ) -> Self {
        Self {
            sessions: AiSessions::new(),
            cooldowns: CooldownTracker::new(),
            prompts,
            factory,
            policy: QueryPolicy::from(ai),
            tiers,
            store,
            maintenance,
            include_server_info: ai.include_server_info,
            session_idle: Duration::from_secs(ai.session_idle_secs),
        }
    }

    /// Live sessions, for cutover and idle expiry.
    #[must_use]
    pub const fn sessions(&self) -> &AiSessions {
        &self.sessions
    }

    /// Prompt files.
    #[must_use]
    pub const fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }

    /// Closes sessions idle for longer than the configured limit. Each one
    /// counts toward its user's cooldown like any other ended session.
    pub async fn expire_idle(&self) -> usize {
        let expired = self.sessions.expire_idle(self.session_idle).await;
        for (user_id, tier) in &expired {
            self.cooldowns.record(*user_id, &self.tiers.limits(*tier));
        }
        expired.len()
    }

    /// Starts a session and sends the user's first prompt.
    ///
    /// When server info is enabled and `guild` is given, its rendering is
    /// appended to the first prompt.
    ///
    /// # Errors
    /// Rejected during maintenance, while a session is active or during a
    /// cooldown. If the first query fails the session is discarded.
    #[tracing::instrument(skip(self, prompt, guild))]
    pub async fn begin(
        &self,
        user_id: u64,
        tier: Tier,
        prompt: &str,
        guild: Option<&GuildSnapshot>,
    ) -> Result<Exchange> {
        self.maintenance.check(Module::Authoring)?;
        if self.sessions.is_active(user_id) {
            return Err(Error::SessionActive { user_id });
        }
        self.cooldowns.check(user_id)?;

        let system = self.prompts.load(Prompt::Authoring).await?;
        let conversation = Conversation::new(&system, self.factory.create(), self.policy);
        let session = AiSession::new(user_id, tier, &self.tiers.limits(tier), conversation);
        let slot = self.sessions.insert(session)?;
        tracing::info!(%tier, "AI session started");

        let first = match guild {
            Some(guild) if self.include_server_info => format!("{prompt}{}", guild.render()),
            _ => prompt.to_string(),
        };

        let outcome = {
            let mut guard = slot.lock().await;
            match guard.as_mut() {
                Some(session) => session.ask(&first).await.map(|reply| Exchange {
                    session_id: session.id(),
                    reply,
                    allowance: session.allowance(),
                }),
                None => Err(Error::NoSession { user_id }),
            }
        };

        if let Err(e) = &outcome {
            tracing::warn!("First query failed, discarding session: {e}");
            self.sessions.end(user_id).await;
        }
        outcome
    }

    /// Sends a follow-up prompt in the user's session.
    ///
    /// # Errors
    /// [`Error::NoSession`] without a session, [`Error::ReplyBudgetExhausted`]
    /// when out of replies, or the query error.
    #[tracing::instrument(skip(self, prompt))]
    pub async fn whisper(&self, user_id: u64, prompt: &str) -> Result<Exchange> {
        let slot = self.sessions.get(user_id)?;
        let mut guard = slot.lock().await;
        let session = guard.as_mut().ok_or(Error::NoSession { user_id })?;
        let reply = session.ask(prompt).await?;
        Ok(Exchange {
            session_id: session.id(),
            reply,
            allowance: session.allowance(),
        })
    }

    /// Refines the last reply and writes it to the user's scratch file, then
    /// ends the session. Returns the content written.
    ///
    /// # Errors
    /// [`Error::NoSession`], [`Error::NothingToSave`] before any reply, or a
    /// write failure.
    #[tracing::instrument(skip(self))]
    pub async fn save_ephemeral(&self, user_id: u64) -> Result<String> {
        let slot = self.sessions.get(user_id)?;
        let (content, tier) = {
            let mut guard = slot.lock().await;
            let session = guard.as_mut().ok_or(Error::NoSession { user_id })?;
            let last = session.last_reply().ok_or(Error::NothingToSave)?.to_string();
            let content = self
                .refine(session.conversation_mut(), Prompt::EphemeralRefine, last)
                .await;
            (content, session.tier())
        };

        self.store.write_ephemeral(user_id, &content).await?;
        tracing::info!(user_id, "Saved scratch file");
        self.finish(user_id, tier).await;
        Ok(content)
    }

    /// Runs the first permanent-save stage on the last reply and keeps the
    /// result in the session until it is named. Returns the staged content.
    ///
    /// # Errors
    /// [`Error::NoSession`], [`Error::SaveBudgetExhausted`] or
    /// [`Error::NothingToSave`].
    #[tracing::instrument(skip(self))]
    pub async fn prepare_permanent(&self, user_id: u64) -> Result<String> {
        let slot = self.sessions.get(user_id)?;
        let mut guard = slot.lock().await;
        let session = guard.as_mut().ok_or(Error::NoSession { user_id })?;
        session.check_save_budget(&self.tiers.limits(session.tier()))?;
        let last = session.last_reply().ok_or(Error::NothingToSave)?.to_string();

        tracing::debug!(stage = %SaveStage::Refine, "Permanent save stage");
        let refined = self
            .refine(session.conversation_mut(), Prompt::PermanentRefine, last)
            .await;
        session.set_draft(refined.clone());
        Ok(refined)
    }

    /// Finalizes the staged content and stores it as a new saved file, then
    /// ends the session. Runs the first stage here if
    /// [`prepare_permanent`](Self::prepare_permanent) has not run since the
    /// last reply.
    ///
    /// The save budget is spent only once content and metadata are written.
    ///
    /// # Errors
    /// [`Error::NoSession`], [`Error::SaveBudgetExhausted`],
    /// [`Error::NothingToSave`], or a write failure.
    #[tracing::instrument(skip(self, description))]
    pub async fn save_permanent(
        &self,
        user_id: u64,
        file_name: &str,
        description: &str,
    ) -> Result<ArtifactMetadata> {
        if self.staged(user_id).await?.is_none() {
            self.prepare_permanent(user_id).await?;
        }

        let slot = self.sessions.get(user_id)?;
        let (metadata, tier) = {
            let mut guard = slot.lock().await;
            let session = guard.as_mut().ok_or(Error::NoSession { user_id })?;
            let tier = session.tier();
            session.check_save_budget(&self.tiers.limits(tier))?;
            let refined = session.draft().ok_or(Error::NothingToSave)?.to_string();

            tracing::debug!(stage = %SaveStage::Finalize, "Permanent save stage");
            let finalized = self.finalize(refined).await;

            let metadata = self
                .store
                .create_saved(user_id, &finalized, file_name, description, tier)
                .await?;
            session.consume_save();
            (metadata, tier)
        };

        self.finish(user_id, tier).await;
        Ok(metadata)
    }

    async fn staged(&self, user_id: u64) -> Result<Option<String>> {
        let slot = self.sessions.get(user_id)?;
        let guard = slot.lock().await;
        let session = guard.as_ref().ok_or(Error::NoSession { user_id })?;
        Ok(session.draft().map(str::to_string))
    }

    /// Ends the user's session without saving.
    ///
    /// # Errors
    /// [`Error::NoSession`] if there is none.
    pub async fn retreat(&self, user_id: u64) -> Result<()> {
        let slot = self.sessions.get(user_id)?;
        let tier = slot
            .lock()
            .await
            .as_ref()
            .map(AiSession::tier)
            .ok_or(Error::NoSession { user_id })?;
        self.finish(user_id, tier).await;
        Ok(())
    }

    async fn finish(&self, user_id: u64, tier: Tier) {
        if self.sessions.end(user_id).await {
            self.cooldowns.record(user_id, &self.tiers.limits(tier));
        }
    }

    /// Asks the authoring conversation to refine its last reply. Falls back to
    /// `fallback` if the prompt is unavailable or the query fails.
    async fn refine(
        &self,
        conversation: &mut Conversation,
        prompt: Prompt,
        fallback: String,
    ) -> String {
        let name = prompt.file_name();
        let instruction = match self.prompts.load(prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(prompt = name, "Refinement skipped: {e}");
                return fallback;
            }
        };
        match conversation.query(&instruction).await {
            Ok(refined) => refined,
            Err(e) => {
                tracing::warn!(prompt = name, "Refinement failed, keeping previous content: {e}");
                fallback
            }
        }
    }

    /// Runs `content` through a fresh conversation seeded with the finalize
    /// prompt. The conversation is dropped when this returns, whatever the
    /// outcome.
    async fn finalize(&self, content: String) -> String {
        let stage = SaveStage::Finalize;
        let system = match self.prompts.load(Prompt::PermanentFinalize).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(%stage, "Stage skipped: {e}");
                return content;
            }
        };
        let mut conversation = Conversation::new(&system, self.factory.create(), self.policy);
        match conversation.query(&content).await {
            Ok(finalized) => finalized,
            Err(e) => {
                tracing::warn!(%stage, "Stage failed, keeping previous content: {e}");
                content
            }
        }
    }
}
