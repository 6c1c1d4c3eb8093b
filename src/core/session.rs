//! AI authoring sessions.
//!
//! A user has at most one [`AiSession`] at a time. The session owns its
//! conversation (and with it the backend client) plus the per-tier reply and
//! save budgets. Closing consumes the session, so it can only happen once.

use crate::{
    config::tiers::{Budget, TierLimits},
    core::{ai::Conversation, maintenance::CutoverTarget, tier::Tier},
    errors::{Error, Result},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;
use uuid::Uuid;

/// One user's in-progress authoring conversation.
pub struct AiSession {
    user_id: u64,
    tier: Tier,
    conversation: Conversation,
    replies: Budget,
    saves: Budget,
    last_reply: Option<String>,
    draft: Option<String>,
    last_activity: Instant,
}

/// What is left of a session's budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    /// Replies remaining
    pub replies: Budget,
    /// Permanent saves remaining
    pub saves: Budget,
}

impl AiSession {
    /// Creates a session with budgets taken from the tier limits.
    #[must_use]
    pub fn new(user_id: u64, tier: Tier, limits: &TierLimits, conversation: Conversation) -> Self {
        Self {
            user_id,
            tier,
            conversation,
            replies: limits.replies,
            saves: limits.saves,
            last_reply: None,
            draft: None,
            last_activity: Instant::now(),
        }
    }

    /// Identity of the underlying conversation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.conversation.id()
    }

    /// Owning user.
    #[must_use]
    pub const fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Tier chosen when the session began.
    #[must_use]
    pub const fn tier(&self) -> Tier {
        self.tier
    }

    /// Most recent successful reply.
    #[must_use]
    pub fn last_reply(&self) -> Option<&str> {
        self.last_reply.as_deref()
    }

    /// Last reply after the first permanent-save stage, if it has run since
    /// the last reply.
    #[must_use]
    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    /// Keeps `content` as the staged permanent save.
    pub fn set_draft(&mut self, content: String) {
        self.draft = Some(content);
    }

    /// Remaining budgets.
    #[must_use]
    pub const fn allowance(&self) -> Allowance {
        Allowance {
            replies: self.replies,
            saves: self.saves,
        }
    }

    /// Mutable access to the conversation, for refinement prompts that should
    /// not count against the reply budget.
    pub fn conversation_mut(&mut self) -> &mut Conversation {
        self.last_activity = Instant::now();
        &mut self.conversation
    }

    /// Sends a user prompt, spending one reply on success.
    ///
    /// # Errors
    /// Returns [`Error::ReplyBudgetExhausted`] without calling the service when
    /// no replies are left, or the service error if the query fails.
    pub async fn ask(&mut self, prompt: &str) -> Result<String> {
        if !self.replies.has_remaining() {
            return Err(Error::ReplyBudgetExhausted);
        }
        self.last_activity = Instant::now();
        let reply = self.conversation.query(prompt).await?;
        self.replies.consume();
        self.last_reply = Some(reply.clone());
        self.draft = None;
        Ok(reply)
    }

    /// Fails with [`Error::SaveBudgetExhausted`] when no saves are left.
    pub fn check_save_budget(&self, limits: &TierLimits) -> Result<()> {
        if self.saves.has_remaining() {
            Ok(())
        } else {
            Err(Error::SaveBudgetExhausted {
                limit: limits.saves.as_config_value(),
            })
        }
    }

    /// Spends one permanent save.
    pub fn consume_save(&mut self) {
        self.saves.consume();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_activity)
    }

    /// Ends the session, releasing the backend client.
    pub fn close(self) {
        tracing::info!(
            user_id = self.user_id,
            session = %self.conversation.id(),
            turns = self.conversation.history().len(),
            "AI session closed"
        );
    }
}

/// Shared, lockable slot holding a live session. Empty once closed.
pub type SessionSlot = Arc<tokio::sync::Mutex<Option<AiSession>>>;

/// Registry of live sessions, one per user.
#[derive(Clone, Default)]
pub struct AiSessions {
    slots: Arc<Mutex<HashMap<u64, SessionSlot>>>,
}

impl AiSessions {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session.
    ///
    /// # Errors
    /// Returns [`Error::SessionActive`] if the user already has one; the new
    /// session is closed in that case.
    pub fn insert(&self, session: AiSession) -> Result<SessionSlot> {
        let user_id = session.user_id();
        let Ok(mut slots) = self.slots.lock() else {
            session.close();
            return Err(Error::SessionActive { user_id });
        };
        if slots.contains_key(&user_id) {
            session.close();
            return Err(Error::SessionActive { user_id });
        }
        let slot = Arc::new(tokio::sync::Mutex::new(Some(session)));
        slots.insert(user_id, Arc::clone(&slot));
        Ok(slot)
    }

    /// Whether the user has a live session.
    #[must_use]
    pub fn is_active(&self, user_id: u64) -> bool {
        self.slots
            .lock()
            .is_ok_and(|slots| slots.contains_key(&user_id))
    }

    /// Returns the user's session slot.
    ///
    /// # Errors
    /// Returns [`Error::NoSession`] if the user has none.
    pub fn get(&self, user_id: u64) -> Result<SessionSlot> {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(&user_id).cloned())
            .ok_or(Error::NoSession { user_id })
    }

    fn take_slots(&self, pred: impl Fn(&u64) -> bool) -> Vec<SessionSlot> {
        let Ok(mut slots) = self.slots.lock() else {
            return Vec::new();
        };
        let keys: Vec<u64> = slots.keys().copied().filter(|k| pred(k)).collect();
        keys.into_iter().filter_map(|k| slots.remove(&k)).collect()
    }

    /// Removes and closes the user's session. Returns whether one existed.
    pub async fn end(&self, user_id: u64) -> bool {
        let mut ended = false;
        for slot in self.take_slots(|k| *k == user_id) {
            if let Some(session) = slot.lock().await.take() {
                session.close();
                ended = true;
            }
        }
        ended
    }

    /// Closes sessions idle for longer than `max_idle`. Returns each closed
    /// session's user and tier.
    pub async fn expire_idle(&self, max_idle: Duration) -> Vec<(u64, Tier)> {
        let now = Instant::now();
        let snapshot: Vec<(u64, SessionSlot)> = self
            .slots
            .lock()
            .map(|slots| slots.iter().map(|(k, v)| (*k, Arc::clone(v))).collect())
            .unwrap_or_default();

        let mut expired = Vec::new();
        for (user_id, slot) in snapshot {
            let mut guard = slot.lock().await;
            if guard.as_ref().is_some_and(|s| s.idle_for(now) > max_idle) {
                if let Ok(mut slots) = self.slots.lock() {
                    slots.remove(&user_id);
                }
                if let Some(session) = guard.take() {
                    tracing::info!(user_id, "Closing idle AI session");
                    expired.push((user_id, session.tier()));
                    session.close();
                }
            }
        }
        expired
    }
}

#[async_trait]
impl CutoverTarget for AiSessions {
    async fn terminate_all(&self) -> usize {
        let mut closed = 0;
        for slot in self.take_slots(|_| true) {
            if let Some(session) = slot.lock().await.take() {
                session.close();
                closed += 1;
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{core::ai::QueryPolicy, test_utils::*};

    fn session(user_id: u64, tier: Tier, backend: ScriptedBackend) -> AiSession {
        let conversation = Conversation::new("system", Box::new(backend), QueryPolicy::default());
        AiSession::new(user_id, tier, &TierLimits::default_for(tier), conversation)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_budget_spent_only_on_success() -> Result<()> {
        let backend = ScriptedBackend::new(vec![
            Reply::Fail,
            Reply::Fail,
            Reply::Fail,
            Reply::Text("first reply".into()),
            Reply::Text("second reply".into()),
            Reply::Text("third reply".into()),
        ]);
        let mut s = session(1, Tier::Drifter, backend);

        assert!(s.ask("one").await.is_err());
        assert_eq!(s.allowance().replies, Budget::Limited(3));

        s.ask("one").await?;
        s.ask("two").await?;
        s.ask("three").await?;
        assert_eq!(s.allowance().replies, Budget::Limited(0));
        assert_eq!(s.last_reply(), Some("third reply"));

        assert!(matches!(s.ask("four").await, Err(Error::ReplyBudgetExhausted)));
        Ok(())
    }

    #[tokio::test]
    async fn test_unlimited_replies_never_exhaust() -> Result<()> {
        let backend = ScriptedBackend::repeating("a long enough reply");
        let conversation = Conversation::new("s", Box::new(backend), QueryPolicy::default());
        let mut limits = TierLimits::default_for(Tier::Abysswalker);
        limits.replies = Budget::Unlimited;
        let mut s = AiSession::new(1, Tier::Abysswalker, &limits, conversation);

        for _ in 0..20 {
            s.ask("again").await?;
        }
        assert_eq!(s.allowance().replies, Budget::Unlimited);
        Ok(())
    }

    #[test]
    fn test_save_budget() {
        let mut limits = TierLimits::default_for(Tier::Drifter);
        limits.saves = Budget::Limited(1);
        let conversation = Conversation::new(
            "s",
            Box::new(ScriptedBackend::new(vec![])),
            QueryPolicy::default(),
        );
        let mut s = AiSession::new(1, Tier::Drifter, &limits, conversation);

        assert!(s.check_save_budget(&limits).is_ok());
        s.consume_save();
        assert!(matches!(
            s.check_save_budget(&limits),
            Err(Error::SaveBudgetExhausted { limit: 1 })
        ));
    }

    #[tokio::test]
    async fn test_one_session_per_user() {
        let sessions = AiSessions::new();
        sessions
            .insert(session(1, Tier::Drifter, ScriptedBackend::new(vec![])))
            .unwrap();

        let second = sessions.insert(session(1, Tier::Seeker, ScriptedBackend::new(vec![])));
        assert!(matches!(second, Err(Error::SessionActive { user_id: 1 })));

        // The first session is untouched.
        let slot = sessions.get(1).unwrap();
        assert_eq!(slot.lock().await.as_ref().unwrap().tier(), Tier::Drifter);

        sessions
            .insert(session(2, Tier::Drifter, ScriptedBackend::new(vec![])))
            .unwrap();
        assert!(sessions.is_active(2));
    }

    #[tokio::test]
    async fn test_end_closes_exactly_once() {
        let sessions = AiSessions::new();
        let slot = sessions
            .insert(session(1, Tier::Drifter, ScriptedBackend::new(vec![])))
            .unwrap();

        assert!(sessions.end(1).await);
        assert!(!sessions.end(1).await);
        assert!(slot.lock().await.is_none());
        assert!(matches!(sessions.get(1), Err(Error::NoSession { .. })));
    }

    #[tokio::test]
    async fn test_terminate_all_closes_every_session() {
        let sessions = AiSessions::new();
        for user in 1..=3 {
            sessions
                .insert(session(user, Tier::Drifter, ScriptedBackend::new(vec![])))
                .unwrap();
        }
        assert_eq!(sessions.terminate_all().await, 3);
        assert_eq!(sessions.terminate_all().await, 0);
        assert!(!sessions.is_active(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_expire() {
        let sessions = AiSessions::new();
        sessions
            .insert(session(1, Tier::Drifter, ScriptedBackend::new(vec![])))
            .unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(sessions.expire_idle(Duration::from_secs(120)).await.is_empty());

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(
            sessions.expire_idle(Duration::from_secs(120)).await,
            vec![(1, Tier::Drifter)]
        );
        assert!(!sessions.is_active(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_reply_discards_draft() -> Result<()> {
        let backend = ScriptedBackend::new(vec![
            Reply::Text("first reply".into()),
            Reply::Text("second reply".into()),
        ]);
        let mut s = session(1, Tier::Drifter, backend);
        s.ask("one").await?;
        s.set_draft("staged".into());
        assert_eq!(s.draft(), Some("staged"));

        s.ask("two").await?;
        assert_eq!(s.draft(), None);
        Ok(())
    }
}
