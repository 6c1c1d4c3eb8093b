//! Unified error types for the bot.
//!
//! Every fallible operation outside the handler boundary returns [`Result`]. The
//! `Display` text of each variant is short enough to be shown to a Discord user;
//! the full diagnostic goes to the operator log through `Debug`.

use thiserror::Error;

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Required environment variable missing
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// The requested command file does not exist
    #[error("File `{name}` not found")]
    ArtifactNotFound {
        /// Artifact display name or path
        name: String,
    },

    /// The command file exists but has no content
    #[error("File `{name}` is empty")]
    ArtifactEmpty {
        /// Artifact display name or path
        name: String,
    },

    /// The command file is not valid UTF-8 text
    #[error("File `{name}` is not a text file")]
    ArtifactNotText {
        /// Artifact display name or path
        name: String,
    },

    /// The command file cannot be read or written due to permissions
    #[error("Permission denied for file `{name}`")]
    ArtifactPermission {
        /// Artifact display name or path
        name: String,
    },

    /// The user already has a running execution
    #[error("You already have an execution in progress")]
    ExecutionInProgress {
        /// Discord user ID
        user_id: u64,
    },

    /// The user already has an authoring session open
    #[error("You already have an active session. Use `/spectre retreat` to end it first")]
    SessionActive {
        /// Discord user ID
        user_id: u64,
    },

    /// The user has no authoring session open
    #[error("You don't have an active session. Use `/spectre begin` first")]
    NoSession {
        /// Discord user ID
        user_id: u64,
    },

    /// The session has produced nothing to save yet
    #[error("There is no AI reply to save yet")]
    NothingToSave,

    /// A module is under maintenance
    #[error("The {module} module is under maintenance. Please try again later")]
    Maintenance {
        /// Name of the module
        module: String,
    },

    /// The user must wait before starting another session
    #[error("You're on cooldown. Try again in {remaining_secs} seconds")]
    Cooldown {
        /// Seconds until the cooldown ends
        remaining_secs: u64,
    },

    /// No replies left in the current session
    #[error("You've used all replies for this session")]
    ReplyBudgetExhausted,

    /// No permanent saves left for this tier
    #[error("You've reached the save limit of {limit} for your tier")]
    SaveBudgetExhausted {
        /// Tier limit
        limit: i64,
    },

    /// AI service failed after retries
    #[error("AI service error: {message}")]
    Ai {
        /// Last failure reason
        message: String,
    },

    /// AI service did not answer in time
    #[error("AI service timed out after {seconds} seconds")]
    AiTimeout {
        /// Timeout in seconds
        seconds: u64,
    },

    /// A fixed prompt file is missing or empty
    #[error("Prompt `{name}` unavailable: {reason}")]
    Prompt {
        /// Prompt file name
        name: String,
        /// Why it could not be used
        reason: String,
    },

    /// Market listing does not exist
    #[error("Market listing `{uid}` not found")]
    ListingNotFound {
        /// Artifact UID
        uid: String,
    },

    /// Artifact is already on the market
    #[error("File `{uid}` is already listed on the market")]
    AlreadyListed {
        /// Artifact UID
        uid: String,
    },

    /// Only the owner may change a listing
    #[error("You don't own listing `{uid}`")]
    NotListingOwner {
        /// Artifact UID
        uid: String,
    },

    /// Users cannot save or star their own listing
    #[error("You can't do that with your own listing")]
    OwnListing {
        /// Artifact UID
        uid: String,
    },

    /// User already saved or starred this listing
    #[error("You've already done that for listing `{uid}`")]
    AlreadyRecorded {
        /// Artifact UID
        uid: String,
    },

    /// Building a message failed
    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    /// Serenity/Poise framework error
    #[error("Serenity/Poise framework error: {0}")]
    #[allow(clippy::enum_variant_names)]
    FrameworkError(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::FrameworkError(Box::new(value))
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
