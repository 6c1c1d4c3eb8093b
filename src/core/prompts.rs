//! Fixed prompt files.
//!
//! Prompts live as plain text in the prompts directory and are read on every
//! use, so they can be edited while the bot runs.

use crate::errors::{Error, Result};
use std::path::PathBuf;

/// The fixed prompts the bot knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Introduction shown when a session begins
    Intro,
    /// Instructions shown to the user
    UserInstructions,
    /// System prompt for authoring sessions
    Authoring,
    /// Refinement before a scratch save
    EphemeralRefine,
    /// First refinement before a permanent save
    PermanentRefine,
    /// Second refinement, in a fresh conversation
    PermanentFinalize,
    /// System prompt for undo proposals
    Undo,
}

impl Prompt {
    /// File name inside the prompts directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Intro => "spectre.txt",
            Self::UserInstructions => "user_instructor.txt",
            Self::Authoring => "gpt_instructor.txt",
            Self::EphemeralRefine => "temp.txt",
            Self::PermanentRefine => "forever.txt",
            Self::PermanentFinalize => "forever1.txt",
            Self::Undo => "undo.txt",
        }
    }
}

const LOADING_FILE: &str = "random.txt";
const DEFAULT_LOADING_LINES: [&str; 4] = [
    "Executing...",
    "Processing commands...",
    "Working on it...",
    "Almost there...",
];

/// Reads prompts from a directory.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    dir: PathBuf,
}

impl PromptLibrary {
    /// Creates a library over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Reads a prompt.
    ///
    /// # Errors
    /// Returns [`Error::Prompt`] if the file is missing, unreadable or blank.
    pub async fn load(&self, prompt: Prompt) -> Result<String> {
        let name = prompt.file_name();
        let text = tokio::fs::read_to_string(self.dir.join(name))
            .await
            .map_err(|e| Error::Prompt {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        if text.trim().is_empty() {
            return Err(Error::Prompt {
                name: name.to_string(),
                reason: "file is empty".to_string(),
            });
        }
        Ok(text)
    }

    /// Reads the loading lines shown during long operations, one per line.
    /// Falls back to built-in lines when the file is missing or empty.
    pub async fn loading_lines(&self) -> Vec<String> {
        let path = self.dir.join(LOADING_FILE);
        let lines: Vec<String> = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::warn!("Loading lines unavailable at {path:?}: {e}. Using defaults.");
                Vec::new()
            }
        };

        if lines.is_empty() {
            return DEFAULT_LOADING_LINES.iter().map(|l| (*l).to_string()).collect();
        }
        tracing::info!("Loaded {} loading lines from {path:?}", lines.len());
        lines
    }
}
