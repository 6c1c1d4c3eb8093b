//! Discord interaction handlers
//!
//! Built-in command handlers, the progress surface, server snapshots and
//! autocomplete.

/// Autocomplete handlers for file and listing UIDs
pub mod autocomplete;
/// Built-in Discord command handlers and the invocation context
pub mod builtin;
/// Server snapshot for authoring prompts
pub mod server_info;
/// Progress message and report embeds
pub mod surface;
