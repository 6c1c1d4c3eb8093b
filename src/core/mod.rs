//! Core logic - framework-agnostic parsing, execution, authoring and market operations.
//!
//! Nothing in here talks to Discord directly. Command handlers receive a
//! caller-supplied context type, and progress goes through [`engine::ProgressSurface`].

/// Text-generation backend, conversations and the query retry policy
pub mod ai;
/// Scratch and saved command files plus their metadata
pub mod artifact;
/// AI authoring workflow: begin, whisper, save, retreat
pub mod authoring;
/// Per-user cooldowns between authoring sessions
pub mod cooldown;
/// Statement execution state machine
pub mod engine;
/// One-run-per-user bookkeeping and the commit entry point
pub mod execution;
/// Plain-text server summary for authoring prompts
pub mod guild;
/// Per-module maintenance switches with delayed cutover
pub mod maintenance;
/// Market listings, saves and stars
pub mod market;
/// Line parser for single statements
pub mod parser;
/// Splits file content into raw statements
pub mod preprocess;
/// Fixed prompt files
pub mod prompts;
/// Command handler registry backed by manifest directories
pub mod registry;
/// Progress and final report formatting
pub mod report;
/// AI sessions and their registry
pub mod session;
/// Tiers and authorization
pub mod tier;
/// AI-assisted undo
pub mod undo;
