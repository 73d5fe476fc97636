//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Per-turn engine faults
//! (source faults, resolution exhaustion) live in the engine crate because
//! they never cross the orchestrator boundary.

use thiserror::Error;

/// The top-level error type for Parley operations outside a turn.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- External collaborator errors ---
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Corrupted snapshot for {conversation_id}: {reason}")]
    Corrupted {
        conversation_id: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("Classifier failed: {0}")]
    Classification(String),

    #[error("Response generation failed: {0}")]
    Generation(String),

    #[error("Collaborator timed out after {timeout_ms}ms: {name}")]
    Timeout { name: String, timeout_ms: u64 },

    #[error("Collaborator not configured: {0}")]
    NotConfigured(String),
}
