//! Conversation state stores for Parley.
//!
//! Both stores implement [`parley_core::StateStore`] and persist whole
//! [`parley_core::ConversationState`] snapshots between turns.

pub mod file_store;
pub mod in_memory;

pub use file_store::FileStateStore;
pub use in_memory::InMemoryStateStore;
