//! # MagicFind Error Types
//!
//! All errors that can cross an adapter boundary.
//!
//! None of these ever escape [`crate::engine::MagicFindEngine::on_mob_death`]:
//! the engine logs them and degrades to "this line drops nothing".

use thiserror::Error;

/// Errors raised by adapters and the config store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MagicFindError {
    /// The item catalog failed to resolve or build an item.
    #[error("item catalog failure for '{item}': {reason}")]
    CatalogFailure {
        /// The item reference being resolved.
        item: String,
        /// Adapter-provided reason.
        reason: String,
    },

    /// The container-slot store failed to look up or update a slot.
    #[error("container store failure for actor {actor}: {reason}")]
    ContainerFailure {
        /// The actor whose container was touched.
        actor: String,
        /// Adapter-provided reason.
        reason: String,
    },

    /// The external variable store failed on a key.
    #[error("variable store failure on '{key}': {reason}")]
    VariableStore {
        /// The variable key.
        key: String,
        /// Adapter-provided reason.
        reason: String,
    },

    /// A sound identifier could not be played.
    #[error("sound '{sound}' could not be played: {reason}")]
    SoundFailure {
        /// The sound identifier.
        sound: String,
        /// Adapter-provided reason.
        reason: String,
    },

    /// The configuration source could not be read.
    #[error("config unreadable: {0}")]
    ConfigIo(String),

    /// The configuration source could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for MagicFind operations.
pub type MagicFindResult<T> = Result<T, MagicFindError>;
