//! Error types for guild operations
//!
//! Only recoverable conditions live here. A broken ownership invariant is
//! not an error value at all; see [`crate::fatal`].

use thiserror::Error;

use crate::guild::GuildStatus;
use crate::value::Value;

/// Main error type for guild operations
#[derive(Error, Debug)]
pub enum GuildError {
    /// A value can neither be shared nor moved to another guild
    #[error("can not send {kind} to another guild: {blocker}")]
    NotTransferable {
        /// Kind of the offending object
        kind: &'static str,
        /// Why it could not be moved
        #[source]
        blocker: TransferBlocker,
    },

    /// A value can not be made deeply immutable
    #[error("can not make {kind} shareable: {blocker}")]
    NotShareable {
        /// Kind of the offending object
        kind: &'static str,
        /// The reachable object that prevents it
        #[source]
        blocker: TransferBlocker,
    },

    /// The 32-bit guild id space has been used up
    #[error("guild id space exhausted")]
    IdSpaceExhausted,

    /// `create_main_guild` was called a second time
    #[error("main guild already exists")]
    MainGuildExists,

    /// The configured live-guild limit has been reached
    #[error("live guild limit reached ({limit})")]
    GuildLimit {
        /// Configured limit
        limit: usize,
    },

    /// The guild has terminated; its exit entrypoints and heap access are closed
    #[error("guild {id} already terminated ({status})")]
    AlreadyTerminated {
        /// Guild id
        id: u32,
        /// Terminal status it already holds
        status: GuildStatus,
    },

    /// A guild that is still running can not be retired
    #[error("guild {id} is still running")]
    StillRunning {
        /// Guild id
        id: u32,
    },

    /// The guild's outcome was already taken by another joiner
    #[error("guild {id} is closed")]
    Closed {
        /// Guild id
        id: u32,
    },

    /// `select` was given no guilds to wait on
    #[error("select needs at least one guild")]
    EmptySelect,

    /// A guild tried to join itself
    #[error("guild {id} can not join itself")]
    SelfJoin {
        /// Guild id
        id: u32,
    },

    /// The joined guild terminated with a failure
    #[error("guild {id} terminated with an exception: {payload:?}")]
    Remote {
        /// Id of the failed guild
        id: u32,
        /// Failure payload, already transferred to the joiner
        payload: Value,
    },

    /// Mutation of a frozen object
    #[error("can not modify frozen {kind}")]
    Frozen {
        /// Kind of the frozen object
        kind: &'static str,
    },

    /// Type mismatch on a typed accessor
    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        /// Expected kind
        expected: &'static str,
        /// Actual kind received
        got: &'static str,
    },

    /// Operation reserved for the main guild
    #[error("only the main guild can {0}")]
    NotMainGuild(&'static str),

    /// The registry was torn down
    #[error("guild registry has been shut down")]
    ShutDown,

    /// The guild thread died before binding its parameters
    #[error("guild {id} stopped before it started")]
    StartFailed {
        /// Guild id
        id: u32,
    },

    /// The OS refused to start a guild thread
    #[error("failed to start guild thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Why an object could not be moved across a guild boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferBlocker {
    /// Reachable object owned by a guild other than the sender
    #[error("object owned by guild {owner}, sender is guild {sender}")]
    ForeignOwner {
        /// Stored owner id
        owner: u32,
        /// Sending guild id
        sender: u32,
    },

    /// Reachable native handle
    #[error("native handles are bound to their guild")]
    NativeHandle,
}

impl GuildError {
    /// Build a `TypeError` from an expected kind and the value received.
    pub fn type_error(expected: &'static str, got: &Value) -> Self {
        Self::TypeError {
            expected,
            got: got.kind_name(),
        }
    }
}

/// Result type alias for guild operations
pub type Result<T> = std::result::Result<T, GuildError>;
