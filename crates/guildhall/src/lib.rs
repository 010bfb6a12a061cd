//! # Guildhall
//!
//! Ownership isolation for a runtime that executes guilds in parallel.
//!
//! A guild is an isolated unit of execution with a private partition of the
//! mutable heap. Guildhall guarantees that a mutable object is only ever
//! touched by the guild that owns it, that shareable objects need no
//! synchronization at all, and that a broken ownership invariant aborts the
//! process instead of corrupting memory.
//!
//! ## Architecture
//!
//! - **Shareability**: [`is_shareable`] decides whether an object needs an owner
//! - **Belonging**: [`belonging`] reads and writes the owner id in the object header
//! - **Registry**: [`GuildRegistry`] issues ids and tracks live guilds
//! - **Transfer**: [`send_parameters`] / [`recv_parameters`] move values between guilds
//! - **Exit**: [`atexit`] / [`atexit_exception`] seal outcomes, [`join`] / [`select`] deliver them
//!
//! ## Example
//!
//! ```
//! use guildhall::{belonging, create_guild, GuildRegistry, RuntimeConfig, SpawnOptions, Value};
//!
//! let main = GuildRegistry::bootstrap(RuntimeConfig::default()).unwrap();
//! let msg = main.alloc_str("hello");
//!
//! let guild = create_guild(&main, SpawnOptions::new().params(["msg"]), vec![msg.clone()], |ctx| {
//!     let msg = ctx.env().get("msg").cloned().unwrap_or(Value::Nil);
//!     ctx.append_str(&msg, " world")?;
//!     Ok(msg)
//! })
//! .unwrap();
//!
//! let reply = guild.join(&main).unwrap();
//! assert_eq!(belonging(&reply), main.current_id().get());
//! assert_eq!(main.string(&reply).unwrap(), "hello world");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod belonging;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod exit;
pub mod fatal;
pub mod guild;
pub mod registry;
pub mod shareable;
pub mod spawn;
pub mod transfer;
pub mod value;

// Re-export main types
pub use belonging::{
    belonging, confirm_belonging, owner, tag, verify_belonging, OwnershipViolation, CHECK_MODE,
};
pub use config::RuntimeConfig;
pub use context::ExecContext;
pub use environment::{Binding, Environment};
pub use error::{GuildError, Result, TransferBlocker};
pub use exit::{atexit, atexit_exception, join, select};
pub use guild::{Guild, GuildStatus};
pub use registry::GuildRegistry;
pub use shareable::{is_shareable, make_shareable, shareable_continue};
pub use spawn::{create_guild, main_guild_bootstrap, BodyResult, Failure, SpawnOptions};
pub use transfer::{recv_parameters, send_parameters, Parameters, TransferPlan};
pub use value::{
    GuildId, Header, HeapObject, NativeHandle, ObjectBody, ObjectRef, Owner, Record, Value,
};

/// Guildhall version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
