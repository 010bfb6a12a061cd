//! Value representation for guild-visible data

mod display;
mod header;
mod impls;
mod object;

pub use header::{
    GuildId, Header, Owner, FLAGS_MASK, FL_FROZEN, FL_SHAREABLE, OWNER_SHIFT,
};
pub use object::{HeapObject, NativeHandle, ObjectBody, ObjectRef, Record};

use std::sync::Arc;

use crate::guild::Guild;

/// A value a guild can hold in a binding or pass to another guild.
///
/// Values are organized into three tiers:
/// - Immediates: no heap identity, always shareable
/// - Heap objects: carry a header word with an owner tag
/// - Guild handles: references to guilds, always shareable
#[derive(Clone)]
pub enum Value {
    // ═══════════════════════════════════════════════════════════════════
    // Immediates
    // ═══════════════════════════════════════════════════════════════════
    /// Absence of a value
    Nil,

    /// Boolean
    Bool(bool),

    /// 64-bit integer
    Int(i64),

    /// 64-bit float
    Float(f64),

    /// Interned name; immutable by construction
    Symbol(Arc<str>),

    // ═══════════════════════════════════════════════════════════════════
    // Heap objects
    // ═══════════════════════════════════════════════════════════════════
    /// Reference to a heap object
    Object(ObjectRef),

    // ═══════════════════════════════════════════════════════════════════
    // Guild handles
    // ═══════════════════════════════════════════════════════════════════
    /// Reference to a guild
    Guild(Arc<Guild>),
}
