//! Belonging tags: which guild may mutate a heap object
//!
//! The owner id lives in the high half of the object header (see
//! [`crate::value::Header`]). Shareable objects have no owner no matter
//! what the stored id says.

use std::fmt;

use crate::context::ExecContext;
use crate::shareable::shareable_continue;
use crate::value::{GuildId, HeapObject, ObjectRef, Owner, Value};

/// Whether this build audits mutations with [`confirm_belonging`].
pub const CHECK_MODE: bool = cfg!(feature = "check-mode");

/// Stamp `obj` as owned by `guild`. Flag bits are preserved.
#[inline]
pub fn tag(obj: &HeapObject, guild: GuildId) {
    obj.header().store_owner(guild.get());
}

/// Effective owner id of `value`: `0` when shareable, else the stored id.
pub fn belonging(value: &Value) -> u32 {
    match value {
        Value::Object(obj) => object_belonging(obj),
        _ => 0,
    }
}

/// [`belonging`] decoded into an [`Owner`].
pub fn owner(value: &Value) -> Owner {
    Owner::from_raw(belonging(value))
}

pub(crate) fn object_belonging(obj: &ObjectRef) -> u32 {
    if obj.is_flagged_shareable() || shareable_continue(obj) {
        0
    } else {
        obj.header().stored_owner()
    }
}

/// A broken ownership invariant.
///
/// Deliberately not an `Error`: there is no way to `?` it away. The only
/// consumer is [`crate::fatal::ownership_violation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipViolation {
    /// Debug rendering of the offending object
    pub object: String,
    /// Owner id stored in its header
    pub stored_owner: u32,
    /// Guild that attempted the access
    pub current: GuildId,
    /// The stored owner has exited; the object was moved out with its outcome
    pub owner_exited: bool,
}

impl OwnershipViolation {
    /// `true` when the object is neither shareable nor tagged.
    pub fn is_untagged(&self) -> bool {
        self.stored_owner == 0
    }
}

impl fmt::Display for OwnershipViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_untagged() {
            write!(
                f,
                "object {} has owner id 0 but is not shareable (current guild id: {})",
                self.object, self.current
            )
        } else if self.owner_exited {
            write!(
                f,
                "object {} was moved to guild id {}, which has exited (current guild id: {})",
                self.object, self.stored_owner, self.current
            )
        } else {
            write!(
                f,
                "object {} belongs to guild id {}, current guild id: {}",
                self.object, self.stored_owner, self.current
            )
        }
    }
}

/// Check that `current` may mutate `value` without aborting.
pub fn verify_belonging(value: &Value, current: GuildId) -> Result<(), OwnershipViolation> {
    match value {
        Value::Object(obj) => verify_object(obj, current),
        _ => Ok(()),
    }
}

pub(crate) fn verify_object(obj: &ObjectRef, current: GuildId) -> Result<(), OwnershipViolation> {
    let id = object_belonging(obj);
    if id == 0 {
        // Shareable, or never tagged. Only the first is legal.
        let stored = obj.header().stored_owner();
        if stored == 0 && !obj.is_flagged_shareable() {
            return Err(violation(obj, 0, current));
        }
        Ok(())
    } else if id != current.get() {
        Err(violation(obj, id, current))
    } else {
        Ok(())
    }
}

fn violation(obj: &ObjectRef, stored_owner: u32, current: GuildId) -> OwnershipViolation {
    OwnershipViolation {
        object: format!("{:?}", Value::Object(ObjectRef::clone(obj))),
        stored_owner,
        current,
        owner_exited: false,
    }
}

/// [`verify_object`] with the owner's lifecycle filled in from the registry.
#[cfg(feature = "check-mode")]
fn audit(ctx: &ExecContext, obj: &ObjectRef) -> Result<(), OwnershipViolation> {
    verify_object(obj, ctx.current_id()).map_err(|mut violation| {
        violation.owner_exited = ctx.registry().is_retired(violation.stored_owner);
        violation
    })
}

/// Enforcement point for mutation paths.
///
/// Returns `value` unchanged if it is shareable or owned by the current
/// guild; otherwise the process aborts.
#[cfg(feature = "check-mode")]
#[inline]
pub fn confirm_belonging<'a>(ctx: &ExecContext, value: &'a Value) -> &'a Value {
    if let Value::Object(obj) = value {
        confirm_object(ctx, obj);
    }
    value
}

/// Enforcement point for mutation paths. Compiled out in this build.
#[cfg(not(feature = "check-mode"))]
#[inline(always)]
pub fn confirm_belonging<'a>(_ctx: &ExecContext, value: &'a Value) -> &'a Value {
    value
}

#[cfg(feature = "check-mode")]
#[inline]
pub(crate) fn confirm_object(ctx: &ExecContext, obj: &ObjectRef) {
    if let Err(violation) = audit(ctx, obj) {
        crate::fatal::ownership_violation(&violation);
    }
}

#[cfg(not(feature = "check-mode"))]
#[inline(always)]
pub(crate) fn confirm_object(_ctx: &ExecContext, _obj: &ObjectRef) {}
