//! Shareability classification
//!
//! An object is shareable when no guild can observe it changing: immediates,
//! guild handles, and heap objects whose entire reachable graph is frozen
//! and free of native handles. A positive answer is cached in the header
//! as [`FL_SHAREABLE`] and never revoked. A negative answer is not cached,
//! since freezing can still make the object shareable later.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::context::ExecContext;
use crate::error::{GuildError, Result};
use crate::transfer;
use crate::value::{ObjectBody, ObjectRef, Value, FL_SHAREABLE};

/// Whether `value` may be read from any guild without synchronization.
#[inline]
pub fn is_shareable(value: &Value) -> bool {
    match value {
        Value::Object(obj) => obj.is_flagged_shareable() || shareable_continue(obj),
        _ => true,
    }
}

/// Slow path: walk the object graph under `root` and verify it is deeply
/// immutable.
///
/// On success every object visited is flagged shareable. Cycles are
/// handled by the visited set.
pub fn shareable_continue(root: &ObjectRef) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![Arc::clone(root)];
    let mut verified = Vec::new();

    while let Some(obj) = stack.pop() {
        if obj.is_flagged_shareable() || !visited.insert(obj.addr()) {
            continue;
        }
        if !obj.is_frozen() {
            return false;
        }
        {
            let body = obj.body();
            if let ObjectBody::Handle(_) = &*body {
                return false;
            }
            body.for_each_child(|child| stack.push(child));
        }
        verified.push(obj);
    }

    for obj in &verified {
        obj.header().set_flags(FL_SHAREABLE);
    }
    trace!(objects = verified.len(), "cached shareable graph");
    true
}

/// Deep-freeze `value` and everything reachable from it, then cache the
/// result as shareable.
///
/// Every reachable non-shareable object must belong to the calling guild
/// and must not be a native handle. On failure nothing is frozen.
pub fn make_shareable(ctx: &ExecContext, value: &Value) -> Result<Value> {
    let Value::Object(root) = value else {
        return Ok(value.clone());
    };
    if is_shareable(value) {
        return Ok(value.clone());
    }
    ctx.guild().ensure_running()?;

    let owned = transfer::collect_owned(root, ctx.current_id())
        .map_err(|(kind, blocker)| GuildError::NotShareable { kind, blocker })?;
    for obj in &owned {
        ctx.freeze_object(obj);
    }

    let shared = shareable_continue(root);
    debug_assert!(shared, "deep-frozen graph must classify as shareable");
    Ok(value.clone())
}
