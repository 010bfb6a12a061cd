//! Moving values across a guild boundary
//!
//! A value crosses in one of two ways. Shareable values are passed as-is.
//! Everything else is moved: every non-shareable object reachable from it
//! is re-tagged to the destination guild, after which the origin guild
//! fails the belonging check on any of them. A move is validated as a
//! whole before a single tag changes, so a failed transfer leaves every
//! object where it was.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::belonging;
use crate::context::ExecContext;
use crate::error::{GuildError, Result, TransferBlocker};
use crate::guild::Guild;
use crate::shareable::{is_shareable, shareable_continue};
use crate::value::{GuildId, ObjectBody, ObjectRef, Value};

/// Every non-shareable object reachable from `root`, provided all of them
/// are tagged `owner` and none is a native handle.
///
/// Shareable subgraphs are not descended into.
pub(crate) fn collect_owned(
    root: &ObjectRef,
    owner: GuildId,
) -> std::result::Result<Vec<ObjectRef>, (&'static str, TransferBlocker)> {
    let mut visited = HashSet::new();
    let mut stack = vec![Arc::clone(root)];
    let mut owned = Vec::new();

    while let Some(obj) = stack.pop() {
        if !visited.insert(obj.addr()) {
            continue;
        }
        if obj.is_flagged_shareable() || shareable_continue(&obj) {
            continue;
        }
        let stored = obj.header().stored_owner();
        if stored != owner.get() {
            return Err((
                obj.kind_name(),
                TransferBlocker::ForeignOwner {
                    owner: stored,
                    sender: owner.get(),
                },
            ));
        }
        {
            let body = obj.body();
            if let ObjectBody::Handle(_) = &*body {
                return Err((body.kind_name(), TransferBlocker::NativeHandle));
            }
            body.for_each_child(|child| stack.push(child));
        }
        owned.push(obj);
    }
    Ok(owned)
}

/// A validated move from one guild to another.
///
/// Nothing changes until [`TransferPlan::commit`].
#[derive(Debug, Clone)]
pub struct TransferPlan {
    from: GuildId,
    to: GuildId,
    moved: Vec<ObjectRef>,
}

impl TransferPlan {
    /// Validate that every value is either shareable or movable from `from`.
    pub fn prepare(from: GuildId, to: GuildId, values: &[Value]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut moved = Vec::new();
        for value in values {
            let Value::Object(root) = value else {
                continue;
            };
            if is_shareable(value) {
                continue;
            }
            let owned = collect_owned(root, from)
                .map_err(|(kind, blocker)| GuildError::NotTransferable { kind, blocker })?;
            moved.extend(owned.into_iter().filter(|obj| seen.insert(obj.addr())));
        }
        Ok(Self { from, to, moved })
    }

    /// Re-tag every moved object to the destination guild.
    pub fn commit(&self) {
        for obj in &self.moved {
            belonging::tag(obj, self.to);
        }
    }

    /// Re-tag every moved object to `to`, which replaces the destination
    /// named at prepare time.
    ///
    /// Used for outcomes, whose receiver is only known at join.
    pub(crate) fn deliver(&self, to: GuildId) {
        for obj in &self.moved {
            belonging::tag(obj, to);
        }
    }

    /// Hand every moved object back to the origin guild.
    pub fn rollback(&self) {
        for obj in &self.moved {
            belonging::tag(obj, self.from);
        }
    }

    /// Number of objects that change owner.
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }
}

/// Arguments committed to a new guild, waiting to be bound there.
#[derive(Debug)]
pub struct Parameters {
    values: Vec<Value>,
    plan: TransferPlan,
}

impl Parameters {
    /// The values, in send order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The move that was committed for these values.
    pub fn plan(&self) -> &TransferPlan {
        &self.plan
    }

    pub(crate) fn into_parts(self) -> (Vec<Value>, TransferPlan) {
        (self.values, self.plan)
    }
}

/// Hand `args` from the calling guild to `target`.
///
/// Either every argument crosses or none does: a non-transferable argument
/// fails the call before any object is re-tagged.
pub fn send_parameters(ctx: &ExecContext, target: &Guild, args: Vec<Value>) -> Result<Parameters> {
    target.ensure_running()?;
    let plan = TransferPlan::prepare(ctx.current_id(), target.id(), &args)?;
    plan.commit();
    debug!(
        from = ctx.current_id().get(),
        to = target.id().get(),
        args = args.len(),
        moved = plan.moved_count(),
        "parameters sent"
    );
    Ok(Parameters { values: args, plan })
}

/// Bind received parameters in the new guild's environment.
///
/// `names` bind positionally; see [`crate::Environment::install_params`].
pub fn recv_parameters(ctx: &mut ExecContext, names: &[String], params: Parameters) {
    let (values, plan) = params.into_parts();
    debug_assert_eq!(plan.to, ctx.current_id(), "parameters received by the wrong guild");
    ctx.env_mut().install_params(names, values);
}
