//! Guild termination and outcome delivery
//!
//! ```text
//!            atexit            ┌───────────┐
//!        ┌────────────────────▶│ exited_ok │
//! ┌──────┴──┐                  └───────────┘
//! │ running │
//! └──────┬──┘                  ┌────────────┐
//!        └────────────────────▶│ exited_err │
//!        atexit_exception      └────────────┘
//! ```
//!
//! At exit the outcome is sealed: every object that leaves with it is
//! collected into a transfer plan and parked in the guild's mailbox, and
//! the exited guild loses heap access. The guild is retired right away;
//! its id stays reserved, so the sealed objects keep a valid owner until
//! one joiner takes the outcome and the plan re-tags them.

use std::sync::Arc;

use tracing::debug;

use crate::context::ExecContext;
use crate::error::{GuildError, Result};
use crate::guild::{Delivery, Guild, GuildStatus};
use crate::transfer::TransferPlan;
use crate::value::Value;

/// Normal completion with `result`.
///
/// A non-shareable result is sealed for the joiner: from here on the
/// exited guild can not reach it. A result that can not be moved is an
/// error and the guild stays running.
pub fn atexit(ctx: &ExecContext, result: Value) -> Result<()> {
    ctx.guild().ensure_running()?;
    let plan = seal(ctx, &result)?;
    finish(ctx, GuildStatus::ExitedOk, Ok(result), plan)
}

/// Abnormal completion with a failure `payload`.
///
/// A payload that can not be moved is replaced by a frozen description of
/// why, so the joiner always observes a failure.
pub fn atexit_exception(ctx: &ExecContext, payload: Value) -> Result<()> {
    ctx.guild().ensure_running()?;
    let (payload, plan) = match seal(ctx, &payload) {
        Ok(plan) => (payload, plan),
        Err(err) => {
            let message = failure_message(ctx, &err.to_string());
            let plan = seal(ctx, &message)?;
            (message, plan)
        }
    };
    finish(ctx, GuildStatus::ExitedErr, Err(payload), plan)
}

/// Collect the objects that leave with `value`. The joiner is unknown
/// until someone joins, so the destination is fixed at delivery.
fn seal(ctx: &ExecContext, value: &Value) -> Result<TransferPlan> {
    TransferPlan::prepare(ctx.current_id(), ctx.current_id(), std::slice::from_ref(value))
}

fn finish(
    ctx: &ExecContext,
    status: GuildStatus,
    outcome: std::result::Result<Value, Value>,
    plan: TransferPlan,
) -> Result<()> {
    let sealed = plan.moved_count();
    ctx.guild().terminate(status, Delivery { outcome, plan })?;
    ctx.registry().retire(ctx.guild())?;
    debug!(id = ctx.current_id().get(), %status, sealed, "guild exited");
    Ok(())
}

/// A frozen string owned by the current guild, usable as a failure payload.
pub(crate) fn failure_message(ctx: &ExecContext, message: &str) -> Value {
    let value = ctx.alloc_str(message);
    if let Value::Object(obj) = &value {
        ctx.freeze_object(obj);
    }
    value
}

/// Wait for `guild` to terminate and take its outcome.
///
/// The value or failure payload is moved to the calling guild. Only the
/// first joiner receives it; later joiners get `Closed`.
pub fn join(ctx: &ExecContext, guild: &Arc<Guild>) -> Result<Value> {
    if guild.id() == ctx.current_id() {
        return Err(GuildError::SelfJoin {
            id: guild.id().get(),
        });
    }
    let delivery = guild.take_outcome()?;
    receive(ctx, guild, delivery)
}

/// Wait for whichever of `guilds` terminates first and take its outcome.
///
/// Guilds whose outcome was already taken are skipped. Fails with `Closed`
/// when every candidate has been delivered.
pub fn select(ctx: &ExecContext, guilds: &[Arc<Guild>]) -> Result<(Arc<Guild>, Value)> {
    if guilds.is_empty() {
        return Err(GuildError::EmptySelect);
    }
    if let Some(own) = guilds.iter().find(|g| g.id() == ctx.current_id()) {
        return Err(GuildError::SelfJoin { id: own.id().get() });
    }

    let (guild, delivery) = ctx.registry().wait_terminated(|| {
        let mut closed = 0;
        let mut last_err = None;
        for guild in guilds {
            match guild.try_take_outcome() {
                Ok(Some(delivery)) => return Some(Ok((Arc::clone(guild), delivery))),
                Ok(None) => {}
                Err(err) => {
                    closed += 1;
                    last_err = Some(err);
                }
            }
        }
        // Nothing left to wait for once every candidate is closed.
        if closed == guilds.len() {
            last_err.map(Err)
        } else {
            None
        }
    })?;
    let value = receive(ctx, &guild, delivery)?;
    Ok((guild, value))
}

fn receive(ctx: &ExecContext, guild: &Guild, delivery: Delivery) -> Result<Value> {
    // The exiting thread may not have retired itself yet.
    ctx.registry().retire(guild)?;
    delivery.plan.deliver(ctx.current_id());
    if delivery.plan.moved_count() > 0 {
        debug!(
            from = guild.id().get(),
            to = ctx.current_id().get(),
            moved = delivery.plan.moved_count(),
            "outcome handed over"
        );
    }
    delivery.outcome.map_err(|payload| GuildError::Remote {
        id: guild.id().get(),
        payload,
    })
}

impl Guild {
    /// Join this guild from `ctx`. See [`join`].
    pub fn join(self: &Arc<Self>, ctx: &ExecContext) -> Result<Value> {
        join(ctx, self)
    }
}
