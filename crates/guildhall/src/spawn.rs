//! Starting guilds
//!
//! [`create_guild`] is the whole spawn handshake: register, move the
//! arguments, start the thread, and return only after the new guild has
//! bound its parameters.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;

use tracing::{debug, warn};

use crate::context::ExecContext;
use crate::error::{GuildError, Result};
use crate::exit;
use crate::guild::Guild;
use crate::registry::GuildRegistry;
use crate::transfer::{self, TransferPlan};
use crate::value::Value;

/// How a guild body can fail.
#[derive(Debug)]
pub enum Failure {
    /// The body raised a payload
    Raised(Value),
    /// The body hit a guild error
    Error(GuildError),
}

impl From<GuildError> for Failure {
    fn from(err: GuildError) -> Self {
        Failure::Error(err)
    }
}

/// Result of a guild body.
pub type BodyResult = std::result::Result<Value, Failure>;

/// Options for a new guild.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Guild name
    pub name: Option<String>,

    /// Names the arguments are bound to, in order
    pub params: Vec<String>,
}

impl SpawnOptions {
    /// Options with no name and no named parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the guild name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the parameter names.
    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Spawn a guild from `parent` running `body` with `args`.
///
/// Returns after every argument has been moved or shared and the new guild
/// has bound them. If any argument can not cross, the call fails and the
/// guild never starts.
pub fn create_guild<F>(
    parent: &ExecContext,
    options: SpawnOptions,
    args: Vec<Value>,
    body: F,
) -> Result<Arc<Guild>>
where
    F: FnOnce(&mut ExecContext) -> BodyResult + Send + 'static,
{
    let registry = Arc::clone(parent.registry());
    let guild = registry.register(options.name)?;

    let params = match transfer::send_parameters(parent, &guild, args) {
        Ok(params) => params,
        Err(err) => {
            registry.discard(&guild);
            return Err(err);
        }
    };
    let plan = params.plan().clone();

    let config = registry.config();
    let mut builder =
        thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, guild.id()));
    if let Some(size) = config.stack_size {
        builder = builder.stack_size(size);
    }

    let (ready_tx, ready_rx) = mpsc::channel();
    let child = Arc::clone(&guild);
    let child_registry = Arc::clone(&registry);
    let names = options.params;
    guild.mark_started();
    let started = builder.spawn(move || {
        let mut ctx = ExecContext::new(child, child_registry);
        transfer::recv_parameters(&mut ctx, &names, params);
        // The spawner may have given up waiting; the body runs regardless.
        let _ = ready_tx.send(());
        run_body(&mut ctx, body);
    });

    if let Err(err) = started {
        plan.rollback();
        registry.discard(&guild);
        return Err(GuildError::Spawn(err));
    }

    await_bound(&ready_rx, &registry, &guild, &plan)?;
    debug!(
        parent = parent.current_id().get(),
        id = guild.id().get(),
        moved = plan.moved_count(),
        "guild started"
    );
    Ok(guild)
}

/// Block until the new guild has bound its parameters. A dropped sender
/// means its thread died first; the arguments go back to the spawner.
fn await_bound(
    ready: &mpsc::Receiver<()>,
    registry: &GuildRegistry,
    guild: &Guild,
    plan: &TransferPlan,
) -> Result<()> {
    if ready.recv().is_ok() {
        return Ok(());
    }
    plan.rollback();
    registry.discard(guild);
    warn!(id = guild.id().get(), "guild thread died before binding parameters");
    Err(GuildError::StartFailed {
        id: guild.id().get(),
    })
}

fn run_body<F>(ctx: &mut ExecContext, body: F)
where
    F: FnOnce(&mut ExecContext) -> BodyResult,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *ctx)));

    if ctx.guild().status().is_terminal() {
        debug!(id = ctx.current_id().get(), "body terminated the guild itself");
        return;
    }

    let exited = match outcome {
        Ok(Ok(value)) => match exit::atexit(ctx, value) {
            Err(err @ GuildError::NotTransferable { .. }) => {
                let payload = exit::failure_message(ctx, &err.to_string());
                exit::atexit_exception(ctx, payload)
            }
            other => other,
        },
        Ok(Err(Failure::Raised(payload))) => exit::atexit_exception(ctx, payload),
        Ok(Err(Failure::Error(err))) => {
            let payload = exit::failure_message(ctx, &err.to_string());
            exit::atexit_exception(ctx, payload)
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "guild body panicked".to_string());
            let payload = exit::failure_message(ctx, &message);
            exit::atexit_exception(ctx, payload)
        }
    };

    if let Err(err) = exited {
        warn!(id = ctx.current_id().get(), error = %err, "guild exit failed");
    }
}

/// Process start: create the registry and the main guild.
pub fn main_guild_bootstrap() -> Result<ExecContext> {
    GuildRegistry::bootstrap(Default::default())
}
