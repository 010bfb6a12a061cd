//! Process-wide guild registry
//!
//! One registry per process, created by [`GuildRegistry::bootstrap`] and
//! passed to every execution context. Ids are issued monotonically from 1
//! and never reused; once the 32-bit space is used up registration fails
//! with [`GuildError::IdSpaceExhausted`].
//!
//! A guild leaves the live table the moment it terminates. Its id moves to
//! the retired set and stays reserved, so an owner id stored in any object
//! header always names a guild this registry issued.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::context::ExecContext;
use crate::error::{GuildError, Result};
use crate::guild::{Guild, GuildStatus};
use crate::value::GuildId;

/// State serialized by the registry lock: id issuance, registration,
/// retirement and teardown.
#[derive(Debug)]
struct RegistryState {
    /// Next id to issue; `None` once exhausted
    next_id: Option<GuildId>,
    shut_down: bool,
}

/// Table of live guilds.
pub struct GuildRegistry {
    config: RuntimeConfig,
    guilds: DashMap<u32, Arc<Guild>>,
    retired: DashMap<u32, GuildStatus>,
    state: Mutex<RegistryState>,
    terminated: Condvar,
    main: OnceLock<Arc<Guild>>,
}

impl GuildRegistry {
    /// Create an empty registry. Most callers want [`GuildRegistry::bootstrap`].
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        Self::with_first_id(config, GuildId::new(1))
    }

    fn with_first_id(config: RuntimeConfig, first: Option<GuildId>) -> Arc<Self> {
        Arc::new(Self {
            config,
            guilds: DashMap::new(),
            retired: DashMap::new(),
            state: Mutex::new(RegistryState {
                next_id: first,
                shut_down: false,
            }),
            terminated: Condvar::new(),
            main: OnceLock::new(),
        })
    }

    /// Process start: create the registry and the main guild, returning the
    /// main guild's execution context.
    pub fn bootstrap(config: RuntimeConfig) -> Result<ExecContext> {
        let registry = Self::new(config);
        registry.create_main_guild()
    }

    /// Allocate the main guild and bind it to a new execution context.
    ///
    /// Must be called exactly once.
    pub fn create_main_guild(self: &Arc<Self>) -> Result<ExecContext> {
        if self.main.get().is_some() {
            return Err(GuildError::MainGuildExists);
        }
        let guild = self.register_guild(Some("main".to_string()), true)?;
        self.main
            .set(Arc::clone(&guild))
            .map_err(|_| GuildError::MainGuildExists)?;
        info!(id = guild.id().get(), "main guild created");
        Ok(ExecContext::new(guild, Arc::clone(self)))
    }

    /// Register a new non-main guild under the next id.
    pub fn register(&self, name: Option<String>) -> Result<Arc<Guild>> {
        self.register_guild(name, false)
    }

    fn register_guild(&self, name: Option<String>, is_main: bool) -> Result<Arc<Guild>> {
        let mut state = self.lock();
        if state.shut_down {
            return Err(GuildError::ShutDown);
        }
        if self.guilds.len() >= self.config.max_live_guilds {
            return Err(GuildError::GuildLimit {
                limit: self.config.max_live_guilds,
            });
        }
        let id = state.next_id.ok_or(GuildError::IdSpaceExhausted)?;
        state.next_id = id.get().checked_add(1).and_then(GuildId::new);

        let guild = Arc::new(Guild::new(id, name, is_main));
        self.guilds.insert(id.get(), Arc::clone(&guild));
        debug!(id = id.get(), name = ?guild.name(), "guild registered");
        Ok(guild)
    }

    /// Move a terminated guild from the live table to the retired set.
    ///
    /// Called by the exit protocol; retiring twice is a no-op.
    pub fn retire(&self, guild: &Guild) -> Result<()> {
        let status = guild.status();
        if !status.is_terminal() {
            return Err(GuildError::StillRunning {
                id: guild.id().get(),
            });
        }
        let _state = self.lock();
        if self.guilds.remove(&guild.id().get()).is_some() {
            self.retired.insert(guild.id().get(), status);
            debug!(id = guild.id().get(), %status, "guild retired");
        }
        self.terminated.notify_all();
        Ok(())
    }

    /// Remove a guild whose spawn was abandoned before its body ran.
    pub(crate) fn discard(&self, guild: &Guild) {
        let _state = self.lock();
        self.guilds.remove(&guild.id().get());
        debug!(id = guild.id().get(), "guild discarded before start");
    }

    /// Block until `ready` yields a value, re-checking after every
    /// termination.
    ///
    /// `ready` runs under the registry lock, so a guild that terminates
    /// between two checks is never missed.
    pub(crate) fn wait_terminated<T>(&self, mut ready: impl FnMut() -> Option<T>) -> T {
        let mut state = self.lock();
        loop {
            if let Some(found) = ready() {
                return found;
            }
            state = self
                .terminated
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lookups
    // ═══════════════════════════════════════════════════════════════════

    /// The guild `ctx` executes in.
    pub fn current_guild<'a>(&self, ctx: &'a ExecContext) -> &'a Arc<Guild> {
        ctx.guild()
    }

    /// Id of the guild `ctx` executes in.
    pub fn current_id(&self, ctx: &ExecContext) -> GuildId {
        ctx.current_id()
    }

    /// Id of `guild`.
    pub fn id_of(&self, guild: &Guild) -> GuildId {
        guild.id()
    }

    /// Live guild with the given id.
    pub fn lookup(&self, id: u32) -> Option<Arc<Guild>> {
        self.guilds.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `id` names a live guild.
    pub fn is_live(&self, id: u32) -> bool {
        self.guilds.contains_key(&id)
    }

    /// Whether `id` names a guild that has terminated.
    pub fn is_retired(&self, id: u32) -> bool {
        self.retired.contains_key(&id)
    }

    /// Final status of a retired guild.
    pub fn retired_status(&self, id: u32) -> Option<GuildStatus> {
        self.retired.get(&id).map(|entry| *entry.value())
    }

    /// Whether `id` was ever issued by this registry, live or retired.
    pub fn is_registered(&self, id: u32) -> bool {
        self.is_live(id) || self.is_retired(id)
    }

    /// Number of live guilds, main included.
    pub fn live_count(&self) -> usize {
        self.guilds.len()
    }

    /// The main guild, once created.
    pub fn main_guild(&self) -> Option<&Arc<Guild>> {
        self.main.get()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Whether [`GuildRegistry::shutdown`] has completed.
    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    // ═══════════════════════════════════════════════════════════════════
    // Shutdown
    // ═══════════════════════════════════════════════════════════════════

    /// Wait until every started non-main guild is terminal, then tear the
    /// table down. Guilds that were registered but never started are dropped.
    ///
    /// Only the main guild may call this.
    pub fn shutdown(&self, ctx: &ExecContext) -> Result<()> {
        if !ctx.is_main() {
            return Err(GuildError::NotMainGuild("shut down the registry"));
        }
        let mut state = self.lock();
        loop {
            let running = self
                .guilds
                .iter()
                .filter(|entry| {
                    !entry.is_main() && entry.is_started() && !entry.status().is_terminal()
                })
                .count();
            if running == 0 {
                break;
            }
            debug!(running, "shutdown waiting for guilds");
            state = self
                .terminated
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        state.shut_down = true;
        let remaining = self.guilds.len();
        self.guilds.clear();
        info!(remaining, "guild registry shut down");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for GuildRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildRegistry")
            .field("live", &self.guilds.len())
            .field("retired", &self.retired.len())
            .field("main", &self.main.get().map(|g| g.id()))
            .finish()
    }
}
