//! The guild record: identity, status and the exit mailbox

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{GuildError, Result};
use crate::transfer::TransferPlan;
use crate::value::{GuildId, Value};

/// Lifecycle of a guild. The two exited states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuildStatus {
    /// Body has not finished
    Running,
    /// Body returned a value
    ExitedOk,
    /// Body failed
    ExitedErr,
}

impl GuildStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        !matches!(self, GuildStatus::Running)
    }
}

impl fmt::Display for GuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuildStatus::Running => "running",
            GuildStatus::ExitedOk => "exited_ok",
            GuildStatus::ExitedErr => "exited_err",
        };
        f.write_str(s)
    }
}

/// Final outcome held until a joiner takes it.
pub(crate) type Outcome = std::result::Result<Value, Value>;

/// An outcome together with the objects sealed for the joiner.
///
/// The plan was validated and collected when the guild exited; delivering
/// it only re-tags that fixed set.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub(crate) outcome: Outcome,
    pub(crate) plan: TransferPlan,
}

#[derive(Debug)]
struct Mailbox {
    status: GuildStatus,
    delivery: Option<Delivery>,
    delivered: bool,
}

/// An isolated unit of parallel execution.
///
/// Guilds are created by [`crate::GuildRegistry`] and handed around as
/// `Arc<Guild>`; a `Value::Guild` is always shareable.
pub struct Guild {
    id: GuildId,
    name: Option<String>,
    is_main: bool,
    started: AtomicBool,
    mailbox: Mutex<Mailbox>,
    exited: Condvar,
}

impl Guild {
    pub(crate) fn new(id: GuildId, name: Option<String>, is_main: bool) -> Self {
        Self {
            id,
            name,
            is_main,
            started: AtomicBool::new(is_main),
            mailbox: Mutex::new(Mailbox {
                status: GuildStatus::Running,
                delivery: None,
                delivered: false,
            }),
            exited: Condvar::new(),
        }
    }

    /// The guild's id; never `0`.
    pub fn id(&self) -> GuildId {
        self.id
    }

    /// Optional name given at spawn.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this is the main guild.
    pub fn is_main(&self) -> bool {
        self.is_main
    }

    /// Whether a thread was ever started for this guild.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Current status.
    pub fn status(&self) -> GuildStatus {
        self.lock().status
    }

    /// Whether the outcome has been handed to a joiner.
    pub fn is_delivered(&self) -> bool {
        self.lock().delivered
    }

    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enter a terminal state with its outcome. Fails if already terminal.
    pub(crate) fn terminate(&self, status: GuildStatus, delivery: Delivery) -> Result<()> {
        debug_assert!(status.is_terminal());
        let mut mailbox = self.lock();
        if mailbox.status.is_terminal() {
            return Err(GuildError::AlreadyTerminated {
                id: self.id.get(),
                status: mailbox.status,
            });
        }
        mailbox.status = status;
        mailbox.delivery = Some(delivery);
        drop(mailbox);
        self.exited.notify_all();
        Ok(())
    }

    /// Fail with `AlreadyTerminated` if the guild has exited.
    pub(crate) fn ensure_running(&self) -> Result<()> {
        let mailbox = self.lock();
        if mailbox.status.is_terminal() {
            return Err(GuildError::AlreadyTerminated {
                id: self.id.get(),
                status: mailbox.status,
            });
        }
        Ok(())
    }

    /// Block until terminal, then take the outcome.
    ///
    /// Exactly one caller receives it; everyone after sees `Closed`.
    pub(crate) fn take_outcome(&self) -> Result<Delivery> {
        let mut mailbox = self.lock();
        while !mailbox.status.is_terminal() {
            mailbox = self
                .exited
                .wait(mailbox)
                .unwrap_or_else(|e| e.into_inner());
        }
        self.take_from(&mut mailbox)
    }

    /// Take the outcome if the guild has terminated, `None` while running.
    pub(crate) fn try_take_outcome(&self) -> Result<Option<Delivery>> {
        let mut mailbox = self.lock();
        if !mailbox.status.is_terminal() {
            return Ok(None);
        }
        self.take_from(&mut mailbox).map(Some)
    }

    fn take_from(&self, mailbox: &mut Mailbox) -> Result<Delivery> {
        match mailbox.delivery.take() {
            Some(delivery) => {
                mailbox.delivered = true;
                Ok(delivery)
            }
            None => Err(GuildError::Closed { id: self.id.get() }),
        }
    }
}

impl fmt::Debug for Guild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guild")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_main", &self.is_main)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild(n: u32) -> Guild {
        Guild::new(GuildId::new(n).unwrap(), None, false)
    }

    fn outcome(g: &Guild, outcome: Outcome) -> Delivery {
        Delivery {
            outcome,
            plan: TransferPlan::prepare(g.id(), g.id(), &[]).unwrap(),
        }
    }

    #[test]
    fn test_new_guild_is_running() {
        let g = guild(2);
        assert_eq!(g.status(), GuildStatus::Running);
        assert!(!g.status().is_terminal());
        assert!(g.ensure_running().is_ok());
    }

    #[test]
    fn test_terminal_state_is_entered_once() {
        let g = guild(2);
        g.terminate(GuildStatus::ExitedOk, outcome(&g, Ok(Value::Int(1))))
            .unwrap();
        let err = g
            .terminate(GuildStatus::ExitedErr, outcome(&g, Err(Value::Nil)))
            .unwrap_err();
        assert!(matches!(
            err,
            GuildError::AlreadyTerminated {
                id: 2,
                status: GuildStatus::ExitedOk
            }
        ));
        assert_eq!(g.status(), GuildStatus::ExitedOk);
    }

    #[test]
    fn test_outcome_taken_once() {
        let g = guild(3);
        assert!(matches!(g.try_take_outcome(), Ok(None)));
        g.terminate(GuildStatus::ExitedOk, outcome(&g, Ok(Value::Int(7))))
            .unwrap();
        assert_eq!(g.take_outcome().unwrap().outcome, Ok(Value::Int(7)));
        assert!(g.is_delivered());
        assert!(matches!(g.take_outcome(), Err(GuildError::Closed { id: 3 })));
        assert!(matches!(
            g.try_take_outcome(),
            Err(GuildError::Closed { id: 3 })
        ));
    }

    #[test]
    fn test_only_main_starts_marked() {
        let main = Guild::new(GuildId::new(1).unwrap(), None, true);
        let g = guild(2);
        assert!(main.is_started());
        assert!(!g.is_started());
        g.mark_started();
        assert!(g.is_started());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(GuildStatus::ExitedErr.to_string(), "exited_err");
    }
}
