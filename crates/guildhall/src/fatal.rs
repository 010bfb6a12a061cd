//! Unrecoverable faults
//!
//! A broken ownership invariant means some earlier write already went
//! through the wrong guild. There is nothing safe to resume, so these
//! functions never return and never unwind.

use crate::belonging::OwnershipViolation;

/// Report an ownership violation and abort the process.
#[cold]
#[inline(never)]
pub fn ownership_violation(violation: &OwnershipViolation) -> ! {
    tracing::error!(
        object = %violation.object,
        stored_owner = violation.stored_owner,
        current_guild = violation.current.get(),
        owner_exited = violation.owner_exited,
        "ownership violation"
    );
    eprintln!("[BUG] confirm_belonging: {}", violation);
    std::process::abort()
}
