//! The object header word and the ownership encoding stored in it.
//!
//! One 64-bit word per heap object:
//!
//! ```text
//!  63                    32 31                     0
//! +------------------------+------------------------+
//! |      owner id (u32)    |    allocator flags     |
//! +------------------------+------------------------+
//! ```
//!
//! The flags half belongs to the allocator. The owner half belongs to the
//! belonging tagger and is the only part [`Header::store_owner`] touches.
//! An owner id of `0` means "no owner"; it is never handed to a guild.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

/// Mask selecting the allocator flags subfield.
pub const FLAGS_MASK: u64 = 0xffff_ffff;

/// Shift of the owner-id subfield.
pub const OWNER_SHIFT: u32 = 32;

/// Object may no longer be mutated.
pub const FL_FROZEN: u32 = 1 << 11;

/// Object was verified deeply immutable. Never cleared once set.
pub const FL_SHAREABLE: u32 = 1 << 12;

/// Identity of a live guild. `0` is reserved and unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuildId(NonZeroU32);

impl GuildId {
    /// Wrap a raw id; `None` for the reserved `0`.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// The raw 32-bit id as stored in object headers.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Effective owner of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Readable from every guild, mutable by none
    Shared,
    /// Mutable only from the named guild
    Owned(GuildId),
}

impl Owner {
    /// Decode the header representation (`0` is shared).
    pub fn from_raw(raw: u32) -> Self {
        match GuildId::new(raw) {
            Some(id) => Owner::Owned(id),
            None => Owner::Shared,
        }
    }

    /// Encode for the header.
    pub fn to_raw(self) -> u32 {
        match self {
            Owner::Shared => 0,
            Owner::Owned(id) => id.get(),
        }
    }
}

/// The header word of a heap object.
pub struct Header {
    word: AtomicU64,
}

impl Header {
    /// A header with the given flags and owner subfields.
    pub fn new(flags: u32, owner: u32) -> Self {
        Self {
            word: AtomicU64::new(pack(flags, owner)),
        }
    }

    /// Rebuild a header from a raw word produced by [`Header::raw`].
    pub fn from_raw(word: u64) -> Self {
        Self {
            word: AtomicU64::new(word),
        }
    }

    /// The whole word, bit for bit.
    pub fn raw(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    /// The allocator flags subfield.
    pub fn flags(&self) -> u32 {
        (self.raw() & FLAGS_MASK) as u32
    }

    /// Whether every bit of `flag` is set.
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags() & flag == flag
    }

    /// Set flag bits. The owner subfield is untouched.
    pub fn set_flags(&self, flag: u32) {
        self.word.fetch_or(u64::from(flag), Ordering::AcqRel);
    }

    /// The raw stored owner subfield, stale or not.
    pub fn stored_owner(&self) -> u32 {
        (self.raw() >> OWNER_SHIFT) as u32
    }

    /// Overwrite the owner subfield, preserving every flag bit.
    pub fn store_owner(&self, owner: u32) {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            let next = (current & FLAGS_MASK) | (u64::from(owner) << OWNER_SHIFT);
            match self.word.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

fn pack(flags: u32, owner: u32) -> u64 {
    u64::from(flags) | (u64::from(owner) << OWNER_SHIFT)
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("flags", &format_args!("{:#010x}", self.flags()))
            .field("owner", &self.stored_owner())
            .finish()
    }
}
