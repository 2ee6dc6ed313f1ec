use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Exchange identifier.
///
/// High 32 bits: id of the process that created it. Low 32 bits: a counter
/// owned by that process's [`IdGenerator`]. Two processes on one host never
/// hand out the same id while both are alive.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u64);

impl Id {
    /// Wrap a raw 64-bit value, e.g. one read off the wire.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Build an id from its two halves.
    pub const fn from_parts(process_id: u32, counter: u32) -> Self {
        Self(((process_id as u64) << 32) | counter as u64)
    }

    /// The raw 64-bit value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Id of the process that created this id.
    pub const fn process_id(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Per-process counter component.
    pub const fn counter(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({}:{})", self.process_id(), self.counter())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<Id> for u64 {
    fn from(id: Id) -> Self {
        id.0
    }
}

/// Hands out [`Id`]s for one process.
///
/// The counter starts at a random value so that ids from a restarted process
/// (which may reuse its pid) are unlikely to collide with stale ones. Share
/// one generator, behind an `Arc`, between every engine in a process.
#[derive(Debug)]
pub struct IdGenerator {
    process_id: u32,
    counter: AtomicU32,
}

impl IdGenerator {
    /// Generator for the current process with a random counter seed.
    pub fn new() -> Self {
        Self::with_seed(std::process::id(), rand::random::<u32>())
    }

    /// Generator with an explicit process id and counter seed.
    pub fn with_seed(process_id: u32, seed: u32) -> Self {
        Self {
            process_id,
            counter: AtomicU32::new(seed),
        }
    }

    /// Next id. The counter wraps within 32 bits.
    pub fn next_id(&self) -> Id {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        Id::from_parts(self.process_id, counter)
    }

    /// Restart the counter at `seed`. Intended for tests.
    pub fn reset(&self, seed: u32) {
        self.counter.store(seed, Ordering::Relaxed);
    }

    /// Process id embedded in generated ids.
    pub fn process_id(&self) -> u32 {
        self.process_id
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
