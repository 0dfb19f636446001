//! Tick-ordered event scheduling.
//!
//! All simulated concurrency goes through here: the CPU drives the master
//! clock forward one bus cycle at a time, and every time-driven component
//! (floppy controller phases, video sync) parks its next action in an
//! [`EventQueue`] keyed by absolute tick. The machine drains due events in
//! tick order before completing each bus cycle.
//!
//! Events carry a plain `Copy` kind token rather than a closure so that a
//! pending queue can be captured in a snapshot as `(tick-delta, kind)`
//! pairs and rebuilt bit-exactly on restore.

use std::collections::{BTreeMap, HashMap};

/// A count of master clock ticks. The fundamental unit of emulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::ops::Add for Ticks {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl core::ops::AddAssign for Ticks {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl core::ops::Sub for Ticks {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

/// Handle for cancelling a scheduled event. Unique per queue for the
/// lifetime of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

/// Ordered queue of pending timed events.
///
/// Invariants:
/// - events fire in non-decreasing tick order;
/// - ties fire first-scheduled-first (timing-sensitive software can observe
///   the drain order, so the tie-break is part of the contract);
/// - an event is removed from the queue before its kind is handed to the
///   caller, so a handler may freely reschedule itself.
pub struct EventQueue<K> {
    // (tick, seq) keys give BTreeMap ordering the stable tie-break for free.
    queue: BTreeMap<(u64, u64), (EventId, K)>,
    index: HashMap<EventId, (u64, u64)>,
    next_seq: u64,
    next_id: u64,
}

impl<K: Copy> EventQueue<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
            next_id: 0,
        }
    }

    /// Insert an event to fire at absolute tick `at`. Scheduling into the
    /// past is legal; the event fires on the next drain.
    pub fn schedule(&mut self, at: Ticks, kind: K) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        let key = (at.get(), self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, (id, kind));
        self.index.insert(id, key);
        id
    }

    /// Remove a pending event. Idempotent: cancelling an event that has
    /// already fired (or was never scheduled on this queue) is a no-op.
    pub fn cancel(&mut self, id: EventId) {
        if let Some(key) = self.index.remove(&id) {
            self.queue.remove(&key);
        }
    }

    /// Absolute tick of the earliest pending event, if any.
    #[must_use]
    pub fn next_at(&self) -> Option<Ticks> {
        self.queue.keys().next().map(|&(t, _)| Ticks(t))
    }

    /// Remove and return the earliest event due at or before `now`.
    /// Callers drain with `while let Some(..) = q.pop_due(now)`, dispatching
    /// each kind; a dispatched handler may schedule new events, including
    /// ones due immediately.
    pub fn pop_due(&mut self, now: Ticks) -> Option<(Ticks, K)> {
        let &key = self.queue.keys().next()?;
        if key.0 > now.get() {
            return None;
        }
        let (id, kind) = self.queue.remove(&key)?;
        self.index.remove(&id);
        Some((Ticks(key.0), kind))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.index.clear();
    }

    /// Pending events as (delta-from-now, kind) pairs in firing order, for
    /// snapshotting. Events already due report a delta of zero.
    #[must_use]
    pub fn pending_deltas(&self, now: Ticks) -> Vec<(u64, K)> {
        self.queue
            .iter()
            .map(|(&(t, _), &(_, kind))| (t.saturating_sub(now.get()), kind))
            .collect()
    }

    /// Rebuild the queue from snapshot deltas. Replaces all pending events;
    /// insertion order of `deltas` becomes the tie-break order, matching the
    /// order `pending_deltas` emitted them in.
    pub fn restore_deltas(&mut self, now: Ticks, deltas: &[(u64, K)]) {
        self.clear();
        for &(delta, kind) in deltas {
            self.schedule(Ticks(now.get() + delta), kind);
        }
    }
}

impl<K: Copy> Default for EventQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
