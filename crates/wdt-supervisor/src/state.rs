//! Supervisor state: client liveness slots and the hardware record.
//!
//! Client slots are written from interrupt context, so each one is a single
//! packed atomic. The footprint (tick of the last liveness assertion) lives in
//! the high 32 bits and the allowed gap in the low 32 bits. An allowed gap of
//! zero marks the slot inactive, so every tick value, including 0, is a valid
//! footprint.

use portable_atomic::{AtomicU64, Ordering};

use crate::clock::Tick;

/// Decoded state of one client slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Not monitored.
    #[default]
    Inactive,
    /// Monitored.
    Active {
        /// Tick of the last liveness assertion.
        footprint: Tick,
        /// Largest allowed gap in ticks.
        hp_max: Tick,
    },
}

impl SlotState {
    /// Convert from the packed representation.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        #[expect(clippy::cast_possible_truncation, reason = "splitting the packed pair")]
        let (footprint, hp_max) = ((raw >> 32) as Tick, raw as Tick);
        if hp_max == 0 {
            Self::Inactive
        } else {
            Self::Active { footprint, hp_max }
        }
    }

    /// Convert to the packed representation.
    #[must_use]
    pub fn to_raw(self) -> u64 {
        match self {
            Self::Inactive => 0,
            Self::Active { footprint, hp_max } => (u64::from(footprint) << 32) | u64::from(hp_max),
        }
    }

    /// Check if the slot is monitored.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Ticks elapsed since the footprint when the slot is starved at `now`.
    ///
    /// A footprint that lies ahead of `now` (written after `now` was sampled)
    /// shows up as an elapsed value above `i32::MAX` and is treated as fresh.
    /// Exactly `hp_max` ticks is not starved.
    #[must_use]
    pub fn starved_for(self, now: Tick) -> Option<Tick> {
        let Self::Active { footprint, hp_max } = self else {
            return None;
        };
        let elapsed = now.wrapping_sub(footprint);
        if elapsed > i32::MAX.unsigned_abs() {
            return None;
        }
        (elapsed > hp_max).then_some(elapsed)
    }
}

/// One client liveness record.
#[derive(Debug, Default)]
pub struct ClientSlot {
    packed: AtomicU64,
}

impl ClientSlot {
    /// Create an inactive slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            packed: AtomicU64::new(0),
        }
    }

    /// Current state.
    #[must_use]
    pub fn load(&self) -> SlotState {
        SlotState::from_raw(self.packed.load(Ordering::Acquire))
    }

    /// Assert liveness at `now` with a gap of `hp_max`, or deactivate when
    /// `hp_max` is zero. Footprint and gap are published in one store.
    pub fn feed(&self, now: Tick, hp_max: Tick) {
        let state = if hp_max == 0 {
            SlotState::Inactive
        } else {
            SlotState::Active {
                footprint: now,
                hp_max,
            }
        };
        self.packed.store(state.to_raw(), Ordering::Release);
    }

    /// Stop monitoring.
    pub fn clear(&self) {
        self.packed.store(0, Ordering::Release);
    }
}

/// Fixed-size table of client slots. The index is the client id.
#[derive(Debug)]
pub struct ClientTable {
    slots: Box<[ClientSlot]>,
}

impl ClientTable {
    /// Create a table with `count` inactive slots.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| ClientSlot::new()).collect(),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the table has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot for `id`, or `None` when out of range.
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&ClientSlot> {
        self.slots.get(id)
    }

    /// Iterate slots in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ClientSlot> {
        self.slots.iter()
    }

    /// Deactivate every slot.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.clear();
        }
    }
}

/// Hardware side of the supervisor record, guarded by the supervisor lock.
#[derive(Debug)]
pub(crate) struct HardwareState<H> {
    /// Open device session; `None` means inactive.
    pub(crate) handle: Option<H>,
    /// Effective timeout actually configured.
    pub(crate) starve_ms: u32,
    /// Set by the first `start` call.
    pub(crate) started: bool,
}

impl<H> HardwareState<H> {
    pub(crate) const fn new() -> Self {
        Self {
            handle: None,
            starve_ms: 0,
            started: false,
        }
    }
}
