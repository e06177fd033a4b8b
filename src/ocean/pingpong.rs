//! Two-slot resource pair whose read/write roles alternate every step.

/// Slot index used as the read source at `step`
pub fn parity(step: u64) -> usize {
    (step % 2) as usize
}

/// Pair of interchangeable resources
///
/// Roles are a pure function of a step counter: step `s` reads slot
/// `s % 2` and writes the other one, so the pair itself never mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong<T> {
    slots: [T; 2],
}

impl<T: Copy> PingPong<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
        }
    }

    /// Resource read at `step`
    pub fn source(&self, step: u64) -> T {
        self.slots[parity(step)]
    }

    /// Resource written at `step`
    pub fn target(&self, step: u64) -> T {
        self.slots[parity(step + 1)]
    }

    /// Resource holding the valid data after `steps` completed steps
    pub fn resolved(&self, steps: u64) -> T {
        self.source(steps)
    }

    pub fn slots(&self) -> [T; 2] {
        self.slots
    }
}
