//! Resource-state declarations and hazard checks shared by all backends.

use std::collections::HashMap;

use log::trace;

use super::{Access, Dispatch, ResourceState, TextureHandle};
use crate::error::BackendError;

/// Tracks the declared state of every texture in recording order
#[derive(Debug, Default)]
pub struct StateTracker {
    states: HashMap<TextureHandle, ResourceState>,
    transitions: u64,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration; returns the previous state
    pub fn declare(&mut self, handle: TextureHandle, state: ResourceState) -> ResourceState {
        let previous = self.states.insert(handle, state).unwrap_or_default();
        if previous != state {
            self.transitions += 1;
            trace!("{:?}: {:?} -> {:?}", handle, previous, state);
        }
        previous
    }

    pub fn state(&self, handle: TextureHandle) -> ResourceState {
        self.states.get(&handle).copied().unwrap_or_default()
    }

    pub fn forget(&mut self, handle: TextureHandle) {
        self.states.remove(&handle);
    }

    /// Number of state changes declared so far (each one is a barrier)
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Every read binding must be declared readable, every write binding
    /// writable, and no texture may be both source and destination.
    pub fn check(&self, dispatch: &Dispatch<'_>) -> Result<(), BackendError> {
        let kernel = dispatch.kernel;
        for (i, a) in dispatch.bindings.iter().enumerate() {
            let aliased = dispatch.bindings[i + 1..]
                .iter()
                .any(|b| b.texture == a.texture && b.access != a.access);
            if aliased {
                return Err(BackendError::Hazard {
                    kernel,
                    handle: a.texture,
                });
            }
        }

        for binding in dispatch.bindings {
            let required = match binding.access {
                Access::Read => ResourceState::ShaderRead,
                Access::Write => ResourceState::ShaderWrite,
            };
            if self.state(binding.texture) != required {
                return Err(BackendError::UndeclaredAccess {
                    kernel,
                    handle: binding.texture,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Binding, FftParams, Kernel, ParamBlock};
    use bytemuck::Zeroable;

    fn fft_dispatch(bindings: &[Binding]) -> Dispatch<'_> {
        Dispatch {
            kernel: Kernel::FftHorizontal,
            bindings,
            params: ParamBlock::Fft(FftParams::zeroed()),
        }
    }

    #[test]
    fn test_undeclared_read_is_rejected() {
        let mut tracker = StateTracker::new();
        let (a, b) = (TextureHandle(0), TextureHandle(1));
        tracker.declare(b, ResourceState::ShaderWrite);

        let bindings = [Binding::read(a), Binding::write(b)];
        assert!(matches!(
            tracker.check(&fft_dispatch(&bindings)),
            Err(BackendError::UndeclaredAccess { handle, .. }) if handle == a
        ));

        tracker.declare(a, ResourceState::ShaderRead);
        assert!(tracker.check(&fft_dispatch(&bindings)).is_ok());
        assert_eq!(tracker.transition_count(), 2);
    }

    #[test]
    fn test_in_place_binding_is_a_hazard() {
        let mut tracker = StateTracker::new();
        let a = TextureHandle(0);
        tracker.declare(a, ResourceState::ShaderRead);

        let bindings = [Binding::read(a), Binding::write(a)];
        assert!(matches!(
            tracker.check(&fft_dispatch(&bindings)),
            Err(BackendError::Hazard { .. })
        ));
    }

    #[test]
    fn test_redeclaring_same_state_is_not_a_transition() {
        let mut tracker = StateTracker::new();
        let a = TextureHandle(3);
        tracker.declare(a, ResourceState::ShaderRead);
        tracker.declare(a, ResourceState::ShaderRead);
        assert_eq!(tracker.transition_count(), 1);
        assert_eq!(
            tracker.declare(a, ResourceState::ShaderWrite),
            ResourceState::ShaderRead
        );
    }
}
