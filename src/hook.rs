//! Callbacks fired on local breaker events.

use crate::state::{State, Transition};
use parking_lot::RwLock;
use std::sync::Arc;

type HookFn = Arc<dyn Fn() + Send + Sync + 'static>;
type TransitionHookFn = Arc<dyn Fn(Transition) + Send + Sync + 'static>;

/// A registry for local breaker event hooks.
///
/// Hooks run on the calling thread after the breaker's lock has been
/// released, so a hook may safely read the breaker state.
pub struct HookRegistry {
    on_transition: RwLock<Option<TransitionHookFn>>,
    on_open: RwLock<Option<HookFn>>,
    on_close: RwLock<Option<HookFn>>,
    on_half_open: RwLock<Option<HookFn>>,
    on_refused: RwLock<Option<HookFn>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_transition: RwLock::new(None),
            on_open: RwLock::new(None),
            on_close: RwLock::new(None),
            on_half_open: RwLock::new(None),
            on_refused: RwLock::new(None),
        }
    }

    /// Sets the hook called for every state change, with both ends of it.
    pub fn set_on_transition<F>(&self, f: F)
    where
        F: Fn(Transition) + Send + Sync + 'static,
    {
        *self.on_transition.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the breaker trips open.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the breaker closes.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_close.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the breaker starts admitting probes.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_half_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when `allow()` refuses a call.
    pub fn set_on_refused<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_refused.write() = Some(Arc::new(f));
    }

    pub(crate) fn execute_transition_hooks(&self, transition: Transition) {
        // Clone out of the lock so a hook can re-register hooks.
        let generic = self.on_transition.read().clone();
        if let Some(hook) = generic {
            hook(transition);
        }

        let specific = match transition.to {
            State::Open => self.on_open.read().clone(),
            State::Closed => self.on_close.read().clone(),
            State::HalfOpen => self.on_half_open.read().clone(),
        };
        if let Some(hook) = specific {
            hook();
        }
    }

    pub(crate) fn execute_refused_hook(&self) {
        let hook = self.on_refused.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}
