//! Collaborator notification hooks.

use core::fmt;

use heapless::Vec;

/// Edge notifications delivered to other subsystems, in firing order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChipsetHook {
    /// Before the first rail goes up.
    PreInit,
    /// S3 rails are up and the AP is out of reset.
    Startup,
    /// S0 reached.
    Resume,
    /// Leaving S0.
    Suspend,
    /// Leaving S3, before rails drop.
    Shutdown,
    /// Rails confirmed off.
    ShutdownComplete,
    /// G3 reached.
    HardOff,
}

impl ChipsetHook {
    pub const ALL: [ChipsetHook; 7] = [
        ChipsetHook::PreInit,
        ChipsetHook::Startup,
        ChipsetHook::Resume,
        ChipsetHook::Suspend,
        ChipsetHook::Shutdown,
        ChipsetHook::ShutdownComplete,
        ChipsetHook::HardOff,
    ];

    pub const fn as_index(self) -> usize {
        match self {
            ChipsetHook::PreInit => 0,
            ChipsetHook::Startup => 1,
            ChipsetHook::Resume => 2,
            ChipsetHook::Suspend => 3,
            ChipsetHook::Shutdown => 4,
            ChipsetHook::ShutdownComplete => 5,
            ChipsetHook::HardOff => 6,
        }
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::ALL.len() {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Hooks after which the power-button pulse setting reverts to enabled.
    #[must_use]
    pub const fn resets_button_pulse(self) -> bool {
        matches!(
            self,
            ChipsetHook::Startup
                | ChipsetHook::Resume
                | ChipsetHook::Suspend
                | ChipsetHook::Shutdown
        )
    }
}

impl fmt::Display for ChipsetHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChipsetHook::PreInit => "pre-init",
            ChipsetHook::Startup => "startup",
            ChipsetHook::Resume => "resume",
            ChipsetHook::Suspend => "suspend",
            ChipsetHook::Shutdown => "shutdown",
            ChipsetHook::ShutdownComplete => "shutdown-complete",
            ChipsetHook::HardOff => "hard-off",
        };
        f.write_str(label)
    }
}

/// Zero-argument listener.
pub type HookFn = fn();

/// The listener table is full.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegistryFull;

impl fmt::Display for RegistryFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("hook registry full")
    }
}

/// Fixed-capacity listener table; listeners run in registration order.
pub struct HookRegistry<const N: usize> {
    listeners: Vec<(ChipsetHook, HookFn), N>,
}

impl<const N: usize> HookRegistry<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers `listener` for `hook`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryFull`] when all `N` slots are taken.
    pub fn register(&mut self, hook: ChipsetHook, listener: HookFn) -> Result<(), RegistryFull> {
        self.listeners
            .push((hook, listener))
            .map_err(|_| RegistryFull)
    }

    /// Calls every listener registered for `hook`. Returns how many ran.
    pub fn notify(&self, hook: ChipsetHook) -> usize {
        let mut ran = 0;
        for (registered, listener) in &self.listeners {
            if *registered == hook {
                listener();
                ran += 1;
            }
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<const N: usize> Default for HookRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn count() {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn notifies_only_matching_listeners() {
        let mut registry = HookRegistry::<3>::new();
        registry.register(ChipsetHook::Resume, count).expect("slot");
        registry.register(ChipsetHook::Resume, count).expect("slot");
        registry.register(ChipsetHook::Suspend, count).expect("slot");
        assert_eq!(registry.register(ChipsetHook::HardOff, count), Err(RegistryFull));

        let before = CALLS.load(Ordering::SeqCst);
        assert_eq!(registry.notify(ChipsetHook::Resume), 2);
        assert_eq!(CALLS.load(Ordering::SeqCst), before + 2);
        assert_eq!(registry.notify(ChipsetHook::Startup), 0);
    }

    #[test]
    fn index_round_trip() {
        for hook in ChipsetHook::ALL {
            assert_eq!(ChipsetHook::from_index(hook.as_index()), Some(hook));
        }
        assert_eq!(ChipsetHook::from_index(7), None);
    }
}
