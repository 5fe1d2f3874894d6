//! Key-binding registry for an input listener.
//!
//! The listener runs on its own thread and calls [`KeyBindings::dispatch`]
//! for every key it reads. Built-in actions only write the scheduler's
//! control flags through a [`ControlHandle`]; custom actions run on the
//! listener's thread.

use std::collections::BTreeMap;
use std::fmt;

use crate::control::ControlHandle;

/// What a key does.
pub enum KeyAction {
    /// Pause the scheduler.
    Pause,
    /// Resume the scheduler.
    Resume,
    /// Flip between paused and running.
    TogglePause,
    /// Stop the scheduler.
    Shutdown,
    /// Run a caller-supplied callback.
    Custom(Box<dyn Fn() + Send + Sync>),
}

impl KeyAction {
    /// Wrap a callback.
    pub fn custom(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self::Custom(Box::new(callback))
    }
}

impl fmt::Debug for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pause => f.write_str("Pause"),
            Self::Resume => f.write_str("Resume"),
            Self::TogglePause => f.write_str("TogglePause"),
            Self::Shutdown => f.write_str("Shutdown"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Map from key name to action.
#[derive(Debug)]
pub struct KeyBindings {
    handle: ControlHandle,
    bindings: BTreeMap<String, KeyAction>,
}

impl KeyBindings {
    /// Empty registry acting on `handle`.
    #[must_use]
    pub const fn new(handle: ControlHandle) -> Self {
        Self {
            handle,
            bindings: BTreeMap::new(),
        }
    }

    /// `p` pauses, `r` resumes, `space` toggles, `q` quits.
    #[must_use]
    pub fn with_defaults(handle: ControlHandle) -> Self {
        let mut keys = Self::new(handle);
        keys.bind("p", KeyAction::Pause);
        keys.bind("r", KeyAction::Resume);
        keys.bind("space", KeyAction::TogglePause);
        keys.bind("q", KeyAction::Shutdown);
        keys
    }

    /// Bind `key`, returning the action it replaced.
    pub fn bind(&mut self, key: impl Into<String>, action: KeyAction) -> Option<KeyAction> {
        self.bindings.insert(key.into(), action)
    }

    /// Remove the binding for `key`.
    pub fn unbind(&mut self, key: &str) -> Option<KeyAction> {
        self.bindings.remove(key)
    }

    /// Run the action bound to `key`. Returns `false` for unbound keys.
    pub fn dispatch(&self, key: &str) -> bool {
        let Some(action) = self.bindings.get(key) else {
            tracing::trace!(key, "unbound key");
            return false;
        };
        tracing::debug!(key, ?action, "key pressed");
        match action {
            KeyAction::Pause => self.handle.pause(),
            KeyAction::Resume => self.handle.resume(),
            KeyAction::TogglePause => self.handle.toggle_pause(),
            KeyAction::Shutdown => self.handle.shutdown(),
            KeyAction::Custom(callback) => callback(),
        }
        true
    }

    /// Bound keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}
