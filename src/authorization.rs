//! Authorization state machine.
//!
//! Location permission is owned by the operating system. The engine only
//! mirrors it: transitions come exclusively from OS callbacks and each one
//! maps to a fixed effect on monitoring.

use std::fmt;

use serde::{Deserialize, Serialize};

/// OS-granted location permission tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    /// The user has not been asked yet.
    #[default]
    Undetermined,
    /// Foreground only; background region delivery is unavailable.
    WhileInUse,
    /// Background monitoring permitted.
    Always,
    /// The user refused.
    Denied,
    /// Blocked by device policy.
    Restricted,
}

impl AuthorizationState {
    /// Returns true if regions may be registered in this state.
    #[must_use]
    pub const fn permits_monitoring(self) -> bool {
        matches!(self, Self::Always)
    }

    /// Returns true if only a settings change can restore monitoring.
    #[must_use]
    pub const fn is_blocked(self) -> bool {
        matches!(self, Self::Denied | Self::Restricted)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undetermined => "undetermined",
            Self::WhileInUse => "while_in_use",
            Self::Always => "always",
            Self::Denied => "denied",
            Self::Restricted => "restricted",
        }
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the engine must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationEffect {
    /// Resync monitoring for all active reminders.
    Resume,
    /// Resync (suppressing regions) and warn that background delivery is
    /// unavailable. Recoverable; reminders stay untouched.
    WarnForegroundOnly,
    /// Resync with an empty desired set and ask the user to open settings.
    SuppressAndPrompt,
    /// Not asked yet: keep monitoring suppressed without prompting.
    AwaitDecision,
}

/// Result of feeding one OS callback into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationTransition {
    pub previous: AuthorizationState,
    pub current: AuthorizationState,
    pub effect: AuthorizationEffect,
}

impl AuthorizationTransition {
    /// Returns true if the state actually changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Tracks the current authorization value.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationMachine {
    state: AuthorizationState,
}

impl AuthorizationMachine {
    /// Starts in `Undetermined`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current permission level.
    #[must_use]
    pub const fn state(&self) -> AuthorizationState {
        self.state
    }

    /// Applies an OS callback.
    ///
    /// Repeating the current state is allowed and yields a transition with
    /// `changed() == false`; callers still resync so the registered set is
    /// re-confirmed.
    pub fn apply(&mut self, next: AuthorizationState) -> AuthorizationTransition {
        let previous = self.state;
        self.state = next;
        AuthorizationTransition {
            previous,
            current: next,
            effect: effect_of(next),
        }
    }
}

const fn effect_of(state: AuthorizationState) -> AuthorizationEffect {
    match state {
        AuthorizationState::Always => AuthorizationEffect::Resume,
        AuthorizationState::WhileInUse => AuthorizationEffect::WarnForegroundOnly,
        AuthorizationState::Denied | AuthorizationState::Restricted => AuthorizationEffect::SuppressAndPrompt,
        AuthorizationState::Undetermined => AuthorizationEffect::AwaitDecision,
    }
}
