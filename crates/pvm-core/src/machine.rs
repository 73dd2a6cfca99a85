//! Pure decision logic, isolated from IO.

use crate::core::{Command, Event};

/// A `Machine` holds whatever small bit of decision state it needs
/// (typically nothing — the real state lives in Postgres and is consulted
/// by the effect that runs the resulting command) and makes a pure
/// decision per event. No IO, no async: a `Machine` is trivially unit
/// testable by constructing an event and asserting on the returned
/// command.
pub trait Machine: Send + Sync {
    type Event: Event;
    type Command: Command;

    /// Decide what, if anything, should happen in response to `event`.
    /// Returning `None` means the event carries no actionable intent for
    /// this machine — not an error.
    fn decide(&mut self, event: &Self::Event) -> Option<Self::Command>;
}
