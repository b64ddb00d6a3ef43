//! Status sync controller: turns classified call states into Slack pushes.
//!
//! Conservative rules avoid clobbering the user's own status:
//!
//! | last       | incoming  | action                          |
//! |------------|-----------|---------------------------------|
//! | any        | Unknown   | none                            |
//! | not InCall | InCall    | set status, last = InCall       |
//! | InCall     | NotInCall | clear status, last = NotInCall  |
//! | X          | X         | none                            |
//!
//! The controller is owned by the observer thread and sees one event at a
//! time, so `SyncState` needs no locking.

use crate::settings::ProfileSource;
use crate::slack::PresenceClient;
use crate::types::CallState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncState {
    pub last_call_state: CallState,
    pub has_credential: bool,
}

/// What the controller decided for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Status set was dispatched.
    SetStatus,
    /// Status clear was dispatched.
    ClearStatus,
    /// Nothing to do (unknown, repeated, or no remote change needed).
    NoOp,
    /// A transition was due but no credential was available.
    Dropped,
}

enum Transition {
    Set,
    Clear,
    Settle(CallState),
    Ignore,
}

fn transition(last: CallState, incoming: CallState) -> Transition {
    match (last, incoming) {
        (_, CallState::Unknown) => Transition::Ignore,
        (CallState::InCall, CallState::InCall) => Transition::Ignore,
        (_, CallState::InCall) => Transition::Set,
        (CallState::InCall, CallState::NotInCall) => Transition::Clear,
        (_, CallState::NotInCall) => Transition::Settle(CallState::NotInCall),
    }
}

pub struct SyncController<C, P> {
    client: C,
    profiles: P,
    state: SyncState,
}

impl<C: PresenceClient, P: ProfileSource> SyncController<C, P> {
    pub fn new(client: C, profiles: P) -> Self {
        Self {
            client,
            profiles,
            state: SyncState::default(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Feeds one classified event through the state machine.
    ///
    /// A transition dropped for lack of a credential leaves
    /// `last_call_state` where it was, so signing in mid-call lets the next
    /// in-call event set the status, and a clear is never sent for a status
    /// that was never set.
    pub fn on_event(&mut self, incoming: CallState) -> SyncAction {
        self.state.has_credential = self.client.has_token();
        let last = self.state.last_call_state;

        let action = match transition(last, incoming) {
            Transition::Ignore => SyncAction::NoOp,
            Transition::Settle(state) => {
                self.state.last_call_state = state;
                SyncAction::NoOp
            }
            Transition::Set | Transition::Clear if !self.state.has_credential => {
                tracing::info!(
                    from = %last,
                    to = %incoming,
                    "Not signed in to Slack; skipping status update"
                );
                SyncAction::Dropped
            }
            Transition::Set => {
                let profile = self.profiles.current_profile();
                self.client.set_status(&profile);
                self.state.last_call_state = CallState::InCall;
                SyncAction::SetStatus
            }
            Transition::Clear => {
                self.client.clear_status();
                self.state.last_call_state = CallState::NotInCall;
                SyncAction::ClearStatus
            }
        };

        tracing::debug!(from = %last, to = %incoming, action = ?action, "Call state event");
        action
    }
}
