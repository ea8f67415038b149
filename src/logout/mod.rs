//! Local logout detection and hand-off to the broadcaster

mod detector;
mod dispatcher;

pub use detector::{LogoutDetector, LogoutOutcome};
pub use dispatcher::{BroadcastDispatcher, BroadcastWorker};

/// Response extension marking that a handler logged out a session.
///
/// Handlers insert it into their response; the logout middleware picks it
/// up after the handler completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLoggedOut(pub String);
