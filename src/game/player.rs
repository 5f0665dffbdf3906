//! Player registry entries
//!
//! A `Player` is a registered identity bound to exactly one live connection.
//! It exists from the registration request until its connection closes.

use std::time::{Duration, Instant};

use crate::net::ident::{ClientId, SessionId};

/// A registered player
#[derive(Debug, Clone)]
pub struct Player {
    /// Identity, equal to the owning connection's identity
    pub ident: ClientId,
    /// Nickname submitted at registration
    pub nickname: String,
    /// Session the player currently belongs to, if any
    pub session_id: Option<SessionId>,
    /// Time of the last frame received from this player
    last_activity: Instant,
}

impl Player {
    /// Create a new player bound to a connection identity
    pub fn new(ident: ClientId, nickname: String) -> Self {
        Self {
            ident,
            nickname,
            session_id: None,
            last_activity: Instant::now(),
        }
    }

    /// Refresh the last-activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Get the last activity time
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Duration since the last frame from this player
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Whether the inactivity window has elapsed. Queryable fact only; the
    /// sweep that acts on it lives outside the core.
    pub fn is_idle(&self, window: Duration) -> bool {
        self.idle_duration() > window
    }
}
