//! Session state machine
//!
//! A session is a capacity-bounded, optionally password-gated group of
//! players sharing one game instance. Capacity is the only admission
//! control: there is no queueing, waitlist, or backpressure.

use std::collections::HashMap;

use crate::net::ident::{ClientId, SessionId};

/// Per-member state visible to the rest of the session
#[derive(Debug, Clone, Default)]
struct Member {
    /// Latest game payload this member submitted (empty until the first
    /// data_exchange)
    game_data: String,
}

/// A capacity-bounded player group
#[derive(Debug)]
pub struct Session {
    /// Session identity
    pub ident: SessionId,
    /// Display name
    pub name: String,
    /// Maximum member count
    pub max_players: usize,
    /// Admission password; empty means no gate
    password: String,
    /// Current members keyed by player identity
    members: HashMap<ClientId, Member>,
}

impl Session {
    /// Create a new session
    pub fn new(ident: SessionId, name: String, max_players: usize, password: String) -> Self {
        Self {
            ident,
            name,
            max_players,
            password,
            members: HashMap::new(),
        }
    }

    /// Whether admission requires a password
    pub fn password_required(&self) -> bool {
        !self.password.is_empty()
    }

    /// Check a supplied password against the gate
    pub fn password_matches(&self, supplied: &str) -> bool {
        self.password == supplied
    }

    /// Current member count
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the given player is a current member
    pub fn is_member(&self, ident: &str) -> bool {
        self.members.contains_key(ident)
    }

    /// Admit a player if capacity allows. Returns whether the player was
    /// admitted; the caller sets the player's session reference on success.
    pub fn connect_player(&mut self, ident: &str) -> bool {
        if self.members.len() >= self.max_players {
            return false;
        }
        self.members.insert(ident.to_string(), Member::default());
        true
    }

    /// Remove a player from membership. No-op if the player is not a member.
    pub fn disconnect_player(&mut self, ident: &str) {
        self.members.remove(ident);
    }

    /// Store a member's latest game payload
    pub fn set_game_data(&mut self, ident: &str, payload: String) {
        if let Some(member) = self.members.get_mut(ident) {
            member.game_data = payload;
        }
    }

    /// Aggregate snapshot: member count followed by every member's latest
    /// payload, in membership-iteration order. Members that have not
    /// submitted yet contribute an empty string.
    pub fn snapshot(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.members.len() + 1);
        args.push(self.members.len().to_string());
        for member in self.members.values() {
            args.push(member.game_data.clone());
        }
        args
    }

    /// Sessions-list descriptor: `name|id|current|max|password_required`
    pub fn descriptor(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.name,
            self.ident,
            self.members.len(),
            self.max_players,
            u8::from(self.password_required())
        )
    }
}
