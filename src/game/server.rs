//! Lobby server: player registry, session manager, and request handlers
//!
//! All shared lobby state lives here. Both registries are concurrent maps
//! reachable from every connection's receive loop.
//!
//! Lock order: an operation that touches both registries acquires the
//! players entry first and the sessions entry second, never the reverse.
//! Guards are never held across an await point (handlers are synchronous).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::ProtocolError;
use crate::game::player::Player;
use crate::game::session::Session;
use crate::net::ident::{self, ClientId, SessionId};
use crate::protocol::frame::{Reply, Request};

/// The lobby: player and session registries plus every request handler
pub struct GameServer {
    /// Registered players keyed by connection identity
    players: DashMap<ClientId, Player>,
    /// Sessions keyed by session identity. Sessions are never reaped; empty
    /// ones persist until process exit.
    sessions: DashMap<SessionId, Session>,
}

impl GameServer {
    /// Create an empty lobby
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Handle a routed request from `sender`.
    ///
    /// Semantic failures are `Ok` replies with status 0; an `Err` here is a
    /// dispatch-level fault the dispatcher downgrades to a 400 response.
    pub fn handle(&self, request: &Request, sender: &str) -> Result<Reply, ProtocolError> {
        match request {
            Request::Ping => Ok(self.ping()),
            Request::Registration { nickname } => Ok(self.registration(sender, nickname)),
            Request::GetSessionsList => Ok(self.get_sessions_list()),
            Request::CreateSession { args } => self.create_session(args),
            Request::ConnectToSession {
                session_id,
                password,
            } => Ok(self.connect_to_session(sender, session_id, password.as_deref())),
            Request::DisconnectFromSession => Ok(self.disconnect_from_session(sender)),
            Request::DataExchange { payload } => Ok(self.data_exchange(sender, payload)),
            Request::GetPlayersData => Ok(self.get_players_data(sender)),
        }
    }

    /// Refresh the sender's last-activity timestamp if it is registered
    pub fn touch_player(&self, sender: &str) {
        if let Some(mut player) = self.players.get_mut(sender) {
            player.touch();
        }
    }

    /// `misc/ping`: informational reply carrying the server time
    fn ping(&self) -> Reply {
        let server_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Reply::info(vec![server_time.to_string()])
    }

    /// `misc/registration`: bind a player to the sender's connection, once
    fn registration(&self, sender: &str, nickname: &str) -> Reply {
        match self.players.entry(sender.to_string()) {
            Entry::Occupied(_) => Reply::failure("already registered"),
            Entry::Vacant(entry) => {
                entry.insert(Player::new(sender.to_string(), nickname.to_string()));
                info!(client_id = %sender, nickname = %nickname, "Player registered");
                Reply::success(vec![sender.to_string()])
            }
        }
    }

    /// `misc/get_sessions_list`: count plus one descriptor per session
    fn get_sessions_list(&self) -> Reply {
        let descriptors: Vec<String> = self
            .sessions
            .iter()
            .map(|session| session.descriptor())
            .collect();

        let mut args = Vec::with_capacity(descriptors.len() + 1);
        args.push(descriptors.len().to_string());
        args.extend(descriptors);
        Reply::success(args)
    }

    /// `misc/create_session`: allocate and store a new session
    fn create_session(&self, args: &[String]) -> Result<Reply, ProtocolError> {
        if args.len() != 3 {
            return Ok(Reply::failure("incorrect amount of arguments"));
        }
        if args[0].is_empty() {
            return Ok(Reply::failure("session name is empty"));
        }

        let max_players: usize = args[1]
            .parse()
            .map_err(|e| ProtocolError::WrongArguments(format!("invalid max_players: {e}")))?;

        let session_id = ident::generate();
        let session = Session::new(
            session_id.clone(),
            args[0].clone(),
            max_players,
            args[2].clone(),
        );
        self.sessions.insert(session_id.clone(), session);

        info!(session_id = %session_id, name = %args[0], max_players, "Session created");
        Ok(Reply::success(vec![session_id]))
    }

    /// `misc/connect_to_session`: registration, current membership, session
    /// existence, and password are checked before capacity. Holds the
    /// players entry across the sessions lookup (the
    /// documented lock order) so admission and the session reference update
    /// are atomic with respect to other joins.
    fn connect_to_session(&self, sender: &str, session_id: &str, password: Option<&str>) -> Reply {
        let mut player = match self.players.get_mut(sender) {
            Some(player) => player,
            None => return Reply::failure("not registered"),
        };
        if player.session_id.is_some() {
            return Reply::failure("already connected");
        }

        let mut session = match self.sessions.get_mut(session_id) {
            Some(session) => session,
            None => return Reply::failure("no such session"),
        };

        if session.password_required() {
            match password {
                Some(supplied) if session.password_matches(supplied) => {}
                _ => return Reply::failure("wrong password"),
            }
        }

        if !session.connect_player(sender) {
            return Reply::failure("session overflow");
        }
        player.session_id = Some(session_id.to_string());

        debug!(client_id = %sender, session_id = %session_id, "Player joined session");
        Reply::success(vec![])
    }

    /// `misc/disconnect_from_session`: idempotent
    fn disconnect_from_session(&self, sender: &str) -> Reply {
        let session_id = {
            let mut player = match self.players.get_mut(sender) {
                Some(player) => player,
                None => return Reply::failure("not registered"),
            };
            match player.session_id.take() {
                // Not in a session: success, nothing to do
                None => return Reply::success(vec![]),
                Some(session_id) => session_id,
            }
        };

        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.disconnect_player(sender);
        }

        debug!(client_id = %sender, session_id = %session_id, "Player left session");
        Reply::success(vec![])
    }

    /// `game/data_exchange`: store the sender's payload, return the snapshot
    fn data_exchange(&self, sender: &str, payload: &str) -> Reply {
        self.with_member_session(sender, |session, sender| {
            session.set_game_data(sender, payload.to_string());
            Reply::success(session.snapshot())
        })
    }

    /// `game/get_players_data`: return the snapshot without mutating
    fn get_players_data(&self, sender: &str) -> Reply {
        self.with_member_session(sender, |session, _| Reply::success(session.snapshot()))
    }

    /// Game-route preamble: the sender must be registered and hold a session
    /// reference, and its last-activity is refreshed. The players guard is
    /// released before the session is locked.
    fn with_member_session<F>(&self, sender: &str, f: F) -> Reply
    where
        F: FnOnce(&mut Session, &str) -> Reply,
    {
        let session_id = {
            let mut player = match self.players.get_mut(sender) {
                Some(player) => player,
                None => return Reply::failure("not registered"),
            };
            player.touch();
            match &player.session_id {
                None => return Reply::failure("not connected to session"),
                Some(session_id) => session_id.clone(),
            }
        };

        let mut session = match self.sessions.get_mut(&session_id) {
            Some(session) => session,
            None => return Reply::failure("no such session"),
        };
        if !session.is_member(sender) {
            return Reply::failure("not connected to session");
        }

        f(&mut session, sender)
    }

    /// Connection-close cleanup: drop the player and its session membership
    /// in one pass. This is the only path that clears both sides at once.
    pub fn remove_player(&self, ident: &str) {
        if let Some((_, player)) = self.players.remove(ident) {
            if let Some(session_id) = player.session_id {
                if let Some(mut session) = self.sessions.get_mut(&session_id) {
                    session.disconnect_player(ident);
                }
            }
            debug!(client_id = %ident, "Player removed");
        }
    }

    /// Whether a player is registered under this identity
    pub fn is_registered(&self, ident: &str) -> bool {
        self.players.contains_key(ident)
    }

    /// Nickname lookup for a registered player
    pub fn player_nickname(&self, ident: &str) -> Option<String> {
        self.players.get(ident).map(|p| p.nickname.clone())
    }

    /// Session the player currently belongs to, if any
    pub fn player_session(&self, ident: &str) -> Option<SessionId> {
        self.players.get(ident).and_then(|p| p.session_id.clone())
    }

    /// Number of registered players
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Number of sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Current member count of a session
    pub fn session_members(&self, session_id: &str) -> Option<usize> {
        self.sessions.get(session_id).map(|s| s.member_count())
    }

    /// Players whose inactivity window has elapsed. Query only; any sweep
    /// acting on this lives outside the core.
    pub fn idle_players(&self, window: Duration) -> Vec<ClientId> {
        self.players
            .iter()
            .filter(|player| player.is_idle(window))
            .map(|player| player.ident.clone())
            .collect()
    }
}

impl Default for GameServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(lobby: &GameServer, ident: &str, nickname: &str) {
        let reply = lobby.registration(ident, nickname);
        assert_eq!(reply.status.code(), 1);
    }

    fn create(lobby: &GameServer, name: &str, max_players: usize, password: &str) -> String {
        let args = vec![
            name.to_string(),
            max_players.to_string(),
            password.to_string(),
        ];
        let reply = lobby.create_session(&args).unwrap();
        assert_eq!(reply.status.code(), 1);
        reply.args[0].clone()
    }

    #[test]
    fn test_registration_returns_sender_identity() {
        let lobby = GameServer::new();
        let reply = lobby.registration("conn-1", "elandra");

        assert_eq!(reply.status.code(), 1);
        assert_eq!(reply.args, vec!["conn-1"]);
        assert_eq!(lobby.player_nickname("conn-1").unwrap(), "elandra");
    }

    #[test]
    fn test_duplicate_registration_leaves_first_intact() {
        let lobby = GameServer::new();
        register(&lobby, "conn-1", "elandra");

        let reply = lobby.registration("conn-1", "imposter");
        assert_eq!(reply.status.code(), 0);
        assert_eq!(reply.args, vec!["already registered"]);
        assert_eq!(lobby.player_nickname("conn-1").unwrap(), "elandra");
    }

    #[test]
    fn test_create_session_validation() {
        let lobby = GameServer::new();

        let reply = lobby
            .create_session(&["room".to_string(), "4".to_string()])
            .unwrap();
        assert_eq!(reply.args, vec!["incorrect amount of arguments"]);

        let reply = lobby
            .create_session(&[String::new(), "4".to_string(), String::new()])
            .unwrap();
        assert_eq!(reply.args, vec!["session name is empty"]);

        // Non-numeric capacity is a dispatch-level fault
        let result =
            lobby.create_session(&["room".to_string(), "four".to_string(), String::new()]);
        assert!(matches!(result, Err(ProtocolError::WrongArguments(_))));
    }

    #[test]
    fn test_sessions_list_descriptors() {
        let lobby = GameServer::new();
        let reply = lobby.get_sessions_list();
        assert_eq!(reply.args, vec!["0"]);

        let id = create(&lobby, "room", 4, "secret");
        let reply = lobby.get_sessions_list();
        assert_eq!(reply.args[0], "1");
        assert_eq!(reply.args[1], format!("room|{id}|0|4|1"));
    }

    #[test]
    fn test_connect_requires_registration() {
        let lobby = GameServer::new();
        let id = create(&lobby, "room", 4, "");

        let reply = lobby.connect_to_session("ghost", &id, None);
        assert_eq!(reply.args, vec!["not registered"]);
    }

    #[test]
    fn test_connect_unknown_session() {
        let lobby = GameServer::new();
        register(&lobby, "conn-1", "elandra");

        let reply = lobby.connect_to_session("conn-1", "missing", None);
        assert_eq!(reply.args, vec!["no such session"]);
    }

    #[test]
    fn test_connect_twice_rejected() {
        let lobby = GameServer::new();
        register(&lobby, "conn-1", "elandra");
        let a = create(&lobby, "a", 4, "");
        let b = create(&lobby, "b", 4, "");

        assert_eq!(lobby.connect_to_session("conn-1", &a, None).status.code(), 1);
        let reply = lobby.connect_to_session("conn-1", &b, None);
        assert_eq!(reply.args, vec!["already connected"]);
        assert_eq!(lobby.player_session("conn-1").unwrap(), a);
    }

    #[test]
    fn test_password_gate() {
        let lobby = GameServer::new();
        register(&lobby, "conn-1", "elandra");
        let id = create(&lobby, "room", 4, "hunter2");

        let reply = lobby.connect_to_session("conn-1", &id, None);
        assert_eq!(reply.args, vec!["wrong password"]);

        let reply = lobby.connect_to_session("conn-1", &id, Some("hunter3"));
        assert_eq!(reply.args, vec!["wrong password"]);

        let reply = lobby.connect_to_session("conn-1", &id, Some("hunter2"));
        assert_eq!(reply.status.code(), 1);
    }

    #[test]
    fn test_capacity_exact_admission() {
        let lobby = GameServer::new();
        let id = create(&lobby, "room", 2, "");

        for i in 0..3 {
            register(&lobby, &format!("conn-{i}"), &format!("nick-{i}"));
        }

        assert_eq!(lobby.connect_to_session("conn-0", &id, None).status.code(), 1);
        assert_eq!(lobby.connect_to_session("conn-1", &id, None).status.code(), 1);

        let reply = lobby.connect_to_session("conn-2", &id, None);
        assert_eq!(reply.args, vec!["session overflow"]);
        assert_eq!(lobby.session_members(&id).unwrap(), 2);
        assert_eq!(lobby.player_session("conn-0").unwrap(), id);
        assert_eq!(lobby.player_session("conn-1").unwrap(), id);
        assert!(lobby.player_session("conn-2").is_none());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let lobby = GameServer::new();
        register(&lobby, "conn-1", "elandra");
        let id = create(&lobby, "room", 2, "");
        lobby.connect_to_session("conn-1", &id, None);

        let reply = lobby.disconnect_from_session("conn-1");
        assert_eq!(reply.status.code(), 1);
        assert_eq!(lobby.session_members(&id).unwrap(), 0);
        assert!(lobby.player_session("conn-1").is_none());

        // Second disconnect is a successful no-op
        let reply = lobby.disconnect_from_session("conn-1");
        assert_eq!(reply.status.code(), 1);
        assert_eq!(lobby.session_members(&id).unwrap(), 0);
    }

    #[test]
    fn test_disconnect_unregistered() {
        let lobby = GameServer::new();
        let reply = lobby.disconnect_from_session("ghost");
        assert_eq!(reply.args, vec!["not registered"]);
    }

    #[test]
    fn test_data_exchange_round_trip() {
        let lobby = GameServer::new();
        register(&lobby, "a", "alice");
        register(&lobby, "b", "bob");
        let id = create(&lobby, "room", 2, "");
        lobby.connect_to_session("a", &id, None);
        lobby.connect_to_session("b", &id, None);

        let reply = lobby.data_exchange("a", "payload-a");
        assert_eq!(reply.status.code(), 1);
        assert_eq!(reply.args[0], "2");

        let reply = lobby.data_exchange("b", "payload-b");
        assert_eq!(reply.args[0], "2");

        let reply = lobby.get_players_data("a");
        assert_eq!(reply.status.code(), 1);
        assert_eq!(reply.args[0], "2");
        assert!(reply.args[1..].contains(&"payload-a".to_string()));
        assert!(reply.args[1..].contains(&"payload-b".to_string()));
    }

    #[test]
    fn test_game_route_preconditions() {
        let lobby = GameServer::new();

        let reply = lobby.data_exchange("ghost", "x");
        assert_eq!(reply.args, vec!["not registered"]);

        register(&lobby, "conn-1", "elandra");
        let reply = lobby.get_players_data("conn-1");
        assert_eq!(reply.args, vec!["not connected to session"]);
    }

    #[test]
    fn test_remove_player_clears_membership() {
        let lobby = GameServer::new();
        register(&lobby, "conn-1", "elandra");
        let id = create(&lobby, "room", 2, "");
        lobby.connect_to_session("conn-1", &id, None);

        lobby.remove_player("conn-1");

        assert!(!lobby.is_registered("conn-1"));
        assert_eq!(lobby.session_members(&id).unwrap(), 0);
        // Removal of an unknown player is harmless
        lobby.remove_player("conn-1");
    }

    #[test]
    fn test_sessions_are_never_reaped() {
        let lobby = GameServer::new();
        register(&lobby, "conn-1", "elandra");
        let id = create(&lobby, "room", 2, "");
        lobby.connect_to_session("conn-1", &id, None);
        lobby.disconnect_from_session("conn-1");

        assert_eq!(lobby.session_count(), 1);
        assert_eq!(lobby.session_members(&id).unwrap(), 0);
    }

    #[test]
    fn test_idle_players_query() {
        let lobby = GameServer::new();
        register(&lobby, "conn-1", "elandra");

        assert!(lobby.idle_players(Duration::from_secs(60)).is_empty());

        std::thread::sleep(Duration::from_millis(15));
        let idle = lobby.idle_players(Duration::from_millis(5));
        assert_eq!(idle, vec!["conn-1".to_string()]);

        lobby.touch_player("conn-1");
        assert!(lobby.idle_players(Duration::from_millis(5)).is_empty());
    }

    #[test]
    fn test_ping_reports_epoch_seconds() {
        let lobby = GameServer::new();
        let reply = lobby.ping();
        assert_eq!(reply.status.code(), 200);

        let reported: f64 = reply.args[0].parse().unwrap();
        assert!(reported > 1_600_000_000.0);
    }
}
