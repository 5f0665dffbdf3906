//! Wire frames and typed request routing
//!
//! Requests arrive as '/'-delimited text: `flag/subflag/arg1/arg2/...`.
//! Responses are composed as `status/flag/subflag/arg1|arg2|...`.
//!
//! The (flag, subflag) routing table is a closed enum so the match in the
//! lobby server is checked for completeness at compile time.

use crate::error::ProtocolError;

/// Request field delimiter
pub const FIELD_DELIMITER: char = '/';

/// Response argument delimiter
pub const ARG_DELIMITER: &str = "|";

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Handler-level semantic failure; args[0] is a reason string
    Failure,
    /// Handler-level success
    Success,
    /// Informational success carrying a scalar value (ping only)
    Info,
    /// Parse/dispatch-level failure (malformed frame, unknown subflag,
    /// wrong arguments)
    DispatchError,
}

impl Status {
    /// Numeric wire code
    pub fn code(self) -> u16 {
        match self {
            Status::Failure => 0,
            Status::Success => 1,
            Status::Info => 200,
            Status::DispatchError => 400,
        }
    }
}

/// A parsed inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flag: String,
    pub subflag: String,
    pub args: Vec<String>,
}

impl Frame {
    /// Split a raw frame on the field delimiter. Fewer than two fields is a
    /// parse failure.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let mut fields = raw.split(FIELD_DELIMITER);

        let flag = fields.next().ok_or(ProtocolError::MalformedFrame)?;
        let subflag = fields.next().ok_or(ProtocolError::MalformedFrame)?;

        Ok(Self {
            flag: flag.to_string(),
            subflag: subflag.to_string(),
            args: fields.map(str::to_string).collect(),
        })
    }
}

/// The closed set of recognized requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `misc/ping`
    Ping,
    /// `misc/registration/<nickname>`
    Registration { nickname: String },
    /// `misc/get_sessions_list`
    GetSessionsList,
    /// `misc/create_session/<name>/<max_players>/<password>`; arity and
    /// argument validation happen in the handler so that the wrong-arity
    /// case surfaces as a semantic failure, not a dispatch failure
    CreateSession { args: Vec<String> },
    /// `misc/connect_to_session/<session_id>[/<password>]`
    ConnectToSession {
        session_id: String,
        password: Option<String>,
    },
    /// `misc/disconnect_from_session`
    DisconnectFromSession,
    /// `game/data_exchange/<payload>`
    DataExchange { payload: String },
    /// `game/get_players_data`
    GetPlayersData,
}

impl Request {
    /// Route a parsed frame to a request variant.
    ///
    /// An unrecognized (flag, subflag) pair is `UnknownRoute`; a recognized
    /// route missing a required argument is `WrongArguments` (the caught
    /// exception of the dispatch contract).
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        match (frame.flag.as_str(), frame.subflag.as_str()) {
            ("misc", "ping") => Ok(Request::Ping),
            ("misc", "registration") => Ok(Request::Registration {
                nickname: required_arg(frame, 0, "nickname")?,
            }),
            ("misc", "get_sessions_list") => Ok(Request::GetSessionsList),
            ("misc", "create_session") => Ok(Request::CreateSession {
                args: frame.args.clone(),
            }),
            ("misc", "connect_to_session") => Ok(Request::ConnectToSession {
                session_id: required_arg(frame, 0, "session id")?,
                password: frame.args.get(1).cloned(),
            }),
            ("misc", "disconnect_from_session") => Ok(Request::DisconnectFromSession),
            ("game", "data_exchange") => Ok(Request::DataExchange {
                payload: required_arg(frame, 0, "payload")?,
            }),
            ("game", "get_players_data") => Ok(Request::GetPlayersData),
            _ => Err(ProtocolError::UnknownRoute {
                flag: frame.flag.clone(),
                subflag: frame.subflag.clone(),
            }),
        }
    }
}

fn required_arg(frame: &Frame, index: usize, what: &str) -> Result<String, ProtocolError> {
    frame
        .args
        .get(index)
        .cloned()
        .ok_or_else(|| ProtocolError::WrongArguments(format!("missing {what}")))
}

/// A handler's reply, before serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub args: Vec<String>,
}

impl Reply {
    pub fn success(args: Vec<String>) -> Self {
        Self {
            status: Status::Success,
            args,
        }
    }

    pub fn failure(reason: &str) -> Self {
        Self {
            status: Status::Failure,
            args: vec![reason.to_string()],
        }
    }

    pub fn info(args: Vec<String>) -> Self {
        Self {
            status: Status::Info,
            args,
        }
    }
}

/// A serialized-to-be response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub flag: String,
    pub subflag: String,
    pub args: Vec<String>,
}

impl Response {
    /// Build a response echoing the request's flag and subflag
    pub fn new(status: Status, flag: &str, subflag: &str, args: Vec<String>) -> Self {
        Self {
            status,
            flag: flag.to_string(),
            subflag: subflag.to_string(),
            args,
        }
    }

    /// Compose the wire form: `status/flag/subflag/arg1|arg2|...`
    pub fn encode(&self) -> String {
        format!(
            "{}{d}{}{d}{}{d}{}",
            self.status.code(),
            self.flag,
            self.subflag,
            self.args.join(ARG_DELIMITER),
            d = FIELD_DELIMITER,
        )
    }
}
