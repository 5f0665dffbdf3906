//! Protocol dispatcher
//!
//! Turns one inbound frame into exactly one response frame. Handler
//! failures of any kind are downgraded to response values here; nothing a
//! client sends can terminate its receive loop through this path.

use tracing::trace;

use crate::error::ProtocolError;
use crate::game::GameServer;
use crate::protocol::frame::{Frame, Request, Response, Status, FIELD_DELIMITER};

/// Dispatch a raw frame from `sender` and serialize the response.
///
/// The sender's last-activity timestamp is refreshed (when registered)
/// before the handler runs, regardless of the request's outcome.
pub fn dispatch(lobby: &GameServer, raw: &str, sender: &str) -> String {
    lobby.touch_player(sender);

    let frame = match Frame::parse(raw) {
        Ok(frame) => frame,
        Err(_) => return malformed_response(raw),
    };

    trace!(
        client_id = %sender,
        flag = %frame.flag,
        subflag = %frame.subflag,
        "Dispatching frame"
    );

    let reply = Request::from_frame(&frame).and_then(|request| lobby.handle(&request, sender));

    let response = match reply {
        Ok(reply) => Response::new(reply.status, &frame.flag, &frame.subflag, reply.args),
        Err(error) => error_response(&frame, error),
    };
    response.encode()
}

/// Downgrade a dispatch-level fault to its standard 400 response
fn error_response(frame: &Frame, error: ProtocolError) -> Response {
    let args = match error {
        ProtocolError::UnknownRoute { .. } => vec!["Wrong subflag".to_string()],
        ProtocolError::WrongArguments(detail) => {
            vec!["Wrong arguments".to_string(), format!("debug: {detail}")]
        }
        ProtocolError::MalformedFrame => vec!["Malformed frame".to_string()],
    };
    Response::new(Status::DispatchError, &frame.flag, &frame.subflag, args)
}

/// A frame too short to route; echo whatever fields were present
fn malformed_response(raw: &str) -> String {
    let flag = raw.split(FIELD_DELIMITER).next().unwrap_or_default();
    Response::new(
        Status::DispatchError,
        flag,
        "",
        vec!["Malformed frame".to_string()],
    )
    .encode()
}
