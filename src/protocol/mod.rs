//! Protocol module
//!
//! This module contains the wire protocol for the Tavern server:
//! - Frame parsing and response composition (text frames, '/'-delimited)
//! - The closed set of request routes
//! - The dispatcher that turns one inbound frame into exactly one response

pub mod dispatcher;
pub mod frame;
