//! Errors
//!
//! Every failure the adapter can report. Nothing is retried, each of these is
//! handed straight back to whoever issued the request.

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum PadreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Can't understand JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Can't understand endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Handshake failed: {0}")]
    Handshake(#[source] Box<PadreError>),

    #[error("Error from actor {actor}: {error} {message}")]
    Protocol {
        actor: String,
        error: String,
        message: String,
    },

    #[error("Connection to debugger server closed")]
    ConnectionClosed,

    #[error("Not connected to a debugger server")]
    NotConnected,

    #[error("Can't attach to target: {0}")]
    Attach(String),

    #[error("No thread attached, connect to a tab first")]
    NotAttached,

    #[error("Breakpoint {0} not found")]
    BreakpointNotFound(String),

    #[error("Can't use {0} as an object grip, it has no actor")]
    InvalidGrip(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl PadreError {
    /// Build a `Protocol` error from a reply packet carrying an `error` field
    pub fn from_packet(actor: &str, packet: &serde_json::Value) -> Self {
        PadreError::Protocol {
            actor: actor.to_string(),
            error: packet["error"].as_str().unwrap_or("unknownError").to_string(),
            message: packet["message"].as_str().unwrap_or("").to_string(),
        }
    }
}
