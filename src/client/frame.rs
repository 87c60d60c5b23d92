use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// STOMP server frame commands the client reacts to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }
}

/// A frame received from the broker.
///
/// Frames are already decoded by the transport; the client only reads
/// headers and the body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub command: Command,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Frame {
    /// MESSAGE frame for a destination
    pub fn message(destination: &str, body: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("destination".to_string(), destination.to_string());
        Self {
            command: Command::Message,
            headers,
            body: body.into(),
        }
    }

    /// ERROR frame with arbitrary headers
    pub fn error(headers: BTreeMap<String, String>, body: impl Into<String>) -> Self {
        Self {
            command: Command::Error,
            headers,
            body: body.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    /// Human-readable description of an error frame.
    ///
    /// Prefers the `message` header and falls back to the whole frame.
    pub fn error_message(&self) -> String {
        match self.header("message") {
            Some(message) => message.to_string(),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.command.as_str())?;
        for (name, value) in &self.headers {
            writeln!(f, "{}:{}", name, value)?;
        }
        writeln!(f)?;
        write!(f, "{}", self.body)
    }
}
