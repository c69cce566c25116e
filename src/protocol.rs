//! Chat lines sent to clients.
//!
//! Every server-to-client message is a single plain text frame; there is no
//! envelope. Client text is interpolated as-is.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChatEvent<'a> {
    /// Acknowledgment to the author of a message
    Echo { text: &'a str },
    /// Relay of a message to everyone else
    Said { username: &'a str, text: &'a str },
    /// Departure notice
    Left { username: &'a str },
}

impl fmt::Display for ChatEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatEvent::Echo { text } => write!(f, "You wrote: {}", text),
            ChatEvent::Said { username, text } => {
                write!(f, "username #{} says: {}", username, text)
            }
            ChatEvent::Left { username } => write!(f, "username #{} left the chat", username),
        }
    }
}
