use serde::{ Serialize, Deserialize };

/// One event on the chat stream, serialized untagged as a single-key JSON
/// object: reasoning text arrives as `thinking`, answer text as `content`,
/// and the sequence ends with exactly one `done` or one `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Thinking {
        thinking: String,
    },
    Content {
        content: String,
    },
    Error {
        error: String,
    },
    Done {
        done: bool,
    },
}

impl StreamEvent {
    pub fn thinking(text: impl Into<String>) -> Self {
        StreamEvent::Thinking { thinking: text.into() }
    }

    pub fn content(text: impl Into<String>) -> Self {
        StreamEvent::Content { content: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error { error: message.into() }
    }

    pub fn done() -> Self {
        StreamEvent::Done { done: true }
    }
}
