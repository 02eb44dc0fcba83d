use serde::{Deserialize, Serialize};

/// One event from a streaming markup parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MarkupEvent {
    /// An element opened
    Start {
        name: String,
        attributes: Vec<(String, String)>,
    },
    /// Character data between tags
    Text(String),
    /// An element closed
    End { name: String },
}

impl MarkupEvent {
    pub fn start(name: impl Into<String>) -> Self {
        MarkupEvent::Start {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        MarkupEvent::Text(text.into())
    }

    pub fn end(name: impl Into<String>) -> Self {
        MarkupEvent::End { name: name.into() }
    }

    /// Element name for start and end events
    pub fn name(&self) -> Option<&str> {
        match self {
            MarkupEvent::Start { name, .. } | MarkupEvent::End { name } => Some(name),
            MarkupEvent::Text(_) => None,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            MarkupEvent::Start { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}
