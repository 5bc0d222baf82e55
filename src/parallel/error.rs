use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where an item failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The mapped function returned `Err`.
    Item,
    /// The mapped function panicked.
    Panic,
    /// Enumerating the input failed before the item reached a worker.
    Input,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Item => write!(f, "item error"),
            ErrorKind::Panic => write!(f, "panic"),
            ErrorKind::Input => write!(f, "input error"),
        }
    }
}

/// Serializable envelope for a failure raised while processing one item.
///
/// The original error value stays on the worker; only its rendered message
/// and cause chain cross over to the collecting thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub index: usize,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ItemError {
    pub fn new(index: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Flatten an `anyhow` chain: the outermost context becomes the message,
    /// everything beneath it the causes.
    pub fn from_anyhow(index: usize, kind: ErrorKind, error: &anyhow::Error) -> Self {
        let mut chain = error.chain().map(|cause| cause.to_string());
        let message = chain.next().unwrap_or_default();
        Self {
            index,
            kind,
            message,
            causes: chain.collect(),
        }
    }

    pub fn from_panic(index: usize, kind: ErrorKind, payload: Box<dyn Any + Send>) -> Self {
        Self::new(index, kind, panic_message(payload.as_ref()))
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at index {}: {}", self.kind, self.index, self.message)?;
        for cause in &self.causes {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ItemError {}

/// Extract the message a panic was raised with.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Errors surfaced by `map` and by the result sequence it returns.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid map options: {0}")]
    InvalidOptions(String),

    #[error("failed to spawn {role}: {source}")]
    Spawn {
        role: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Item(#[from] ItemError),

    #[error("failed to open worker log {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("result channel closed before all workers finished")]
    Disconnected,

    #[error("map session was cancelled")]
    Cancelled,

    #[error("all workers finished but result {next_index} never arrived")]
    Incomplete { next_index: usize },
}

impl MapError {
    /// The item failure behind this error, if any.
    pub fn item(&self) -> Option<&ItemError> {
        match self {
            MapError::Item(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_from_anyhow_keeps_cause_chain() {
        let error = Err::<(), _>(anyhow::anyhow!("division by zero"))
            .context("evaluating 1/x")
            .unwrap_err();
        let item = ItemError::from_anyhow(2, ErrorKind::Item, &error);

        assert_eq!(item.index, 2);
        assert_eq!(item.message, "evaluating 1/x");
        assert_eq!(item.causes, vec!["division by zero".to_string()]);
        assert_eq!(
            item.to_string(),
            "item error at index 2: evaluating 1/x: division by zero"
        );
    }

    #[test]
    fn test_panic_payloads() {
        assert_eq!(panic_message(&"static str"), "static str");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "panic with non-string payload");
    }

    #[test]
    fn test_envelope_serializes() {
        let item = ItemError::new(7, ErrorKind::Panic, "attempt to divide by zero");
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(
            json,
            r#"{"index":7,"kind":"panic","message":"attempt to divide by zero"}"#
        );

        let back: ItemError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }
}
