use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("session expired or missing credential")]
    Auth,
    #[error("{0}")]
    Validation(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("not found or conflicting: {0}")]
    ConflictOrNotFound(String),
    #[error("backend returned {status}: {message}")]
    Http { status: u16, message: String },
}

impl ChatError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = extract_message(body);
        match status {
            401 => ChatError::Auth,
            400 | 422 => ChatError::Validation(message),
            404 | 409 | 410 => ChatError::ConflictOrNotFound(message),
            _ => ChatError::Http { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Network(_) => true,
            ChatError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Network(err.to_string())
    }
}

fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.trim().to_string())
}
