use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum PollError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid scan coordinates: {0}")]
    Input(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Network,
    Decode,
    Input,
}

impl PollError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PollError::Network { .. } | PollError::Status { .. } => ErrorKind::Network,
            PollError::Decode { .. } => ErrorKind::Decode,
            PollError::Input(_) => ErrorKind::Input,
        }
    }
}
