use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no price element found on page")]
    NotFound,

    #[error("price text {raw:?} is not a valid amount")]
    Malformed { raw: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page request timed out")]
    Timeout,

    #[error("page request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("page returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}
