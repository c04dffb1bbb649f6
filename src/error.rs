use thiserror::Error;

/// Failure of a single remote fetch. The poller logs these and keeps the
/// previous sample on screen; none of them are fatal.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node returned HTTP {status} for {path}")]
    Status { status: u16, path: String },

    #[error("could not decode {path} response: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
