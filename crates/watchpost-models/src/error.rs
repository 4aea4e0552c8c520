use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model response carried no message content")]
    EmptyResponse,

    #[error("no API key configured")]
    MissingApiKey,
}
