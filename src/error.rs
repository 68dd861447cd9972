use thiserror::Error;

/// Failure of one call against the stats API.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid payload: {0}")]
    Decode(String),

    /// The source answered but with nothing usable (no result set, or an empty one).
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{label} failed after {attempts} attempts: {source}")]
    Exhausted {
        label: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Timeout and connection failures, including an exhausted retry whose last
    /// attempt was one of those.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Connection(_) => true,
            FetchError::Exhausted { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("invalid row: {0}")]
    InvalidRow(String),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Attaches the failing store operation to a `rusqlite` error.
pub trait StoreContext<T> {
    fn store_ctx(self, op: &'static str) -> IngestResult<T>;
}

impl<T> StoreContext<T> for rusqlite::Result<T> {
    fn store_ctx(self, op: &'static str) -> IngestResult<T> {
        self.map_err(|source| IngestError::Store { op, source })
    }
}

#[cfg(test)]
mod tests {
    use super::FetchError;

    #[test]
    fn exhausted_keeps_transient_kind_of_last_attempt() {
        let err = FetchError::Exhausted {
            label: "box score".to_string(),
            attempts: 3,
            source: Box::new(FetchError::Timeout("45s".to_string())),
        };
        assert!(err.is_transient());

        let err = FetchError::Exhausted {
            label: "box score".to_string(),
            attempts: 3,
            source: Box::new(FetchError::InvalidResponse("empty".to_string())),
        };
        assert!(!err.is_transient());
    }
}
