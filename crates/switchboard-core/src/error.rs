use thiserror::Error;

use crate::{api::models::ModelFetchError, storage::StorageError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    ModelFetch(#[from] ModelFetchError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_setup() -> Result<()> {
        Err(ModelFetchError::MissingBaseUrl {
            provider: "openai".to_string(),
        })?;
        Ok(())
    }

    #[test]
    fn fetch_errors_convert_with_their_message() {
        let err = client_setup().unwrap_err();
        assert!(matches!(
            &err,
            Error::ModelFetch(ModelFetchError::MissingBaseUrl { provider }) if provider == "openai"
        ));
        assert_eq!(err.to_string(), "No base URL configured for openai");
    }
}
