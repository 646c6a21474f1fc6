pub mod models;

pub use models::{HttpModelFetcher, ModelFetchError, ModelFetcher};
