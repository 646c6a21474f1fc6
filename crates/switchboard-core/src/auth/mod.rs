pub mod storage;

pub use storage::{CredentialStore, Credentials};

use crate::config::EnvProvider;
use crate::config::provider::ProviderConfig;

/// Resolve the API key for `provider`.
///
/// A key stored by the user wins; otherwise the provider's `api_key_env`
/// variable is consulted. Blank values count as absent.
pub fn resolve_api_key(
    credentials: &Credentials,
    provider: &ProviderConfig,
    env: &dyn EnvProvider,
) -> Option<String> {
    if let Some(key) = credentials
        .get(provider.id.as_str())
        .filter(|k| !k.trim().is_empty())
    {
        return Some(key.clone());
    }

    provider
        .api_key_env
        .as_deref()
        .and_then(|var| env.var(var))
        .filter(|k| !k.trim().is_empty())
}
