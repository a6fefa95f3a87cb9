use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds surfaced to the user. Each variant corresponds to one
/// diagnosable situation; none of these are downgraded to warnings.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read clouds file {path}: {reason}")]
    StoreUnreadable { path: PathBuf, reason: anyhow::Error },

    #[error("could not write clouds file {path}: {reason}")]
    StoreUnwritable { path: PathBuf, reason: anyhow::Error },

    #[error("no cloud profile named '{0}' in the clouds file; run `ssokey login` first")]
    ProfileNotFound(String),

    #[error("failed to launch browser: {0}")]
    LaunchFailed(anyhow::Error),

    #[error("failed to open federation page: {0}")]
    NavigationFailed(anyhow::Error),

    #[error("timed out after {0}s waiting for the login to complete")]
    AuthenticationTimeout(u64),

    #[error("browser window was closed before the login completed")]
    BrowserClosedPrematurely,

    #[error("could not fetch temporary credentials after {attempts} attempts")]
    CredentialFetchFailed { attempts: u32 },

    #[error("credential endpoint returned an unparsable payload: {0}")]
    MalformedCredentialPayload(#[source] serde_json::Error),

    #[error("credential request was rejected by the endpoint: {0}")]
    CredentialRequestRejected(String),

    #[error("cloud profile '{name}' cannot be used for authentication: {reason}")]
    AuthMisconfigured { name: String, reason: String },

    #[error("{context}: {reason}")]
    Api { context: String, reason: anyhow::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
