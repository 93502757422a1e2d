//! Provider abstraction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use inframan_core::Resource;
use serde::{Deserialize, Serialize};

/// A backend able to create and destroy resources.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get provider name.
    fn name(&self) -> &str;

    /// Get provider description.
    fn description(&self) -> &str;

    /// Create `resource`, returning what the backend reported.
    async fn deploy(&self, resource: &Resource) -> Result<ProviderOutput, ProviderError>;

    /// Destroy a previously deployed `resource`.
    async fn destroy(&self, resource: &Resource) -> Result<(), ProviderError>;
}

/// What a provider reports after creating a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOutput {
    /// Backend identifier of the created resource
    pub provider_id: String,

    /// Backend attributes (endpoints, addresses, ...)
    pub attributes: BTreeMap<String, String>,
}

/// Errors reported by providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Spawning or talking to a child process failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The command ran and exited unsuccessfully
    #[error("command exited with code {exit_code}: {stderr}")]
    CommandFailed {
        /// Exit code (-1 when killed by a signal)
        exit_code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// The command template cannot be run
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The backend refused the request
    #[error("rejected: {0}")]
    Rejected(String),
}
