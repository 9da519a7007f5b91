//! The `Oracle` trait -- the adapter interface for text-generation services.
//!
//! The pipeline treats generation as a non-deterministic black box: given a
//! prompt, it asynchronously returns free text expected to parse as JSON.
//! The trait is intentionally object-safe so adapters can be stored as
//! `Box<dyn Oracle>` or `Arc<dyn Oracle>`.

pub mod command;
pub mod retry;

use async_trait::async_trait;

pub use command::CommandOracle;
pub use retry::RetryOracle;

/// A single generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    /// Role and output contract, held constant across a pass.
    pub system_instruction: String,
    /// The pass-specific prompt body.
    pub user_prompt: String,
    /// Output format hint forwarded to the service. Always `"json"` here.
    pub response_format_hint: String,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
}

impl OracleRequest {
    /// Build a JSON-hinted request with the default token ceiling.
    pub fn json(system_instruction: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            user_prompt: user_prompt.into(),
            response_format_hint: "json".to_string(),
            max_output_tokens: 4096,
        }
    }
}

/// Transport-layer failure modes.
///
/// `Network` is the only variant eligible for automatic retry; a
/// server-reported error means the request was understood and rejected.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("transport failure: {0}")]
    Network(String),

    #[error("generation service error: {0}")]
    Server(String),

    #[error("generation service returned empty text")]
    Empty,
}

impl OracleError {
    /// Whether an automatic transport-level retry is permitted.
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Network(_))
    }
}

/// Adapter interface for an external text-generation service.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Human-readable adapter name (e.g. "command").
    fn name(&self) -> &str;

    /// Send one request and return the raw response text.
    ///
    /// Implementations must map transport problems to
    /// [`OracleError::Network`], service-reported failures to
    /// [`OracleError::Server`], and a blank response body to
    /// [`OracleError::Empty`].
    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

// Compile-time assertion: Oracle must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Oracle) {}
};
