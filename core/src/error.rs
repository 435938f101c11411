//! Error types for the Etsy API client.
//!
//! # Design
//! Configuration problems surface at construction, validation and missing
//! arguments surface per call, and transport failures are carried through
//! untouched in a boxed source. Method-table cache failures never appear
//! here: the cache logs them and falls back to the network.

use thiserror::Error;

/// Boxed error produced by a `Transport` or `OAuthSigner` implementation.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by the client, its methods and the OAuth helpers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// The client was set up incorrectly (bad base URL, key source, key file).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An argument was not declared by the method, or failed its type check.
    #[error("{0}")]
    Validation(String),

    /// A path parameter of the URI template was not supplied.
    #[error("Required argument '{0}' not provided.")]
    MissingArgument(String),

    /// No method with this name exists in the loaded method table.
    #[error("unknown API method: {0}")]
    UnknownMethod(String),

    /// The transport could not complete the round-trip.
    #[error("HTTP transport failed")]
    Transport(#[source] TransportError),

    /// The response body was not the expected JSON envelope.
    #[error(
        "Could not decode response from Etsy as JSON: \
         status_code: {status}, text: {body:?}, url {url:?}"
    )]
    Decode {
        status: u16,
        body: String,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// An entry of the server's method table could not be understood.
    #[error("invalid method table entry")]
    InvalidMethodTable(#[source] serde_json::Error),

    /// The OAuth provider rejected a token request or returned an unusable
    /// response.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Reading a local file (key file, upload) failed.
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub(crate) fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ApiError::Transport(Box::new(err))
    }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
