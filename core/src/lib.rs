//! Synchronous client core for the Etsy API v2.
//!
//! # Overview
//! The server publishes a table of its methods (`GET {api_url}/`). The client
//! loads that table, caches it on disk and exposes every entry as a callable
//! method: arguments are type-checked against the declared parameter types,
//! path parameters are substituted into the URI template and the rest is sent
//! as a query string (GET/DELETE) or a multipart body (POST/PUT).
//!
//! # Design
//! - HTTP is behind the `Transport` trait. The core builds `HttpRequest`
//!   values and parses `HttpResponse` values; `UreqTransport` (feature
//!   `ureq`, on by default) performs real round-trips.
//! - `ApiClient` owns its method objects and type checker; a method borrows
//!   the client's dispatcher only for the duration of one call.
//! - OAuth signing is delegated to an `OAuthSigner`. The `oauth` module only
//!   drives the three-legged handshake and shapes signed requests.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod log;
pub mod method;
pub mod multipart;
pub mod oauth;
#[cfg(feature = "ureq")]
pub mod transport;
pub mod typecheck;
pub mod types;

pub use cache::{CacheLocation, MethodTableCache, DEFAULT_MAX_AGE};
pub use client::{ApiClient, ApiClientBuilder};
pub use config::ApiConfig;
pub use error::{ApiError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, Transport};
pub use log::LogSink;
pub use method::{ApiMethod, Dispatch};
pub use multipart::MultipartForm;
pub use oauth::{OAuthClient, OAuthCredentials, OAuthEndpoints, OAuthSigner, SignedTransport};
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use typecheck::{ParamType, TypeChecker};
pub use types::{ArgValue, Args, Envelope, FileUpload, MethodSpec};
