//! Three-legged OAuth1.0 handshake and signed requests.
//!
//! # Design
//! Signing is not implemented here: an `OAuthSigner` takes credentials and a
//! plain `HttpRequest`, signs it and performs the round-trip. The handshake
//! steps are free functions with no state carried between them, since each
//! step usually runs in a different HTTP request of the calling application:
//!
//! 1. `get_request_url_and_token_secret` obtains a temporary token and the
//!    login URL to send the user to;
//! 2. the user authorizes the app and is redirected (or shown a verifier);
//! 3. `get_oauth_token_via_auth_url` or `get_oauth_token_via_verifier`
//!    exchanges the temporary token for a long-lived token pair.

use std::collections::HashMap;

use crate::client::{encode_query, multipart_body};
use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, Transport};
use crate::log::LogSink;
use crate::types::Args;

pub const ETSY_REQUEST_TOKEN_URL: &str = "https://openapi.etsy.com/v2/oauth/request_token";
pub const ETSY_ACCESS_TOKEN_URL: &str = "https://openapi.etsy.com/v2/oauth/access_token";

/// Token endpoints of the OAuth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub request_token_url: String,
    pub access_token_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            request_token_url: ETSY_REQUEST_TOKEN_URL.to_string(),
            access_token_url: ETSY_ACCESS_TOKEN_URL.to_string(),
        }
    }
}

impl OAuthEndpoints {
    /// Endpoints below an API root, e.g. `http://127.0.0.1:3000/v2`.
    pub fn under(api_url: &str) -> Self {
        Self {
            request_token_url: format!("{api_url}/oauth/request_token"),
            access_token_url: format!("{api_url}/oauth/access_token"),
        }
    }
}

/// OAuth1.0 client and resource-owner credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// The app's keystring.
    pub client_key: String,
    /// The app's shared secret.
    pub client_secret: Option<String>,
    /// User token (temporary during the handshake, long-lived afterwards).
    pub resource_owner_key: Option<String>,
    pub resource_owner_secret: Option<String>,
    pub callback_uri: Option<String>,
    pub verifier: Option<String>,
}

impl OAuthCredentials {
    pub fn new(client_key: &str, client_secret: &str) -> Self {
        Self {
            client_key: client_key.to_string(),
            client_secret: Some(client_secret.to_string()),
            ..Self::default()
        }
    }

    pub fn with_resource_owner(mut self, key: &str, secret: &str) -> Self {
        self.resource_owner_key = Some(key.to_string());
        self.resource_owner_secret = Some(secret.to_string());
        self
    }
}

/// Signs a request with OAuth1.0 credentials and executes it.
pub trait OAuthSigner {
    fn send_signed(&self, credentials: &OAuthCredentials, request: HttpRequest)
        -> Result<HttpResponse>;
}

impl<F> OAuthSigner for F
where
    F: Fn(&OAuthCredentials, HttpRequest) -> Result<HttpResponse>,
{
    fn send_signed(
        &self,
        credentials: &OAuthCredentials,
        request: HttpRequest,
    ) -> Result<HttpResponse> {
        self(credentials, request)
    }
}

/// Step one: fetch a temporary token. Returns the login URL for the user
/// and the temporary token secret needed by step three.
pub fn get_request_url_and_token_secret<S>(
    signer: &S,
    endpoints: &OAuthEndpoints,
    api_key: &str,
    shared_secret: &str,
    permission_scopes: &[&str],
    callback_uri: Option<&str>,
) -> Result<(String, String)>
where
    S: OAuthSigner + ?Sized,
{
    let mut url = endpoints.request_token_url.clone();
    if !permission_scopes.is_empty() {
        url.push_str("?scope=");
        url.push_str(&urlencoding::encode(&permission_scopes.join(" ")));
    }

    let mut credentials = OAuthCredentials::new(api_key, shared_secret);
    credentials.callback_uri = callback_uri.map(str::to_string);

    let mut token = fetch_token(signer, &credentials, url)?;
    let login_url = take_field(&mut token, "login_url")?;
    let temp_token_secret = take_field(&mut token, "oauth_token_secret")?;
    Ok((login_url, temp_token_secret))
}

/// Step three, given the URL the provider redirected the user to. The
/// temporary token and verifier are read from its query string.
pub fn get_oauth_token_via_auth_url<S>(
    signer: &S,
    endpoints: &OAuthEndpoints,
    api_key: &str,
    shared_secret: &str,
    temp_token_secret: &str,
    auth_url: &str,
) -> Result<(String, String)>
where
    S: OAuthSigner + ?Sized,
{
    let (temp_token, verifier) = parse_authorization_response(auth_url)?;
    get_oauth_token_via_verifier(
        signer,
        endpoints,
        api_key,
        shared_secret,
        &temp_token,
        temp_token_secret,
        &verifier,
    )
}

/// Step three, given the temporary token and the verifier directly.
pub fn get_oauth_token_via_verifier<S>(
    signer: &S,
    endpoints: &OAuthEndpoints,
    api_key: &str,
    shared_secret: &str,
    temp_token: &str,
    temp_token_secret: &str,
    verifier: &str,
) -> Result<(String, String)>
where
    S: OAuthSigner + ?Sized,
{
    let mut credentials = OAuthCredentials::new(api_key, shared_secret)
        .with_resource_owner(temp_token, temp_token_secret);
    credentials.verifier = Some(verifier.to_string());

    let mut token = fetch_token(signer, &credentials, endpoints.access_token_url.clone())?;
    let oauth_token = take_field(&mut token, "oauth_token")?;
    let oauth_token_secret = take_field(&mut token, "oauth_token_secret")?;
    Ok((oauth_token, oauth_token_secret))
}

/// Extract `(oauth_token, oauth_verifier)` from a redirect URL.
pub fn parse_authorization_response(auth_url: &str) -> Result<(String, String)> {
    let url = url::Url::parse(auth_url)
        .map_err(|e| ApiError::OAuth(format!("invalid authorization URL: {e}")))?;
    let mut params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    let token = take_field(&mut params, "oauth_token")?;
    let verifier = take_field(&mut params, "oauth_verifier")?;
    Ok((token, verifier))
}

fn fetch_token<S>(
    signer: &S,
    credentials: &OAuthCredentials,
    url: String,
) -> Result<HashMap<String, String>>
where
    S: OAuthSigner + ?Sized,
{
    let response = signer.send_signed(credentials, HttpRequest::new(HttpMethod::Post, url))?;
    if !response.is_success() {
        return Err(ApiError::OAuth(format!(
            "Token request failed with code {}, response was '{}'.",
            response.status, response.body
        )));
    }
    Ok(url::form_urlencoded::parse(response.body.as_bytes()).into_owned().collect())
}

fn take_field(fields: &mut HashMap<String, String>, name: &str) -> Result<String> {
    fields
        .remove(name)
        .ok_or_else(|| ApiError::OAuth(format!("response is missing {name}")))
}

/// Assemble a request for `do_oauth_request`: POST data becomes a multipart
/// body, PUT data a urlencoded form, GET/DELETE data a query string.
pub fn build_oauth_request(url: &str, method: HttpMethod, data: Args) -> HttpRequest {
    let body = match method {
        HttpMethod::Post => RequestBody::Multipart(multipart_body(data)),
        HttpMethod::Put => RequestBody::Form(
            data.iter()
                .map(|(k, v)| (k.clone(), v.to_field_string()))
                .collect(),
        ),
        HttpMethod::Get | HttpMethod::Delete => {
            let mut url = url.to_string();
            if !data.is_empty() {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&encode_query(&data));
            }
            return HttpRequest::new(method, url);
        }
    };

    let mut request = HttpRequest::new(method, url);
    request.headers.push(("content-type".to_string(), body.content_type()));
    request.body = Some(body);
    request
}

/// Sends requests signed with a user's long-lived credentials.
#[derive(Debug)]
pub struct OAuthClient<S> {
    signer: S,
    credentials: OAuthCredentials,
    log: LogSink,
}

impl<S: OAuthSigner> OAuthClient<S> {
    pub fn new(
        signer: S,
        client_key: &str,
        client_secret: &str,
        resource_owner_key: &str,
        resource_owner_secret: &str,
    ) -> Self {
        Self {
            signer,
            credentials: OAuthCredentials::new(client_key, client_secret)
                .with_resource_owner(resource_owner_key, resource_owner_secret),
            log: LogSink::default(),
        }
    }

    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    pub fn credentials(&self) -> &OAuthCredentials {
        &self.credentials
    }

    pub fn do_oauth_request(
        &self,
        url: &str,
        method: HttpMethod,
        data: Args,
    ) -> Result<HttpResponse> {
        let request = build_oauth_request(url, method, data);
        let response = self.signer.send_signed(&self.credentials, request)?;
        self.log.debug(&format!(
            "do_oauth_request: {method} {url} -> status {}",
            response.status
        ));
        Ok(response)
    }

    /// Turn this client into a `Transport` for `ApiClient`.
    pub fn into_transport(self) -> SignedTransport<S> {
        SignedTransport {
            signer: self.signer,
            credentials: self.credentials,
        }
    }
}

/// A `Transport` that signs every request.
#[derive(Debug)]
pub struct SignedTransport<S> {
    signer: S,
    credentials: OAuthCredentials,
}

impl<S: OAuthSigner> SignedTransport<S> {
    pub fn new(signer: S, credentials: OAuthCredentials) -> Self {
        Self { signer, credentials }
    }
}

impl<S: OAuthSigner> Transport for SignedTransport<S> {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.signer.send_signed(&self.credentials, request)
    }
}
