//! Method-table driven client for the Etsy API.
//!
//! # Design
//! `ApiClient` loads the server's method table (through the on-disk cache)
//! and keeps one `ApiMethod` per declared operation in an explicit name map;
//! operations are invoked with `call(name, args)`. Request assembly and
//! response parsing are pure functions (`build_request`, `parse_response`)
//! so they can be tested without a network; the `Dispatcher` glues them to
//! a `Transport` and records the last count, URL and envelope.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::cache::{CacheLocation, MethodTableCache};
use crate::config::{self, ApiConfig};
use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, Transport};
use crate::log::LogSink;
use crate::method::{ApiMethod, Dispatch};
use crate::multipart::MultipartForm;
use crate::typecheck::TypeChecker;
use crate::types::{ArgValue, Args, Envelope, MethodSpec};

/// Name of the parameter carrying the API key on every request.
pub const API_KEY_PARAM: &str = "api_key";

/// Configures and constructs an `ApiClient`.
#[derive(Debug)]
pub struct ApiClientBuilder {
    config: ApiConfig,
    api_key: Option<String>,
    key_file: Option<PathBuf>,
    method_cache: CacheLocation,
    max_age: Option<Duration>,
    log: LogSink,
}

impl ApiClientBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read the API key for the configured version from a key file.
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    pub fn method_cache(mut self, location: CacheLocation) -> Self {
        self.method_cache = location;
        self
    }

    pub fn cache_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn log_sink<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log = LogSink::new(f);
        self
    }

    /// Validate the configuration, load the method table and register one
    /// method per entry.
    pub fn build<T: Transport>(self, transport: T) -> Result<ApiClient<T>> {
        self.config.validate()?;

        let api_key = match (self.api_key.filter(|k| !k.is_empty()), self.key_file) {
            (Some(_), Some(_)) => {
                return Err(ApiError::Configuration(
                    "Keys can be read from a file or passed, but not both.".to_string(),
                ))
            }
            (Some(key), None) => key,
            (None, Some(path)) => config::read_key(&path, &self.config.api_version)?,
            (None, None) => {
                return Err(ApiError::Configuration(
                    "An API key or a key file is required.".to_string(),
                ))
            }
        };

        self.log.info(&format!(
            "Creating {} Etsy API, base url={}.",
            self.config.api_version, self.config.api_url
        ));

        let mut dispatcher = Dispatcher {
            api_url: self.config.api_url.clone(),
            api_key,
            transport,
            count: None,
            last_url: None,
            last_envelope: None,
            log: self.log.clone(),
        };

        let mut cache = MethodTableCache::new(self.method_cache, &self.config, self.log.clone());
        if let Some(max_age) = self.max_age {
            cache = cache.with_max_age(max_age);
        }
        let specs = cache.get(|| fetch_method_table(&mut dispatcher))?;
        let methods = register_methods(specs)?;

        Ok(ApiClient {
            config: self.config,
            dispatcher,
            type_checker: TypeChecker::new(),
            methods,
            cache,
        })
    }
}

/// A client whose operations come from the server's method table.
#[derive(Debug)]
pub struct ApiClient<T> {
    config: ApiConfig,
    dispatcher: Dispatcher<T>,
    type_checker: TypeChecker,
    methods: BTreeMap<String, ApiMethod>,
    cache: MethodTableCache,
}

impl ApiClient<()> {
    pub fn builder(config: ApiConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            api_key: None,
            key_file: None,
            method_cache: CacheLocation::Default,
            max_age: None,
            log: LogSink::default(),
        }
    }
}

impl<T: Transport> ApiClient<T> {
    /// Invoke the declared operation `name`.
    pub fn call(&mut self, name: &str, args: Args) -> Result<Vec<Value>> {
        let method = self
            .methods
            .get_mut(name)
            .ok_or_else(|| ApiError::UnknownMethod(name.to_string()))?;
        method.invoke(&mut self.type_checker, &mut self.dispatcher, args)
    }

    /// Send a request for `path` without consulting the method table.
    pub fn request(&mut self, method: HttpMethod, path: &str, args: Args) -> Result<Vec<Value>> {
        self.dispatcher.dispatch(method, path, args)
    }

    /// Fetch the method table from the server, bypassing the cache.
    pub fn get_method_table(&mut self) -> Result<Vec<MethodSpec>> {
        fetch_method_table(&mut self.dispatcher)
    }
}

impl<T> ApiClient<T> {
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn api_key(&self) -> &str {
        &self.dispatcher.api_key
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn method(&self, name: &str) -> Option<&ApiMethod> {
        self.methods.get(name)
    }

    pub fn method_spec(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.get(name).map(ApiMethod::spec)
    }

    /// `count` of the last decoded response.
    pub fn count(&self) -> Option<u64> {
        self.dispatcher.count
    }

    /// Final URL of the last request, query string included.
    pub fn last_url(&self) -> Option<&str> {
        self.dispatcher.last_url.as_deref()
    }

    pub fn last_envelope(&self) -> Option<&Envelope> {
        self.dispatcher.last_envelope.as_ref()
    }

    pub fn cache(&self) -> &MethodTableCache {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.dispatcher.transport
    }
}

/// Issues API requests for an `ApiClient`.
#[derive(Debug)]
pub struct Dispatcher<T> {
    api_url: String,
    api_key: String,
    transport: T,
    count: Option<u64>,
    last_url: Option<String>,
    last_envelope: Option<Envelope>,
    log: LogSink,
}

impl<T: Transport> Dispatch for Dispatcher<T> {
    fn dispatch(&mut self, method: HttpMethod, path: &str, mut args: Args) -> Result<Vec<Value>> {
        args.insert(API_KEY_PARAM.to_string(), ArgValue::from(self.api_key.as_str()));

        let request = build_request(&self.api_url, method, path, args);
        let url = request.url.clone();
        self.last_url = Some(url.clone());
        self.log.debug(&format!("API request: http_method = {method}, url = {url}"));

        let response = self.transport.execute(request)?;
        let envelope = parse_response(response, &url)?;

        self.count = Some(envelope.count);
        let results = envelope.results.clone();
        self.last_envelope = Some(envelope);
        Ok(results)
    }
}

fn fetch_method_table<D: Dispatch + ?Sized>(dispatcher: &mut D) -> Result<Vec<MethodSpec>> {
    dispatcher
        .dispatch(HttpMethod::Get, "/", Args::new())?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(ApiError::InvalidMethodTable))
        .collect()
}

fn register_methods(specs: Vec<MethodSpec>) -> Result<BTreeMap<String, ApiMethod>> {
    let mut methods = BTreeMap::new();
    for spec in specs {
        if methods.contains_key(&spec.name) {
            return Err(ApiError::Configuration(format!(
                "Duplicate method name in method table: {}",
                spec.name
            )));
        }
        methods.insert(spec.name.clone(), ApiMethod::new(spec));
    }
    Ok(methods)
}

/// Form-urlencode `args` as a query string (no leading `?`).
pub fn encode_query(args: &Args) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(args.iter().map(|(k, v)| (k, v.to_field_string())))
        .finish()
}

/// Multipart body with a file part for every upload and a text part for
/// everything else.
pub fn multipart_body(args: Args) -> MultipartForm {
    args.into_iter().fold(MultipartForm::new(), |form, (name, value)| match value {
        ArgValue::File(file) => form.file(name, file.file_name, file.content),
        other => form.text(name, other.to_field_string()),
    })
}

/// Assemble the request for `api_url + path`. GET/DELETE put every argument
/// in the query string; POST/PUT send them as a multipart body.
pub fn build_request(api_url: &str, method: HttpMethod, path: &str, args: Args) -> HttpRequest {
    let mut url = format!("{api_url}{path}");
    if method.uses_query() {
        if !args.is_empty() {
            url.push('?');
            url.push_str(&encode_query(&args));
        }
        return HttpRequest::new(method, url);
    }

    let body = RequestBody::Multipart(multipart_body(args));
    let mut request = HttpRequest::new(method, url);
    request.headers.push(("content-type".to_string(), body.content_type()));
    request.body = Some(body);
    request
}

/// Decode the JSON envelope of a response to a request for `url`.
pub fn parse_response(response: HttpResponse, url: &str) -> Result<Envelope> {
    let decoded = serde_json::from_str::<Value>(&response.body)
        .and_then(serde_json::from_value::<Envelope>);
    decoded.map_err(|source| ApiError::Decode {
        status: response.status,
        body: response.body,
        url: url.to_string(),
        source,
    })
}
