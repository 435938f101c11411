//! A single callable remote operation.
//!
//! # Design
//! `ApiMethod` owns its `MethodSpec` and a lazily compiled list of path
//! parameters. Invoking it splits the caller's arguments into path and
//! request arguments, validates both, renders the concrete path and hands
//! the rest to a `Dispatch` implementation (the owning client).

use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::http::HttpMethod;
use crate::typecheck::TypeChecker;
use crate::types::{Args, MethodSpec};

/// Marker that starts a path placeholder segment in a URI template.
const PATH_MARKER: char = ':';

/// Issues a request for an already validated call.
pub trait Dispatch {
    fn dispatch(&mut self, method: HttpMethod, path: &str, args: Args) -> Result<Vec<Value>>;
}

#[derive(Debug, Clone)]
pub struct ApiMethod {
    spec: MethodSpec,
    path_params: Option<Vec<String>>,
}

impl ApiMethod {
    pub fn new(mut spec: MethodSpec) -> Self {
        // The server's metadata for submitTracking is wrong.
        if spec.name == "submitTracking" {
            spec.params.insert("shop_id".to_string(), "shop_id_or_name".to_string());
            spec.params.insert("receipt_id".to_string(), "int".to_string());
        }
        Self {
            spec,
            path_params: None,
        }
    }

    pub fn spec(&self) -> &MethodSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Human readable description from the method table.
    pub fn doc(&self) -> &str {
        &self.spec.description
    }

    pub fn is_compiled(&self) -> bool {
        self.path_params.is_some()
    }

    /// Path parameter names of the URI template, in order. Compiles on first
    /// use.
    pub fn path_params(&mut self) -> &[String] {
        let uri = &self.spec.uri;
        self.path_params.get_or_insert_with(|| compile_uri(uri)).as_slice()
    }

    /// Validate `args`, render the path and dispatch the call.
    pub fn invoke<D>(
        &mut self,
        checker: &mut TypeChecker,
        dispatcher: &mut D,
        mut args: Args,
    ) -> Result<Vec<Value>>
    where
        D: Dispatch + ?Sized,
    {
        let path_params = self.path_params().to_vec();

        let mut path_args = Args::new();
        for name in path_params {
            let value = args
                .remove(&name)
                .ok_or_else(|| ApiError::MissingArgument(name.clone()))?;
            path_args.insert(name, value);
        }

        checker.check(&self.spec.params, &path_args)?;
        checker.check(&self.spec.params, &args)?;

        let path = render_path(&self.spec.uri, &path_args);
        dispatcher.dispatch(self.spec.http_method, &path, args)
    }
}

/// Ordered path parameter names (without the marker) of a URI template.
pub fn compile_uri(uri: &str) -> Vec<String> {
    uri.split('/')
        .filter_map(|segment| segment.strip_prefix(PATH_MARKER))
        .map(str::to_string)
        .collect()
}

/// Substitute percent-escaped values into the template's placeholder
/// segments. A `/` inside a value is kept as a path separator. Placeholders
/// without a value are left as they are.
pub fn render_path(uri: &str, path_args: &Args) -> String {
    uri.split('/')
        .map(|segment| {
            match segment
                .strip_prefix(PATH_MARKER)
                .and_then(|name| path_args.get(name))
            {
                Some(value) => escape_path_value(&value.to_field_string()),
                None => segment.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn escape_path_value(value: &str) -> String {
    value
        .split('/')
        .map(|piece| urlencoding::encode(piece).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
