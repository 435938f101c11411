//! Method-table records and call arguments.
//!
//! # Design
//! `MethodSpec` mirrors one entry of the server's method table exactly as it
//! is sent (and as it is written to the cache file). Arguments are JSON
//! values, except uploads, which carry their own bytes and file name so the
//! request builder can turn them into multipart file parts.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::http::HttpMethod;

/// One declared remote operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodSpec {
    pub name: String,
    /// URI template with `:name` path placeholders, e.g. `/shops/:shop_id`.
    pub uri: String,
    pub http_method: HttpMethod,
    /// Parameter name to declared type name.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub defaults: BTreeMap<String, Value>,
    #[serde(default)]
    pub visibility: String,
    #[serde(default, rename = "type")]
    pub result_type: String,
    #[serde(default)]
    pub description: String,
}

impl MethodSpec {
    pub fn new(name: &str, uri: &str, http_method: HttpMethod) -> Self {
        Self {
            name: name.to_string(),
            uri: uri.to_string(),
            http_method,
            params: BTreeMap::new(),
            defaults: BTreeMap::new(),
            visibility: String::new(),
            result_type: String::new(),
            description: String::new(),
        }
    }

    pub fn param(mut self, name: &str, type_name: &str) -> Self {
        self.params.insert(name.to_string(), type_name.to_string());
        self
    }
}

// The server sends `null` for methods without params or defaults.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<BTreeMap<String, T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<BTreeMap<String, T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A file to send as a multipart file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }

    /// Read a file from disk; the upload is named after the file's last
    /// path component.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|source| ApiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { file_name, content })
    }
}

/// A single call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Json(Value),
    File(FileUpload),
}

impl ArgValue {
    /// Text used for query strings and plain form fields. Strings are sent
    /// raw, structured values as JSON, uploads by file name.
    pub fn to_field_string(&self) -> String {
        match self {
            ArgValue::Json(Value::String(s)) => s.clone(),
            ArgValue::Json(Value::Null) => String::new(),
            ArgValue::Json(other) => other.to_string(),
            ArgValue::File(file) => file.file_name.clone(),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ArgValue::Json(v) => Some(v),
            ArgValue::File(_) => None,
        }
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::Json(v) => write!(f, "{v}"),
            ArgValue::File(file) => write!(f, "<file {}>", file.file_name),
        }
    }
}

impl From<Value> for ArgValue {
    fn from(v: Value) -> Self {
        ArgValue::Json(v)
    }
}

impl From<FileUpload> for ArgValue {
    fn from(f: FileUpload) -> Self {
        ArgValue::File(f)
    }
}

macro_rules! json_arg_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ArgValue {
                fn from(v: $t) -> Self {
                    ArgValue::Json(Value::from(v))
                }
            }
        )*
    };
}

json_arg_from!(i32, i64, u32, u64, f64, bool, &str, String);

/// Named call arguments, ordered by name.
pub type Args = BTreeMap<String, ArgValue>;

/// Build an `Args` map: `args! { "shop_id" => 42, "title" => "Mug" }`.
#[macro_export]
macro_rules! args {
    () => {
        $crate::types::Args::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut args = $crate::types::Args::new();
        $(
            args.insert(::std::string::String::from($name), $crate::types::ArgValue::from($value));
        )+
        args
    }};
}

/// Decoded response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub count: u64,
    pub results: Vec<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_spec_deserializes_server_shape() {
        let raw = json!({
            "name": "createListing",
            "uri": "/listings",
            "visibility": "private",
            "http_method": "POST",
            "params": {"title": "string", "price": "float", "tags": "array(string)"},
            "defaults": {"materials": null},
            "type": "Listing",
            "description": "Creates a new Listing"
        });
        let spec: MethodSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(spec.name, "createListing");
        assert_eq!(spec.http_method, HttpMethod::Post);
        assert_eq!(spec.params["price"], "float");
        assert_eq!(spec.result_type, "Listing");
        assert_eq!(spec.defaults["materials"], Value::Null);

        let bare: MethodSpec = serde_json::from_value(json!({
            "name": "ping", "uri": "/server/ping", "http_method": "GET",
            "params": null, "defaults": null
        }))
        .unwrap();
        assert!(bare.params.is_empty());
        assert!(bare.defaults.is_empty());
    }

    #[test]
    fn method_spec_optional_fields_default() {
        let raw = json!({"name": "ping", "uri": "/ping", "http_method": "GET"});
        let spec: MethodSpec = serde_json::from_value(raw).unwrap();
        assert!(spec.params.is_empty());
        assert!(spec.description.is_empty());
        let back = serde_json::to_value(&spec).unwrap();
        assert_eq!(back["type"], "");
    }

    #[test]
    fn field_strings() {
        assert_eq!(ArgValue::from("a b").to_field_string(), "a b");
        assert_eq!(ArgValue::from(42).to_field_string(), "42");
        assert_eq!(ArgValue::from(2.5).to_field_string(), "2.5");
        assert_eq!(ArgValue::from(true).to_field_string(), "true");
        assert_eq!(ArgValue::from(json!(["a", "b"])).to_field_string(), r#"["a","b"]"#);
        assert_eq!(ArgValue::from(FileUpload::new("x.png", vec![1])).to_field_string(), "x.png");
    }

    #[test]
    fn args_macro_builds_ordered_map() {
        let args = args! { "b" => 1, "a" => "x" };
        let keys: Vec<_> = args.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(args["b"], ArgValue::Json(json!(1)));
    }

    #[test]
    fn file_upload_open_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listing.jpg");
        std::fs::write(&path, b"jpegdata").unwrap();
        let upload = FileUpload::open(&path).unwrap();
        assert_eq!(upload.file_name, "listing.jpg");
        assert_eq!(upload.content, b"jpegdata");

        let err = FileUpload::open(dir.path().join("missing.jpg")).unwrap_err();
        assert!(matches!(err, ApiError::Io { .. }));
    }

    #[test]
    fn envelope_keeps_extra_fields() {
        let raw = r#"{"count":1,"results":[{"id":1}],"type":"Shop","params":{}}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.count, 1);
        assert_eq!(env.results, vec![json!({"id": 1})]);
        assert_eq!(env.extra["type"], "Shop");
    }
}
