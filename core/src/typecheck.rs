//! Argument validation against the method table's declared parameter types.
//!
//! # Design
//! The server declares parameter types as strings. Primitive names map to
//! fixed predicates; `enum(a, b, c)` is parsed once per distinct type string
//! and cached. Every other type name (`array(string)`, `shop_id_or_name`,
//! `imagefile`, ...) becomes `ParamType::Unvalidated`: the server's complex
//! types are not checked structurally and values pass through unchanged.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::types::{ArgValue, Args};

/// Argument name accepted on every method, used to select optional
/// associations in the response.
pub const INCLUDES: &str = "includes";

/// A parsed parameter type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Float,
    String,
    Boolean,
    /// Allowed terms, trimmed of surrounding whitespace.
    Enum(Vec<String>),
    /// Any type name not understood above; accepted without checks.
    Unvalidated(String),
}

impl ParamType {
    pub fn parse(type_name: &str) -> Self {
        match type_name {
            "int" => ParamType::Int,
            "float" => ParamType::Float,
            "string" => ParamType::String,
            "boolean" => ParamType::Boolean,
            other => match other.strip_prefix("enum(").and_then(|rest| rest.strip_suffix(')')) {
                Some(terms) => {
                    ParamType::Enum(terms.split(',').map(|t| t.trim().to_string()).collect())
                }
                None => ParamType::Unvalidated(other.to_string()),
            },
        }
    }

    /// Whether `value` conforms to this type.
    pub fn check(&self, value: &ArgValue) -> bool {
        match (self, value) {
            (ParamType::Unvalidated(_), _) => true,
            (_, ArgValue::File(_)) => false,
            (ParamType::Int, ArgValue::Json(Value::Number(n))) => n.is_i64() || n.is_u64(),
            (ParamType::Float, ArgValue::Json(Value::Number(_))) => true,
            (ParamType::String, ArgValue::Json(Value::String(_))) => true,
            (ParamType::Boolean, ArgValue::Json(Value::Bool(_))) => true,
            (ParamType::Enum(terms), ArgValue::Json(Value::String(s))) => {
                terms.iter().any(|t| t == s)
            }
            _ => false,
        }
    }
}

/// Validates call arguments, caching parsed type strings.
#[derive(Debug, Default)]
pub struct TypeChecker {
    compiled: HashMap<String, ParamType>,
}

impl TypeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `args` against `params`. Arguments are never modified, so a
    /// rejected call leaves `args` exactly as it was.
    pub fn check(&mut self, params: &BTreeMap<String, String>, args: &Args) -> Result<()> {
        for (name, value) in args.iter() {
            if name == INCLUDES {
                continue;
            }
            let Some(type_name) = params.get(name) else {
                return Err(ApiError::Validation(format!("Unexpected argument: {name}={value}")));
            };
            if !self.compile(type_name).check(value) {
                return Err(ApiError::Validation(format!(
                    "Bad value for parameter {name} of type '{type_name}' - {value}"
                )));
            }
        }
        Ok(())
    }

    fn compile(&mut self, type_name: &str) -> &ParamType {
        self.compiled
            .entry(type_name.to_string())
            .or_insert_with(|| ParamType::parse(type_name))
    }

    /// Number of distinct type strings parsed so far.
    pub fn compiled_len(&self) -> usize {
        self.compiled.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::types::FileUpload;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn check_one(type_name: &str, value: ArgValue) -> Result<()> {
        let mut args = Args::new();
        args.insert("p".to_string(), value);
        TypeChecker::new().check(&params(&[("p", type_name)]), &args)
    }

    #[test]
    fn parse_recognizes_primitives_and_enums() {
        assert_eq!(ParamType::parse("int"), ParamType::Int);
        assert_eq!(ParamType::parse("boolean"), ParamType::Boolean);
        assert_eq!(
            ParamType::parse("enum(a, b ,c)"),
            ParamType::Enum(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(
            ParamType::parse("array(string)"),
            ParamType::Unvalidated("array(string)".into())
        );
        assert_eq!(ParamType::parse("enumish"), ParamType::Unvalidated("enumish".into()));
    }

    #[test]
    fn int_accepts_only_integers() {
        assert!(check_one("int", 3.into()).is_ok());
        assert!(check_one("int", json!(-7).into()).is_ok());
        assert!(check_one("int", 3.5.into()).is_err());
        assert!(check_one("int", "3".into()).is_err());
        assert!(check_one("int", true.into()).is_err());
    }

    #[test]
    fn float_accepts_integers_and_floats() {
        assert!(check_one("float", 3.into()).is_ok());
        assert!(check_one("float", 3.5.into()).is_ok());
        assert!(check_one("float", "3.5".into()).is_err());
    }

    #[test]
    fn string_and_boolean() {
        assert!(check_one("string", "x".into()).is_ok());
        assert!(check_one("string", 1.into()).is_err());
        assert!(check_one("boolean", false.into()).is_ok());
        assert!(check_one("boolean", 1.into()).is_err());
    }

    #[test]
    fn enum_trims_declared_terms_only() {
        let t = "enum(a, b, c)";
        for ok in ["a", "b", "c"] {
            assert!(check_one(t, ok.into()).is_ok(), "{ok}");
        }
        assert!(check_one(t, "d".into()).is_err());
        assert!(check_one(t, " a".into()).is_err());
        assert!(check_one(t, 1.into()).is_err());
    }

    #[test]
    fn unknown_types_pass_through() {
        let file = FileUpload::new("a.png", vec![1, 2]);
        let args = args! { "image" => file.clone(), "tags" => json!(["x"]) };
        TypeChecker::new()
            .check(&params(&[("image", "imagefile"), ("tags", "array(string)")]), &args)
            .unwrap();
        assert_eq!(args["image"], ArgValue::File(file));
        assert_eq!(args["tags"], ArgValue::Json(json!(["x"])));
    }

    #[test]
    fn files_fail_primitive_types() {
        assert!(check_one("string", FileUpload::new("a", Vec::new()).into()).is_err());
    }

    #[test]
    fn unexpected_argument_is_rejected() {
        let args = args! { "nope" => 1 };
        let err = TypeChecker::new().check(&params(&[("p", "int")]), &args).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(err.to_string(), "Unexpected argument: nope=1");
    }

    #[test]
    fn bad_value_message_names_parameter_and_type() {
        let err = check_one("int", "x".into()).unwrap_err();
        assert_eq!(err.to_string(), "Bad value for parameter p of type 'int' - \"x\"");
    }

    #[test]
    fn rejected_value_stays_in_args() {
        let args = args! { "limit" => 10, "n" => "seven" };
        let before = args.clone();
        let err = TypeChecker::new()
            .check(&params(&[("limit", "int"), ("n", "int")]), &args)
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(args, before);
        assert_eq!(args["n"], ArgValue::from("seven"));
    }

    #[test]
    fn param_type_check_borrows_value() {
        let value = ArgValue::from(3);
        assert!(ParamType::Int.check(&value));
        assert!(!ParamType::Boolean.check(&value));
        assert_eq!(value, ArgValue::from(3));
    }

    #[test]
    fn includes_is_always_allowed() {
        let args = args! { "includes" => "Images,Shop" };
        assert!(TypeChecker::new().check(&BTreeMap::new(), &args).is_ok());
    }

    #[test]
    fn compiled_types_are_cached() {
        let mut checker = TypeChecker::new();
        let p = params(&[("a", "enum(x, y)"), ("b", "enum(x, y)"), ("c", "int")]);
        let args = args! { "a" => "x", "b" => "y", "c" => 1 };
        checker.check(&p, &args).unwrap();
        checker.check(&p, &args).unwrap();
        assert_eq!(checker.compiled_len(), 2);
    }
}
