//! The validator.
//!
//! Walks a schema tree top-down. At every node it substitutes defaults for
//! absent input, coerces present input, runs the node's rules in
//! declaration order until one fails, and only then descends into
//! children. Failures of sibling fields, array elements and map entries
//! are collected rather than returned early, so one pass reports every
//! violation.
//!
//! # Examples
//!
//! ```
//! use config_schema_core::{object, number, string, validate, Value, ValidationOptions};
//!
//! let schema = object([("a", number()), ("b", string())])?;
//! let errors = validate(&schema, Some(Value::from(serde_json::json!({}))), &ValidationOptions::default())
//!     .unwrap_err();
//!
//! let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
//! assert_eq!(rendered, [
//!     "[a]: expected value of type [number] but got [undefined]",
//!     "[b]: expected value of type [string] but got [undefined]",
//! ]);
//! # Ok::<(), config_schema_core::DefinitionError>(())
//! ```

use std::path::Path as FsPath;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::coerce;
use crate::error::{
    DefinitionError, DefinitionResult, ErrorCode, ErrorDescriptor, Path, ValidationErrors,
    base_message,
};
use crate::rules::Reference;
use crate::schema::{DefaultValue, Presence, Schema, Shape};
use crate::value::{Object, Value};

type NodeResult = Result<Option<Value>, Vec<ErrorDescriptor>>;

/// Options for one validation pass.
///
/// # Example YAML
///
/// ```yaml
/// convert: false
/// presence: optional
/// context:
///   dist: true
///   limits:
///     maxPayload: 1mb
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationOptions {
    /// Enables numeric-string and JSON-string coercion. Byte-size and
    /// duration literals are parsed either way.
    pub convert: bool,
    /// Presence applied to nodes that declare none.
    pub presence: Presence,
    /// Values reachable through [`Reference::context`].
    pub context: Object,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            convert: true,
            presence: Presence::Required,
            context: Object::new(),
        }
    }
}

impl ValidationOptions {
    /// Sets `convert`.
    pub fn with_convert(mut self, convert: bool) -> Self {
        self.convert = convert;
        self
    }

    /// Sets the fallback presence.
    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    /// Adds a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Loads options from a YAML (or JSON) file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::DefinitionError::Io) if the file cannot be
    /// read, or [`Yaml`](crate::DefinitionError::Yaml) if parsing fails.
    pub fn load(path: impl AsRef<FsPath>) -> DefinitionResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses options from YAML text. Blank text yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDefinition`](crate::DefinitionError::InvalidDefinition)
    /// if `presence` is `forbidden`; only `required` and `optional` apply
    /// as a fallback.
    pub fn from_yaml_str(text: &str) -> DefinitionResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let options: Self = serde_yaml::from_str(text)?;
        if options.presence == Presence::Forbidden {
            return Err(DefinitionError::InvalidDefinition(
                "options presence must be [required] or [optional]".to_string(),
            ));
        }
        Ok(options)
    }
}

/// Explicit context handed to every coercer and rule.
pub struct RuleContext<'a> {
    schema: &'a Schema,
    path: &'a Path,
    options: &'a ValidationOptions,
    siblings: Option<&'a Object>,
}

impl<'a> RuleContext<'a> {
    pub(crate) fn new(
        schema: &'a Schema,
        path: &'a Path,
        options: &'a ValidationOptions,
        siblings: Option<&'a Object>,
    ) -> Self {
        Self {
            schema,
            path,
            options,
            siblings,
        }
    }

    /// Node being validated.
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Path of the node being validated.
    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// Options of the current pass.
    pub fn options(&self) -> &'a ValidationOptions {
        self.options
    }

    /// Whether string conversion is enabled.
    pub fn convert(&self) -> bool {
        self.options.convert
    }

    /// Builds an error at the current path.
    pub fn error(&self, code: ErrorCode, message: impl Into<String>) -> ErrorDescriptor {
        ErrorDescriptor::new(code, self.path.clone(), message)
    }

    /// Resolves a reference against the enclosing object's values (already
    /// validated for fields declared earlier) or the options' context.
    pub fn resolve(&self, reference: &Reference) -> Option<Value> {
        let resolved = match reference {
            Reference::Sibling(key) => self.siblings.and_then(|siblings| lookup(siblings, key)),
            Reference::Context(key) => lookup(&self.options.context, key),
        };
        trace!(%reference, found = resolved.is_some(), "resolving reference");
        resolved.cloned()
    }

    /// Validates one map/record entry part at `path`, with presence forced
    /// to required for the whole subtree.
    pub fn validate_entry(
        &self,
        schema: &Schema,
        input: Value,
        path: &Path,
    ) -> Result<Option<Value>, Vec<ErrorDescriptor>> {
        walk(schema, Some(input), path, self.options, None, Presence::Required)
    }
}

fn lookup<'v>(object: &'v Object, key: &str) -> Option<&'v Value> {
    match key.split_once('.') {
        Some((head, rest)) => object.get(head)?.pointer(rest),
        None => object.get(key),
    }
}

/// Validates `input` against `schema`.
///
/// `None` input means the value is absent. On success the result holds the
/// coerced, defaulted value tree, or `None` if the input was absent and
/// the node optional.
pub fn validate(
    schema: &Schema,
    input: Option<Value>,
    options: &ValidationOptions,
) -> Result<Option<Value>, ValidationErrors> {
    walk(schema, input, &Path::root(), options, None, options.presence).map_err(|errors| {
        debug!(errors = errors.len(), kind = %schema.kind(), "validation failed");
        ValidationErrors::new(errors)
    })
}

fn walk(
    schema: &Schema,
    input: Option<Value>,
    path: &Path,
    options: &ValidationOptions,
    siblings: Option<&Object>,
    fallback: Presence,
) -> NodeResult {
    let ctx = RuleContext::new(schema, path, options, siblings);
    let presence = schema.presence().unwrap_or(fallback);

    let Some(raw) = input else {
        return absent(&ctx, presence);
    };

    if presence == Presence::Forbidden {
        return Err(vec![
            ctx.error(ErrorCode::UNKNOWN, "a value wasn't expected to be present")
                .with_context("value", raw),
        ]);
    }

    let mut value = coerce::coerce(&ctx, raw).map_err(|error| vec![error])?;

    // Later rules only ever see a value every earlier rule accepted.
    for rule in schema.rules() {
        if let Some(replaced) = rule.apply(&ctx, &value)? {
            value = replaced;
        }
    }

    match schema.shape() {
        Shape::Leaf => Ok(Some(value)),
        Shape::Object {
            fields,
            allow_unknowns,
        } => walk_object(&ctx, fields, *allow_unknowns, value, fallback).map(Some),
        Shape::Array { items } => walk_array(&ctx, items, value, fallback).map(Some),
    }
}

fn absent(ctx: &RuleContext<'_>, presence: Presence) -> NodeResult {
    if presence == Presence::Forbidden {
        return Ok(None);
    }

    if let Some(default) = ctx.schema().default_value() {
        trace!(path = %ctx.path(), "substituting default value");
        return match default {
            DefaultValue::Value(value) => Ok(Some(value.clone())),
            DefaultValue::Supplier(supplier) => Ok(Some(supplier())),
            DefaultValue::Reference(reference) => ctx.resolve(reference).map(Some).ok_or_else(|| {
                vec![
                    ctx.error(
                        ErrorCode::REF,
                        format!("reference [{reference}] does not resolve to a value"),
                    )
                    .with_context("ref", reference.to_string()),
                ]
            }),
        };
    }

    if presence == Presence::Optional {
        return Ok(None);
    }

    Err(vec![ctx.error(
        ErrorCode::REQUIRED,
        base_message(ctx.schema().kind(), None),
    )])
}

fn walk_object(
    ctx: &RuleContext<'_>,
    fields: &[(String, Arc<Schema>)],
    allow_unknowns: bool,
    value: Value,
    fallback: Presence,
) -> Result<Value, Vec<ErrorDescriptor>> {
    let Value::Object(mut input) = value else {
        return Ok(value);
    };

    let mut siblings = input.clone();
    let mut output = Object::new();
    let mut errors = Vec::new();

    for (name, field) in fields {
        let raw = input.remove(name);
        let path = ctx.path().child(name.as_str());
        match walk(field, raw, &path, ctx.options(), Some(&siblings), fallback) {
            Ok(Some(validated)) => {
                siblings.insert(name.clone(), validated.clone());
                output.insert(name.clone(), validated);
            }
            Ok(None) => {}
            Err(failures) => errors.extend(failures),
        }
    }

    for (key, item) in input {
        if allow_unknowns {
            output.insert(key, item);
            continue;
        }
        errors.push(
            ErrorDescriptor::new(
                ErrorCode::OBJECT_UNKNOWN,
                ctx.path().child(key),
                "definition for this key is missing",
            )
            .with_context("value", item),
        );
    }

    if errors.is_empty() {
        Ok(Value::Object(output))
    } else {
        Err(errors)
    }
}

fn walk_array(
    ctx: &RuleContext<'_>,
    items: &Schema,
    value: Value,
    fallback: Presence,
) -> Result<Value, Vec<ErrorDescriptor>> {
    let Value::Array(elements) = value else {
        return Ok(value);
    };

    let mut output = Vec::with_capacity(elements.len());
    let mut errors = Vec::new();

    for (index, element) in elements.into_iter().enumerate() {
        let path = ctx.path().child(index);
        match walk(items, Some(element), &path, ctx.options(), None, fallback) {
            Ok(Some(validated)) => output.push(validated),
            Ok(None) => {}
            Err(failures) => errors.extend(failures),
        }
    }

    if errors.is_empty() {
        Ok(Value::Array(output))
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{any, array, boolean, bytes, duration, map, number, object, record, string};

    fn input(value: serde_json::Value) -> Option<Value> {
        Some(Value::from(value))
    }

    fn codes(errors: &ValidationErrors) -> Vec<String> {
        errors.iter().map(|e| e.code.to_string()).collect()
    }

    #[test]
    fn test_default_options() {
        let options = ValidationOptions::default();
        assert!(options.convert);
        assert_eq!(options.presence, Presence::Required);
        assert!(options.context.is_empty());
    }

    #[test]
    fn test_options_from_yaml() {
        let options = ValidationOptions::from_yaml_str(
            "convert: false\npresence: optional\ncontext:\n  dist: true\n",
        )
        .unwrap();
        assert!(!options.convert);
        assert_eq!(options.presence, Presence::Optional);
        assert_eq!(options.context.get("dist"), Some(&Value::Bool(true)));

        assert_eq!(
            ValidationOptions::from_yaml_str("").unwrap(),
            ValidationOptions::default()
        );
        assert!(ValidationOptions::from_yaml_str("strict: true").is_err());
    }

    #[test]
    fn test_options_reject_forbidden_presence() {
        assert!(matches!(
            ValidationOptions::from_yaml_str("presence: forbidden\n"),
            Err(DefinitionError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_absent_required_fails_at_root() {
        let errors = number().validate(None).unwrap_err();
        assert_eq!(codes(&errors), ["any.required"]);
        assert!(errors.as_slice()[0].path.is_root());
        assert_eq!(
            errors.to_string(),
            "expected value of type [number] but got [undefined]"
        );
    }

    #[test]
    fn test_absent_optional_yields_nothing() {
        assert_eq!(string().optional().validate(None), Ok(None));

        let options = ValidationOptions::default().with_presence(Presence::Optional);
        assert_eq!(string().validate_with(None, &options), Ok(None));
        assert!(string().required().validate_with(None, &options).is_err());
    }

    #[test]
    fn test_default_is_not_coerced() {
        let schema = number().default("not a number");
        assert_eq!(schema.validate(None), Ok(Some(Value::from("not a number"))));
    }

    #[test]
    fn test_default_supplier_runs_per_call() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let schema = number().default_with(move || {
            Value::from(counter.fetch_add(1, Ordering::SeqCst) + 1)
        });
        assert_eq!(schema.validate(None), Ok(Some(Value::Number(1.0))));
        assert_eq!(schema.validate(None), Ok(Some(Value::Number(2.0))));
        assert_eq!(schema.validate(Value::from(7)), Ok(Some(Value::Number(7.0))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_reference_to_sibling() {
        let schema = object([
            ("host", string()),
            ("publicHost", string().default_ref(Reference::sibling("host"))),
        ])
        .unwrap();
        let output = schema.validate(input(json!({ "host": "localhost" }))).unwrap().unwrap();
        assert_eq!(output.get("publicHost"), Some(&Value::from("localhost")));
    }

    #[test]
    fn test_default_reference_missing_is_ref_error() {
        let schema = string().default_ref(Reference::context("missing"));
        let errors = schema.validate(None).unwrap_err();
        assert_eq!(codes(&errors), ["any.ref"]);
    }

    #[test]
    fn test_forbidden() {
        let schema = object([("legacy", string().forbidden().default("x"))]).unwrap();
        assert_eq!(
            schema.validate(input(json!({}))),
            Ok(Some(Value::from(json!({}))))
        );
        let errors = schema.validate(input(json!({ "legacy": "y" }))).unwrap_err();
        assert_eq!(codes(&errors), ["any.unknown"]);
        assert_eq!(errors.as_slice()[0].path.to_string(), "legacy");
    }

    #[test]
    fn test_null_is_present() {
        assert_eq!(codes(&string().optional().validate(Value::Null).unwrap_err()), ["string.base"]);
        assert_eq!(any().validate(Value::Null), Ok(Some(Value::Null)));
    }

    #[test]
    fn test_unknown_keys_rejected_unless_allowed() {
        let strict = object([("a", number())]).unwrap();
        let errors = strict.validate(input(json!({ "a": 1, "z": 2, "y": 3 }))).unwrap_err();
        assert_eq!(codes(&errors), ["object.unknown", "object.unknown"]);
        assert_eq!(errors.as_slice()[0].to_string(), "[y]: definition for this key is missing");

        let loose = object([("a", number())]).unwrap().allow_unknowns().unwrap();
        let output = loose.validate(input(json!({ "a": "1", "z": "raw" }))).unwrap().unwrap();
        assert_eq!(output, Value::from(json!({ "a": 1, "z": "raw" })));
    }

    #[test]
    fn test_rules_run_before_children() {
        let schema = array(number()).min(3).unwrap();
        let errors = schema.validate(input(json!(["x"]))).unwrap_err();
        assert_eq!(codes(&errors), ["array.min"]);
        assert_eq!(
            errors.to_string(),
            "array size is [1], but cannot be smaller than [3]"
        );
    }

    #[test]
    fn test_rules_stop_at_first_failure() {
        let schema = string()
            .min(5)
            .unwrap()
            .custom(|_| Err("always".to_string()));
        let errors = schema.validate(Value::from("abc")).unwrap_err();
        assert_eq!(codes(&errors), ["string.min"]);

        let errors = schema.validate(Value::from("abcdef")).unwrap_err();
        assert_eq!(codes(&errors), ["any.custom"]);
    }

    #[test]
    fn test_custom_after_entries_sees_only_coerced_maps() {
        let schema = map(string(), number()).custom(|value| {
            let entries = value.as_map().ok_or("expected a map")?;
            match entries.iter().all(|(_, item)| item.as_f64().is_some()) {
                true => Ok(()),
                false => panic!("custom predicate saw an uncoerced entry"),
            }
        });

        let errors = schema
            .validate(input(json!({ "a": "1", "b": "x" })))
            .unwrap_err();
        assert_eq!(codes(&errors), ["map.value"]);
        assert_eq!(errors.to_string(), "[b]: expected value of type [number] but got [string]");

        let output = schema.validate(input(json!({ "a": "1" }))).unwrap().unwrap();
        assert_eq!(output, Value::Map(vec![(Value::from("a"), Value::Number(1.0))]));
    }

    #[test]
    fn test_custom_panic_is_recovered() {
        let schema = number().custom(|_| panic!("boom"));
        let errors = schema.validate(Value::from(1)).unwrap_err();
        assert_eq!(codes(&errors), ["any.custom"]);
        assert_eq!(errors.to_string(), "boom");
    }

    #[test]
    fn test_custom_receives_coerced_value() {
        let schema = number().custom(|value| match value {
            Value::Number(n) if *n > 0.0 => Ok(()),
            _ => Err("must be positive".to_string()),
        });
        assert!(schema.validate(Value::from("5")).is_ok());
        assert!(schema.validate(Value::from("-5")).is_err());
    }

    #[test]
    fn test_bounds() {
        let port = number().min(1).unwrap().max(65535).unwrap();
        assert!(port.validate(Value::from(80)).is_ok());
        assert_eq!(codes(&port.validate(Value::from(0)).unwrap_err()), ["number.min"]);
        assert_eq!(codes(&port.validate(Value::from(70000)).unwrap_err()), ["number.max"]);

        let timeout = duration().max("30s").unwrap();
        assert!(timeout.validate(Value::from("30s")).is_ok());
        let errors = timeout.validate(Value::from("1m")).unwrap_err();
        assert_eq!(errors.to_string(), "Value must be equal to or less than [30s].");

        let name = string().max(3).unwrap();
        assert_eq!(
            name.validate(Value::from("abcd")).unwrap_err().to_string(),
            "value has length [4] but it must have a maximum length of [3]."
        );
    }

    #[test]
    fn test_negative_quantities_pass_without_bounds() {
        assert!(bytes().validate(Value::from("-1kb")).is_ok());
        assert!(duration().validate(Value::from(-5)).is_ok());
        assert_eq!(
            codes(&bytes().min(0).unwrap().validate(Value::from("-1kb")).unwrap_err()),
            ["bytes.min"]
        );
    }

    #[test]
    fn test_reference_limits() {
        let schema = object([
            ("low", number()),
            ("high", number().min(Reference::sibling("low")).unwrap()),
        ])
        .unwrap();
        assert!(schema.validate(input(json!({ "low": "2", "high": 3 }))).is_ok());
        let errors = schema.validate(input(json!({ "low": 5, "high": 3 }))).unwrap_err();
        assert_eq!(codes(&errors), ["number.min"]);
        assert_eq!(errors.as_slice()[0].path.to_string(), "high");

        let missing = schema.validate(input(json!({ "high": 3 }))).unwrap_err();
        assert_eq!(codes(&missing), ["any.required", "any.ref"]);
    }

    #[test]
    fn test_context_reference_limit() {
        let schema = bytes().max(Reference::context("limits.maxPayload")).unwrap();
        let options = ValidationOptions::default()
            .with_context("limits", Value::from(json!({ "maxPayload": "1mb" })));
        assert!(schema.validate_with(Value::from("512kb"), &options).is_ok());
        let errors = schema.validate_with(Value::from("2mb"), &options).unwrap_err();
        assert_eq!(codes(&errors), ["bytes.max"]);

        let bad = ValidationOptions::default().with_context("limits", Value::from(json!({ "maxPayload": true })));
        assert_eq!(codes(&schema.validate_with(Value::from("2mb"), &bad).unwrap_err()), ["any.ref"]);
    }

    #[test]
    fn test_map_entries_aggregate_all_errors() {
        let schema = map(string(), number());
        let errors = schema
            .validate(input(json!({ "a": "x", "b": "1", "c": "y" })))
            .unwrap_err();
        assert_eq!(codes(&errors), ["map.value", "map.value"]);
        let paths: Vec<String> = errors.iter().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, ["a", "c"]);
        assert_eq!(errors.as_slice()[0].context.get("entryKey"), Some(&Value::from("a")));
    }

    #[test]
    fn test_map_keys_are_validated_and_renamed() {
        let schema = map(number(), boolean());
        let output = schema.validate(input(json!({ "1": "true" }))).unwrap().unwrap();
        assert_eq!(output, Value::Map(vec![(Value::Number(1.0), Value::Bool(true))]));

        let errors = schema.validate(input(json!({ "one": true }))).unwrap_err();
        assert_eq!(codes(&errors), ["map.key"]);
        assert_eq!(
            errors.to_string(),
            "[one]: invalid key [one]: expected value of type [number] but got [string]"
        );
    }

    #[test]
    fn test_record_produces_object() {
        let schema = record(string(), duration());
        let output = schema.validate(input(json!({ "ttl": "5m" }))).unwrap().unwrap();
        assert_eq!(output.get("ttl").and_then(Value::as_duration).map(|d| d.as_millis()), Some(300_000));

        let errors = schema.validate(input(json!({ "ttl": "soon" }))).unwrap_err();
        assert_eq!(codes(&errors), ["record.value"]);
    }

    #[test]
    fn test_entries_force_required_presence() {
        let options = ValidationOptions::default().with_presence(Presence::Optional);
        let schema = map(string(), object([("port", number())]).unwrap());
        let errors = schema.validate_with(input(json!({ "a": {} })), &options).unwrap_err();
        assert_eq!(codes(&errors), ["map.value"]);
        assert_eq!(errors.as_slice()[0].path.to_string(), "a.port");
    }

    #[test]
    fn test_empty_composites_are_valid() {
        assert_eq!(map(string(), number()).validate(input(json!({}))), Ok(Some(Value::Map(Vec::new()))));
        assert_eq!(record(string(), number()).validate(input(json!({}))), Ok(Some(Value::from(json!({})))));
        assert_eq!(array(number()).validate(input(json!([]))), Ok(Some(Value::Array(Vec::new()))));
    }

    #[test]
    fn test_nested_paths() {
        let schema = object([(
            "server",
            object([("hosts", array(object([("port", number())]).unwrap()))]).unwrap(),
        )])
        .unwrap();
        let errors = schema
            .validate(input(json!({ "server": { "hosts": [{ "port": 1 }, { "port": "x" }] } })))
            .unwrap_err();
        assert_eq!(
            errors.to_string(),
            "[server.hosts.1.port]: expected value of type [number] but got [string]"
        );
    }
}
