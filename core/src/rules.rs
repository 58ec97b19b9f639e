//! Rule registry and built-in rules.
//!
//! Rules are named checks attached to a schema node after coercion. Each
//! [`RuleDefinition`] is keyed by `(kind, name)`; a lookup that misses for
//! the node's kind falls back to [`Kind::Any`], which is where `custom`
//! lives. Arguments are checked against their [`ArgSpec`] when the rule is
//! attached, so a malformed limit is a [`DefinitionError`] at build time
//! rather than a validation failure.
//!
//! # Examples
//!
//! ```
//! use config_schema_core::{
//!     ArgAssertion, ArgSpec, ErrorCode, Kind, RuleArg, RuleDefinition, RuleRegistry, Value,
//!     string,
//! };
//!
//! static ARGS: [ArgSpec; 1] = [ArgSpec {
//!     name: "prefix",
//!     allows_ref: false,
//!     assertion: ArgAssertion::Any,
//! }];
//!
//! let mut registry = RuleRegistry::with_builtins();
//! registry.register(RuleDefinition {
//!     kind: Kind::String,
//!     name: "prefix",
//!     args: &ARGS,
//!     check: |ctx, value, args| match (value, &args[0]) {
//!         (Value::String(s), RuleArg::Value(Value::String(p))) if !s.starts_with(p.as_str()) => {
//!             Err(vec![ctx.error(ErrorCode::new(Kind::String, "prefix"), format!("must start with [{p}]"))])
//!         }
//!         _ => Ok(None),
//!     },
//! })?;
//!
//! let schema = string().rule_in(&registry, "prefix", vec![RuleArg::from("/")])?;
//! assert!(schema.validate(Value::from("/srv")).is_ok());
//! assert!(schema.validate(Value::from("srv")).is_err());
//! # Ok::<(), config_schema_core::DefinitionError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

use tracing::{debug, trace};

use crate::byte_size::ByteSizeValue;
use crate::duration::DurationValue;
use crate::error::{DefinitionError, DefinitionResult, ErrorCode, ErrorDescriptor};
use crate::schema::{Kind, Schema};
use crate::validate::RuleContext;
use crate::value::{Object, Value};

/// Name of the map/record entries rule.
pub(crate) const ENTRIES: &str = "entries";

static STANDARD: LazyLock<RuleRegistry> = LazyLock::new(RuleRegistry::with_builtins);

/// Caller-supplied check used by the `custom` rule.
pub type Predicate = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Outcome of a rule check: `Ok(Some(v))` replaces the value, `Ok(None)`
/// keeps it.
pub type RuleResult = Result<Option<Value>, Vec<ErrorDescriptor>>;

/// Rule implementation. Arguments arrive normalized and with references
/// already resolved.
pub type RuleCheck = fn(&RuleContext<'_>, &Value, &[RuleArg]) -> RuleResult;

/// Deferred value resolved at validation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// Key (dotted for nesting) of the enclosing object's input.
    Sibling(String),
    /// Key (dotted for nesting) of [`ValidationOptions::context`](crate::ValidationOptions::context).
    Context(String),
}

impl Reference {
    /// References a sibling field.
    pub fn sibling(key: impl Into<String>) -> Self {
        Reference::Sibling(key.into())
    }

    /// References a validation context entry.
    pub fn context(key: impl Into<String>) -> Self {
        Reference::Context(key.into())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Sibling(key) => write!(f, "ref:{key}"),
            Reference::Context(key) => write!(f, "context:{key}"),
        }
    }
}

/// Argument passed to a rule.
#[derive(Clone)]
pub enum RuleArg {
    Value(Value),
    Ref(Reference),
    Predicate(Predicate),
    Schema(Arc<Schema>),
}

impl fmt::Debug for RuleArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleArg::Value(value) => f.debug_tuple("Value").field(value).finish(),
            RuleArg::Ref(reference) => f.debug_tuple("Ref").field(reference).finish(),
            RuleArg::Predicate(_) => f.write_str("Predicate(..)"),
            RuleArg::Schema(schema) => f.debug_tuple("Schema").field(&schema.kind()).finish(),
        }
    }
}

macro_rules! rule_arg_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for RuleArg {
                fn from(value: $ty) -> Self {
                    RuleArg::Value(Value::from(value))
                }
            }
        )*
    };
}

rule_arg_from_value!(
    bool,
    f64,
    i32,
    i64,
    u32,
    u64,
    &str,
    String,
    ByteSizeValue,
    DurationValue,
);

impl From<Value> for RuleArg {
    fn from(value: Value) -> Self {
        RuleArg::Value(value)
    }
}

impl From<usize> for RuleArg {
    fn from(value: usize) -> Self {
        RuleArg::Value(Value::Number(value as f64))
    }
}

impl From<Reference> for RuleArg {
    fn from(reference: Reference) -> Self {
        RuleArg::Ref(reference)
    }
}

impl From<Schema> for RuleArg {
    fn from(schema: Schema) -> Self {
        RuleArg::Schema(Arc::new(schema))
    }
}

/// Constraint an argument must satisfy. Value assertions also normalize:
/// `"1kb"` becomes a byte-size, `1500` a duration, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgAssertion {
    /// Any plain value.
    Any,
    /// Byte-size literal, byte count or byte-size.
    ByteSize,
    /// Duration literal, millisecond count or duration.
    Duration,
    /// Finite number.
    Number,
    /// Non-negative integer.
    Length,
    /// Predicate function.
    Predicate,
    /// Schema.
    Schema,
}

impl ArgAssertion {
    /// Checks and normalizes `arg`. References pass through untouched.
    pub fn check(self, arg: &RuleArg) -> Result<RuleArg, String> {
        match (self, arg) {
            (ArgAssertion::Predicate, RuleArg::Predicate(_))
            | (ArgAssertion::Schema, RuleArg::Schema(_))
            | (_, RuleArg::Ref(_)) => Ok(arg.clone()),
            (ArgAssertion::Predicate, _) => Err("expected a predicate".to_string()),
            (ArgAssertion::Schema, _) => Err("expected a schema".to_string()),
            (_, RuleArg::Value(value)) => self.normalize(value).map(RuleArg::Value),
            (_, _) => Err("expected a value".to_string()),
        }
    }

    fn normalize(self, value: &Value) -> Result<Value, String> {
        match (self, value) {
            (ArgAssertion::Any, _) => Ok(value.clone()),
            (ArgAssertion::ByteSize, Value::Bytes(_)) => Ok(value.clone()),
            (ArgAssertion::ByteSize, Value::Number(n)) => ByteSizeValue::from_number(*n)
                .map(Value::Bytes)
                .map_err(|e| e.to_string()),
            (ArgAssertion::ByteSize, Value::String(s)) => ByteSizeValue::parse(s)
                .map(Value::Bytes)
                .map_err(|e| e.to_string()),
            (ArgAssertion::Duration, Value::Duration(_)) => Ok(value.clone()),
            (ArgAssertion::Duration, Value::Number(n)) => DurationValue::from_number(*n)
                .map(Value::Duration)
                .map_err(|e| e.to_string()),
            (ArgAssertion::Duration, Value::String(s)) => DurationValue::parse(s)
                .map(Value::Duration)
                .map_err(|e| e.to_string()),
            (ArgAssertion::Number, Value::Number(n)) if n.is_finite() => Ok(value.clone()),
            (ArgAssertion::Length, Value::Number(n))
                if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 =>
            {
                Ok(value.clone())
            }
            (ArgAssertion::ByteSize, _) => Err(format!("expected a byte size, got [{value}]")),
            (ArgAssertion::Duration, _) => Err(format!("expected a duration, got [{value}]")),
            (ArgAssertion::Number, _) => Err(format!("expected a finite number, got [{value}]")),
            (ArgAssertion::Length, _) => {
                Err(format!("expected a non-negative integer, got [{value}]"))
            }
            (ArgAssertion::Predicate | ArgAssertion::Schema, _) => {
                Err("expected a value".to_string())
            }
        }
    }
}

/// Declared shape of one rule argument.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    /// Whether a [`Reference`] may stand in for the argument.
    pub allows_ref: bool,
    pub assertion: ArgAssertion,
}

/// A named rule for one kind.
#[derive(Clone, Copy)]
pub struct RuleDefinition {
    pub kind: Kind,
    pub name: &'static str,
    pub args: &'static [ArgSpec],
    pub check: RuleCheck,
}

impl fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl RuleDefinition {
    /// Binds arguments, checking them against the argument specs.
    pub fn instantiate(&self, args: Vec<RuleArg>) -> DefinitionResult<RuleInstance> {
        let invalid = |arg: &'static str, reason: String| DefinitionError::InvalidRuleArgument {
            kind: self.kind,
            rule: self.name,
            arg,
            reason,
        };

        if args.len() != self.args.len() {
            return Err(invalid(
                "arguments",
                format!("expected {} argument(s), got {}", self.args.len(), args.len()),
            ));
        }

        let args = self
            .args
            .iter()
            .zip(&args)
            .map(|(spec, arg)| {
                if matches!(arg, RuleArg::Ref(_)) && !spec.allows_ref {
                    return Err(invalid(spec.name, "references are not allowed".to_string()));
                }
                spec.assertion
                    .check(arg)
                    .map_err(|reason| invalid(spec.name, reason))
            })
            .collect::<DefinitionResult<Vec<_>>>()?;

        Ok(RuleInstance {
            definition: *self,
            args,
        })
    }
}

/// A rule bound to its arguments on a schema node.
#[derive(Debug, Clone)]
pub struct RuleInstance {
    definition: RuleDefinition,
    args: Vec<RuleArg>,
}

impl RuleInstance {
    /// Rule name.
    pub fn name(&self) -> &'static str {
        self.definition.name
    }

    /// Kind the rule was registered for.
    pub fn kind(&self) -> Kind {
        self.definition.kind
    }

    /// Normalized arguments, references unresolved.
    pub fn args(&self) -> &[RuleArg] {
        &self.args
    }

    pub(crate) fn apply(&self, ctx: &RuleContext<'_>, value: &Value) -> RuleResult {
        let args = self.resolve_args(ctx)?;
        match (self.definition.check)(ctx, value, &args) {
            Err(failures) if failures.is_empty() => {
                let name = self.definition.name;
                Err(vec![
                    ctx.error(
                        ErrorCode::new(ctx.schema().kind(), name),
                        format!("value failed rule [{name}]"),
                    )
                    .with_context("value", value.clone()),
                ])
            }
            result => result,
        }
    }

    fn resolve_args(&self, ctx: &RuleContext<'_>) -> Result<Vec<RuleArg>, Vec<ErrorDescriptor>> {
        self.args
            .iter()
            .zip(self.definition.args)
            .map(|(arg, spec)| {
                let RuleArg::Ref(reference) = arg else {
                    return Ok(arg.clone());
                };
                let resolved = ctx.resolve(reference).ok_or_else(|| {
                    vec![
                        ctx.error(
                            ErrorCode::REF,
                            format!("reference [{reference}] does not resolve to a value"),
                        )
                        .with_context("ref", reference.to_string()),
                    ]
                })?;
                trace!(%reference, rule = self.definition.name, "resolved rule argument");
                spec.assertion
                    .check(&RuleArg::Value(resolved))
                    .map_err(|reason| {
                        vec![
                            ctx.error(ErrorCode::REF, format!("reference [{reference}]: {reason}"))
                                .with_context("ref", reference.to_string()),
                        ]
                    })
            })
            .collect()
    }
}

/// Rule table keyed by `(kind, name)`.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<Kind, HashMap<&'static str, RuleDefinition>>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in rule.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for definition in BUILTIN_RULES {
            registry
                .register(*definition)
                .expect("built-in rule table must not repeat (kind, name)");
        }
        registry
    }

    /// The shared built-in registry.
    pub fn standard() -> &'static RuleRegistry {
        &STANDARD
    }

    /// Adds a rule. Names are unique per kind.
    pub fn register(&mut self, definition: RuleDefinition) -> DefinitionResult<()> {
        let rules = self.rules.entry(definition.kind).or_default();
        if rules.contains_key(definition.name) {
            return Err(DefinitionError::DuplicateRule {
                kind: definition.kind,
                rule: definition.name,
            });
        }
        rules.insert(definition.name, definition);
        debug!(kind = %definition.kind, rule = definition.name, "registered rule");
        Ok(())
    }

    /// Finds `name` for `kind`, falling back to rules registered for `any`.
    pub fn lookup(&self, kind: Kind, name: &str) -> Option<&RuleDefinition> {
        self.rules
            .get(&kind)
            .and_then(|rules| rules.get(name))
            .or_else(|| self.rules.get(&Kind::Any).and_then(|rules| rules.get(name)))
    }

    /// Rule names available to `kind`, including those inherited from `any`.
    pub fn names_for(&self, kind: Kind) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = [kind, Kind::Any]
            .iter()
            .filter_map(|k| self.rules.get(k))
            .flat_map(|rules| rules.keys().copied())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

const PREDICATE_ARGS: [ArgSpec; 1] = [ArgSpec {
    name: "predicate",
    allows_ref: false,
    assertion: ArgAssertion::Predicate,
}];

const ENTRIES_ARGS: [ArgSpec; 2] = [
    ArgSpec {
        name: "key",
        allows_ref: false,
        assertion: ArgAssertion::Schema,
    },
    ArgSpec {
        name: "value",
        allows_ref: false,
        assertion: ArgAssertion::Schema,
    },
];

const fn limit_args(assertion: ArgAssertion) -> [ArgSpec; 1] {
    [ArgSpec {
        name: "limit",
        allows_ref: true,
        assertion,
    }]
}

const BYTE_SIZE_LIMIT: [ArgSpec; 1] = limit_args(ArgAssertion::ByteSize);
const DURATION_LIMIT: [ArgSpec; 1] = limit_args(ArgAssertion::Duration);
const NUMBER_LIMIT: [ArgSpec; 1] = limit_args(ArgAssertion::Number);
const LENGTH_LIMIT: [ArgSpec; 1] = limit_args(ArgAssertion::Length);

const CUSTOM: RuleDefinition = RuleDefinition {
    kind: Kind::Any,
    name: "custom",
    args: &PREDICATE_ARGS,
    check: check_custom,
};

const MAP_ENTRIES: RuleDefinition = RuleDefinition {
    kind: Kind::Map,
    name: ENTRIES,
    args: &ENTRIES_ARGS,
    check: check_entries,
};

const RECORD_ENTRIES: RuleDefinition = RuleDefinition {
    kind: Kind::Record,
    name: ENTRIES,
    args: &ENTRIES_ARGS,
    check: check_entries,
};

const BUILTIN_RULES: &[RuleDefinition] = &[
    CUSTOM,
    RuleDefinition {
        kind: Kind::Bytes,
        name: "min",
        args: &BYTE_SIZE_LIMIT,
        check: check_min,
    },
    RuleDefinition {
        kind: Kind::Bytes,
        name: "max",
        args: &BYTE_SIZE_LIMIT,
        check: check_max,
    },
    RuleDefinition {
        kind: Kind::Duration,
        name: "min",
        args: &DURATION_LIMIT,
        check: check_min,
    },
    RuleDefinition {
        kind: Kind::Duration,
        name: "max",
        args: &DURATION_LIMIT,
        check: check_max,
    },
    RuleDefinition {
        kind: Kind::Number,
        name: "min",
        args: &NUMBER_LIMIT,
        check: check_min,
    },
    RuleDefinition {
        kind: Kind::Number,
        name: "max",
        args: &NUMBER_LIMIT,
        check: check_max,
    },
    RuleDefinition {
        kind: Kind::String,
        name: "min",
        args: &LENGTH_LIMIT,
        check: check_length_min,
    },
    RuleDefinition {
        kind: Kind::String,
        name: "max",
        args: &LENGTH_LIMIT,
        check: check_length_max,
    },
    RuleDefinition {
        kind: Kind::Array,
        name: "min",
        args: &LENGTH_LIMIT,
        check: check_length_min,
    },
    RuleDefinition {
        kind: Kind::Array,
        name: "max",
        args: &LENGTH_LIMIT,
        check: check_length_max,
    },
    MAP_ENTRIES,
    RECORD_ENTRIES,
];

pub(crate) fn custom_rule(predicate: Predicate) -> RuleInstance {
    RuleInstance {
        definition: CUSTOM,
        args: vec![RuleArg::Predicate(predicate)],
    }
}

pub(crate) fn entries_rule(kind: Kind, key: Schema, value: Schema) -> RuleInstance {
    let definition = if kind == Kind::Record {
        RECORD_ENTRIES
    } else {
        MAP_ENTRIES
    };
    RuleInstance {
        definition,
        args: vec![
            RuleArg::Schema(Arc::new(key)),
            RuleArg::Schema(Arc::new(value)),
        ],
    }
}

fn check_custom(ctx: &RuleContext<'_>, value: &Value, args: &[RuleArg]) -> RuleResult {
    let Some(RuleArg::Predicate(predicate)) = args.first() else {
        return Ok(None);
    };

    let message = match panic::catch_unwind(AssertUnwindSafe(|| predicate(value))) {
        Ok(Ok(())) => return Ok(None),
        Ok(Err(message)) => message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "custom validation panicked".to_string()),
    };

    Err(vec![
        ctx.error(ErrorCode::CUSTOM, message)
            .with_context("value", value.clone()),
    ])
}

/// Orders a coerced value against a normalized limit of the same kind.
fn compare(value: &Value, limit: &Value) -> Option<std::cmp::Ordering> {
    match (value, limit) {
        (Value::Bytes(v), Value::Bytes(l)) => Some(v.cmp(l)),
        (Value::Duration(v), Value::Duration(l)) => Some(v.cmp(l)),
        (Value::Number(v), Value::Number(l)) => v.partial_cmp(l),
        _ => None,
    }
}

fn check_bound(
    ctx: &RuleContext<'_>,
    value: &Value,
    args: &[RuleArg],
    subkind: &'static str,
    violated: std::cmp::Ordering,
    relation: &str,
) -> RuleResult {
    let Some(RuleArg::Value(limit)) = args.first() else {
        return Ok(None);
    };
    if compare(value, limit) != Some(violated) {
        return Ok(None);
    }

    let code = ErrorCode::new(ctx.schema().kind(), subkind);
    Err(vec![
        ctx.error(
            code,
            format!("Value must be equal to or {relation} than [{limit}]."),
        )
        .with_context("value", value.clone())
        .with_context("limit", limit.clone()),
    ])
}

fn check_min(ctx: &RuleContext<'_>, value: &Value, args: &[RuleArg]) -> RuleResult {
    check_bound(ctx, value, args, "min", std::cmp::Ordering::Less, "greater")
}

fn check_max(ctx: &RuleContext<'_>, value: &Value, args: &[RuleArg]) -> RuleResult {
    check_bound(ctx, value, args, "max", std::cmp::Ordering::Greater, "less")
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn length_limit(args: &[RuleArg]) -> Option<usize> {
    match args.first() {
        Some(RuleArg::Value(Value::Number(n))) => Some(*n as usize),
        _ => None,
    }
}

fn length_error(
    ctx: &RuleContext<'_>,
    subkind: &'static str,
    length: usize,
    limit: usize,
) -> Vec<ErrorDescriptor> {
    let kind = ctx.schema().kind();
    let message = match (kind, subkind) {
        (Kind::Array, "min") => {
            format!("array size is [{length}], but cannot be smaller than [{limit}]")
        }
        (Kind::Array, _) => {
            format!("array size is [{length}], but cannot be greater than [{limit}]")
        }
        (_, "min") => {
            format!("value has length [{length}] but it must have a minimum length of [{limit}].")
        }
        _ => {
            format!("value has length [{length}] but it must have a maximum length of [{limit}].")
        }
    };
    vec![
        ctx.error(ErrorCode::new(kind, subkind), message)
            .with_context("length", length as u64)
            .with_context("limit", limit as u64),
    ]
}

fn check_length_min(ctx: &RuleContext<'_>, value: &Value, args: &[RuleArg]) -> RuleResult {
    match (length_of(value), length_limit(args)) {
        (Some(length), Some(limit)) if length < limit => {
            Err(length_error(ctx, "min", length, limit))
        }
        _ => Ok(None),
    }
}

fn check_length_max(ctx: &RuleContext<'_>, value: &Value, args: &[RuleArg]) -> RuleResult {
    match (length_of(value), length_limit(args)) {
        (Some(length), Some(limit)) if length > limit => {
            Err(length_error(ctx, "max", length, limit))
        }
        _ => Ok(None),
    }
}

/// Validates every entry of a map or record, collecting all key and value
/// failures. Keys are replaced by their validated form.
fn check_entries(ctx: &RuleContext<'_>, value: &Value, args: &[RuleArg]) -> RuleResult {
    let (Some(RuleArg::Schema(key_schema)), Some(RuleArg::Schema(value_schema))) =
        (args.first(), args.get(1))
    else {
        return Ok(None);
    };

    let entries: Vec<(Value, &Value)> = match value {
        Value::Map(entries) => entries.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Object(map) => map.iter().map(|(k, v)| (Value::from(k.as_str()), v)).collect(),
        _ => return Ok(None),
    };

    let kind = ctx.schema().kind();
    let mut validated = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();

    for (entry_key, entry_value) in entries {
        let entry_path = ctx.path().child(entry_key.to_string());

        let key = match ctx.validate_entry(key_schema, entry_key.clone(), &entry_path) {
            Ok(key) => key,
            Err(failures) => {
                errors.extend(failures.into_iter().map(|failure| {
                    entry_error(ErrorCode::new(kind, "key"), &entry_key, failure, |message| {
                        format!("invalid key [{entry_key}]: {message}")
                    })
                }));
                None
            }
        };

        let item = match ctx.validate_entry(value_schema, entry_value.clone(), &entry_path) {
            Ok(item) => item,
            Err(failures) => {
                errors.extend(failures.into_iter().map(|failure| {
                    entry_error(ErrorCode::new(kind, "value"), &entry_key, failure, |message| {
                        message.to_string()
                    })
                }));
                None
            }
        };

        if let (Some(key), Some(item)) = (key, item) {
            insert_entry(&mut validated, key, item);
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let output = match kind {
        Kind::Record => Value::Object(
            validated
                .into_iter()
                .map(|(key, item)| (key.to_string(), item))
                .collect::<Object>(),
        ),
        _ => Value::Map(validated),
    };
    Ok(Some(output))
}

/// Keys that coerce to the same value collapse into one entry: the first
/// position is kept and the last value wins.
fn insert_entry(entries: &mut Vec<(Value, Value)>, key: Value, item: Value) {
    match entries.iter_mut().find(|(existing, _)| *existing == key) {
        Some(slot) => slot.1 = item,
        None => entries.push((key, item)),
    }
}

fn entry_error(
    code: ErrorCode,
    entry_key: &Value,
    failure: ErrorDescriptor,
    message: impl FnOnce(&str) -> String,
) -> ErrorDescriptor {
    let message = message(&failure.message);
    ErrorDescriptor::new(code, failure.path, message)
        .with_context("entryKey", entry_key.clone())
        .with_context("reason", failure.code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{bytes, map, number, string};

    #[test]
    fn test_standard_registry_lookup() {
        let registry = RuleRegistry::standard();
        assert_eq!(registry.lookup(Kind::Bytes, "min").unwrap().kind, Kind::Bytes);
        assert_eq!(registry.lookup(Kind::String, "custom").unwrap().kind, Kind::Any);
        assert!(registry.lookup(Kind::Boolean, "min").is_none());
        assert!(registry.lookup(Kind::Map, "entries").is_some());
        assert!(registry.lookup(Kind::Object, "entries").is_none());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = RuleRegistry::with_builtins();
        let result = registry.register(CUSTOM);
        assert!(matches!(
            result,
            Err(DefinitionError::DuplicateRule { kind: Kind::Any, rule: "custom" })
        ));
    }

    #[test]
    fn test_same_name_for_different_kinds_is_allowed() {
        let mut registry = RuleRegistry::new();
        registry
            .register(RuleDefinition {
                kind: Kind::Number,
                name: "min",
                args: &NUMBER_LIMIT,
                check: check_min,
            })
            .unwrap();
        registry
            .register(RuleDefinition {
                kind: Kind::String,
                name: "min",
                args: &LENGTH_LIMIT,
                check: check_length_min,
            })
            .unwrap();
        assert_eq!(registry.names_for(Kind::Number), ["min"]);
    }

    #[test]
    fn test_names_for_includes_any() {
        let names = RuleRegistry::standard().names_for(Kind::Bytes);
        assert_eq!(names, ["custom", "max", "min"]);
    }

    #[test]
    fn test_limits_are_normalized_at_construction() {
        let schema = bytes().min("1kb").unwrap();
        match schema.rules()[0].args() {
            [RuleArg::Value(Value::Bytes(limit))] => assert_eq!(limit.bytes(), 1024),
            other => panic!("unexpected args: {other:?}"),
        }
    }

    #[test]
    fn test_reference_limit_requires_allows_ref() {
        assert!(number().min(Reference::sibling("floor")).is_ok());

        let result = CUSTOM.instantiate(vec![RuleArg::Ref(Reference::sibling("x"))]);
        assert!(matches!(
            result,
            Err(DefinitionError::InvalidRuleArgument { arg: "predicate", .. })
        ));
    }

    #[test]
    fn test_wrong_argument_count() {
        let result = MAP_ENTRIES.instantiate(vec![RuleArg::from(string())]);
        assert!(matches!(
            result,
            Err(DefinitionError::InvalidRuleArgument { arg: "arguments", .. })
        ));
    }

    #[test]
    fn test_empty_failure_list_still_fails() {
        let mut registry = RuleRegistry::with_builtins();
        registry
            .register(RuleDefinition {
                kind: Kind::String,
                name: "never",
                args: &[],
                check: |_, _, _| Err(Vec::new()),
            })
            .unwrap();
        let schema = string().rule_in(&registry, "never", Vec::new()).unwrap();

        let errors = schema.validate(Value::from("x")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.as_slice()[0].code.to_string(), "string.never");
        assert_eq!(errors.to_string(), "value failed rule [never]");
    }

    #[test]
    fn test_map_keys_that_coerce_equal_collapse() {
        let schema = map(number(), string());
        let input = Value::from(serde_json::json!({ "01": "b", "1": "a" }));
        let output = schema.validate(input).unwrap().unwrap();
        assert_eq!(
            output,
            Value::Map(vec![(Value::Number(1.0), Value::from("a"))])
        );
        assert_eq!(output.to_json(), serde_json::json!({ "1": "a" }));
    }

    #[test]
    fn test_assertions() {
        assert!(ArgAssertion::Number.check(&RuleArg::from(f64::NAN)).is_err());
        assert!(ArgAssertion::Length.check(&RuleArg::from(1.5)).is_err());
        assert!(ArgAssertion::Length.check(&RuleArg::from(3)).is_ok());
        assert!(ArgAssertion::Schema.check(&RuleArg::from(1)).is_err());
        assert!(matches!(
            ArgAssertion::Duration.check(&RuleArg::from("2m")),
            Ok(RuleArg::Value(Value::Duration(d))) if d.as_millis() == 120_000
        ));
    }
}
