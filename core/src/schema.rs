//! Schema nodes and their construction API.
//!
//! A [`Schema`] describes one point of a configuration shape: its [`Kind`],
//! whether a value must be present, an optional default, and an ordered
//! list of rules. Object and array nodes own child schemas; map and record
//! nodes carry their key/value schemas as arguments of the `entries` rule.
//!
//! Schemas are immutable once built and cheap to clone (children are
//! shared), so one tree can serve any number of concurrent validations.
//!
//! # Examples
//!
//! ```
//! use config_schema_core::{array, bytes, number, object, string, Value};
//!
//! let schema = object([
//!     ("name", string()),
//!     ("port", number().min(1)?.max(65535)?),
//!     ("buffer", bytes().default(Value::from("16kb"))),
//!     ("hosts", array(string()).optional()),
//! ])?;
//!
//! let input = Value::from(serde_json::json!({ "name": "api", "port": "8080" }));
//! let output = schema.validate(input).unwrap().unwrap();
//! assert_eq!(output.get("port"), Some(&Value::Number(8080.0)));
//! assert_eq!(output.get("buffer"), Some(&Value::from("16kb")));
//! assert_eq!(output.get("hosts"), None);
//! # Ok::<(), config_schema_core::DefinitionError>(())
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DefinitionError, DefinitionResult, ValidationErrors};
use crate::rules::{self, Reference, RuleArg, RuleInstance, RuleRegistry};
use crate::validate::{ValidationOptions, validate};
use crate::value::Value;

/// Type tag of a schema node. Fixed at construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Accepts any present value unchanged.
    Any,
    Boolean,
    /// Raw byte buffer.
    Binary,
    /// Readable stream handle.
    Stream,
    String,
    /// Byte-size quantity.
    Bytes,
    /// Duration quantity.
    Duration,
    Number,
    /// Fixed set of named fields.
    Object,
    /// Mapping with validated keys and values, producing [`Value::Map`].
    Map,
    /// Mapping with validated keys and values, producing [`Value::Object`].
    Record,
    /// Homogeneous sequence.
    Array,
}

impl Kind {
    /// Every kind, in declaration order.
    pub const ALL: [Kind; 12] = [
        Kind::Any,
        Kind::Boolean,
        Kind::Binary,
        Kind::Stream,
        Kind::String,
        Kind::Bytes,
        Kind::Duration,
        Kind::Number,
        Kind::Object,
        Kind::Map,
        Kind::Record,
        Kind::Array,
    ];

    /// Lowercase tag, as used in error codes.
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::Any => "any",
            Kind::Boolean => "boolean",
            Kind::Binary => "binary",
            Kind::Stream => "stream",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Duration => "duration",
            Kind::Number => "number",
            Kind::Object => "object",
            Kind::Map => "map",
            Kind::Record => "record",
            Kind::Array => "array",
        }
    }

    /// Bracketed type label used in base-type mismatch messages.
    pub(crate) const fn expected_label(self) -> &'static str {
        match self {
            Kind::Any => "[any]",
            Kind::Boolean => "[boolean]",
            Kind::Binary => "[Buffer]",
            Kind::Stream => "[Stream]",
            Kind::String => "[string]",
            Kind::Bytes => "[ByteSize]",
            Kind::Duration => "[Duration]",
            Kind::Number => "[number]",
            Kind::Object | Kind::Record => "[object]",
            Kind::Map => "[Map] or [object]",
            Kind::Array => "[array]",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DefinitionError::InvalidDefinition(format!("unknown type [{s}]")))
    }
}

/// Whether a value must, may, or must not be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Required,
    Optional,
    Forbidden,
}

/// Value substituted when input is absent. Defaults are trusted and are
/// not run through the node's coercer or rules.
#[derive(Clone)]
pub enum DefaultValue {
    /// Literal value.
    Value(Value),
    /// Computed on every substitution.
    Supplier(Arc<dyn Fn() -> Value + Send + Sync>),
    /// Resolved from a sibling field or the validation context.
    Reference(Reference),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Supplier(_) => f.write_str("Supplier(..)"),
            DefaultValue::Reference(reference) => {
                f.debug_tuple("Reference").field(reference).finish()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Shape {
    Leaf,
    Object {
        fields: Vec<(String, Arc<Schema>)>,
        allow_unknowns: bool,
    },
    Array {
        items: Arc<Schema>,
    },
}

/// A typed, composable description of an expected input shape.
#[derive(Debug, Clone)]
pub struct Schema {
    kind: Kind,
    presence: Option<Presence>,
    default: Option<DefaultValue>,
    rules: Vec<RuleInstance>,
    shape: Shape,
    description: Option<String>,
}

impl Schema {
    fn with_shape(kind: Kind, shape: Shape) -> Self {
        Self {
            kind,
            presence: None,
            default: None,
            rules: Vec::new(),
            shape,
            description: None,
        }
    }

    fn leaf(kind: Kind) -> Self {
        Self::with_shape(kind, Shape::Leaf)
    }

    /// The node's type tag.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Presence declared on this node; `None` defers to
    /// [`ValidationOptions::presence`].
    pub fn presence(&self) -> Option<Presence> {
        self.presence
    }

    /// The attached default, if any.
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Free-form description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Attached rules in declaration order.
    pub fn rules(&self) -> &[RuleInstance] {
        &self.rules
    }

    /// Declared object fields in declaration order; empty for other kinds.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Schema)> {
        let fields: &[(String, Arc<Schema>)] = match &self.shape {
            Shape::Object { fields, .. } => fields,
            _ => &[],
        };
        fields.iter().map(|(name, schema)| (name.as_str(), schema.as_ref()))
    }

    /// Looks up a declared object field.
    pub fn field(&self, name: &str) -> Option<&Schema> {
        self.fields()
            .find(|(field, _)| *field == name)
            .map(|(_, schema)| schema)
    }

    /// Element schema of an array node.
    pub fn items(&self) -> Option<&Schema> {
        match &self.shape {
            Shape::Array { items } => Some(items),
            _ => None,
        }
    }

    /// Key and value schemas of a map or record node.
    pub fn entries(&self) -> Option<(&Schema, &Schema)> {
        self.rules
            .iter()
            .filter(|rule| rule.name() == rules::ENTRIES)
            .find_map(|rule| match rule.args() {
                [RuleArg::Schema(key), RuleArg::Schema(value)] => Some((&**key, &**value)),
                _ => None,
            })
    }

    /// Whether an object node passes undeclared keys through.
    pub fn allows_unknowns(&self) -> bool {
        matches!(
            self.shape,
            Shape::Object {
                allow_unknowns: true,
                ..
            }
        )
    }

    pub(crate) fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Substitutes `value` when input is absent.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Substitutes the supplier's result when input is absent.
    pub fn default_with(mut self, supplier: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Supplier(Arc::new(supplier)));
        self
    }

    /// Substitutes a referenced value when input is absent.
    pub fn default_ref(mut self, reference: Reference) -> Self {
        self.default = Some(DefaultValue::Reference(reference));
        self
    }

    /// Absent input succeeds with no value.
    pub fn optional(mut self) -> Self {
        self.presence = Some(Presence::Optional);
        self
    }

    /// Absent input fails unless a default is attached.
    pub fn required(mut self) -> Self {
        self.presence = Some(Presence::Required);
        self
    }

    /// Present input fails with `any.unknown`.
    pub fn forbidden(mut self) -> Self {
        self.presence = Some(Presence::Forbidden);
        self
    }

    /// Attaches a description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches a predicate run against the coerced value. Returning
    /// `Err(message)` fails with `any.custom` and `message` verbatim.
    ///
    /// Predicates should report failures through `Err`. A panic is caught
    /// and reported as `any.custom` with the panic message, but the
    /// process panic hook still runs first and prints to stderr.
    ///
    /// # Examples
    ///
    /// ```
    /// use config_schema_core::{string, Value};
    ///
    /// let schema = string().custom(|value| match value.as_str() {
    ///     Some(s) if s.starts_with('/') => Ok(()),
    ///     _ => Err("must start with a slash".to_string()),
    /// });
    ///
    /// assert!(schema.validate(Value::from("/app")).is_ok());
    /// let errors = schema.validate(Value::from("app")).unwrap_err();
    /// assert_eq!(errors.to_string(), "must start with a slash");
    /// ```
    pub fn custom(
        mut self,
        predicate: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(rules::custom_rule(Arc::new(predicate)));
        self
    }

    /// Lower bound (`bytes`, `duration`, `number`, `string`, `array`).
    pub fn min(self, limit: impl Into<RuleArg>) -> DefinitionResult<Self> {
        self.rule("min", vec![limit.into()])
    }

    /// Upper bound (`bytes`, `duration`, `number`, `string`, `array`).
    pub fn max(self, limit: impl Into<RuleArg>) -> DefinitionResult<Self> {
        self.rule("max", vec![limit.into()])
    }

    /// Attaches a rule from the built-in registry.
    pub fn rule(self, name: &str, args: Vec<RuleArg>) -> DefinitionResult<Self> {
        self.rule_in(RuleRegistry::standard(), name, args)
    }

    /// Attaches a rule from `registry`, looked up for this node's kind
    /// first and for `any` second.
    pub fn rule_in(
        mut self,
        registry: &RuleRegistry,
        name: &str,
        args: Vec<RuleArg>,
    ) -> DefinitionResult<Self> {
        let definition =
            registry
                .lookup(self.kind, name)
                .ok_or_else(|| DefinitionError::UnknownRule {
                    kind: self.kind,
                    rule: name.to_string(),
                })?;
        self.rules.push(definition.instantiate(args)?);
        Ok(self)
    }

    /// Lets an object node pass undeclared keys through unvalidated.
    pub fn allow_unknowns(mut self) -> DefinitionResult<Self> {
        match &mut self.shape {
            Shape::Object { allow_unknowns, .. } => {
                *allow_unknowns = true;
                Ok(self)
            }
            _ => Err(DefinitionError::UnsupportedModifier {
                kind: self.kind,
                modifier: "allowUnknowns",
            }),
        }
    }

    /// Validates with default [`ValidationOptions`].
    ///
    /// `Ok(None)` means the input was absent and the node is optional.
    pub fn validate(&self, input: impl Into<Option<Value>>) -> Result<Option<Value>, ValidationErrors> {
        validate(self, input.into(), &ValidationOptions::default())
    }

    /// Validates with explicit options.
    pub fn validate_with(
        &self,
        input: impl Into<Option<Value>>,
        options: &ValidationOptions,
    ) -> Result<Option<Value>, ValidationErrors> {
        validate(self, input.into(), options)
    }
}

/// Accepts any present value.
pub fn any() -> Schema {
    Schema::leaf(Kind::Any)
}

/// Boolean; `"true"`/`"false"` strings are accepted in any case.
pub fn boolean() -> Schema {
    Schema::leaf(Kind::Boolean)
}

/// Raw byte buffer.
pub fn binary() -> Schema {
    Schema::leaf(Kind::Binary)
}

/// Stream handle.
pub fn stream() -> Schema {
    Schema::leaf(Kind::Stream)
}

/// String.
pub fn string() -> Schema {
    Schema::leaf(Kind::String)
}

/// Byte-size quantity from a literal (`"1kb"`) or a byte count.
pub fn bytes() -> Schema {
    Schema::leaf(Kind::Bytes)
}

/// Duration quantity from a literal (`"5s"`) or a millisecond count.
pub fn duration() -> Schema {
    Schema::leaf(Kind::Duration)
}

/// Finite number; numeric strings are accepted when conversion is on.
pub fn number() -> Schema {
    Schema::leaf(Kind::Number)
}

/// Object with a fixed set of fields, validated in declaration order.
///
/// Fails with [`DefinitionError::DuplicateField`] if a name repeats.
pub fn object<I, K>(fields: I) -> DefinitionResult<Schema>
where
    I: IntoIterator<Item = (K, Schema)>,
    K: Into<String>,
{
    let mut declared: Vec<(String, Arc<Schema>)> = Vec::new();
    for (name, schema) in fields {
        let name = name.into();
        if declared.iter().any(|(existing, _)| *existing == name) {
            return Err(DefinitionError::DuplicateField(name));
        }
        declared.push((name, Arc::new(schema)));
    }
    Ok(Schema::with_shape(
        Kind::Object,
        Shape::Object {
            fields: declared,
            allow_unknowns: false,
        },
    ))
}

/// Mapping whose keys and values are validated, producing [`Value::Map`].
pub fn map(key: Schema, value: Schema) -> Schema {
    let mut schema = Schema::leaf(Kind::Map);
    schema.rules.push(rules::entries_rule(Kind::Map, key, value));
    schema
}

/// Mapping whose keys and values are validated, producing
/// [`Value::Object`]. Validated keys are stringified.
pub fn record(key: Schema, value: Schema) -> Schema {
    let mut schema = Schema::leaf(Kind::Record);
    schema.rules.push(rules::entries_rule(Kind::Record, key, value));
    schema
}

/// Sequence whose elements all match `items`.
pub fn array(items: Schema) -> Schema {
    Schema::with_shape(
        Kind::Array,
        Shape::Array {
            items: Arc::new(items),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_set_kind() {
        assert_eq!(any().kind(), Kind::Any);
        assert_eq!(bytes().kind(), Kind::Bytes);
        assert_eq!(map(string(), number()).kind(), Kind::Map);
        assert_eq!(record(string(), number()).kind(), Kind::Record);
        assert_eq!(array(boolean()).kind(), Kind::Array);
    }

    #[test]
    fn test_kind_parse_and_display() {
        for kind in Kind::ALL {
            assert_eq!(kind.to_string().parse::<Kind>().unwrap(), kind);
        }
        assert!("integer".parse::<Kind>().is_err());
    }

    #[test]
    fn test_object_rejects_duplicate_fields() {
        let result = object([("a", string()), ("a", number())]);
        assert!(matches!(result, Err(DefinitionError::DuplicateField(name)) if name == "a"));
    }

    #[test]
    fn test_object_keeps_declaration_order() {
        let schema = object([("z", string()), ("a", number()), ("m", boolean())]).unwrap();
        let names: Vec<&str> = schema.fields().map(|(name, _)| name).collect();
        assert_eq!(names, ["z", "a", "m"]);
        assert_eq!(schema.field("a").map(Schema::kind), Some(Kind::Number));
    }

    #[test]
    fn test_entries_accessor() {
        let schema = map(string(), number());
        let (key, value) = schema.entries().unwrap();
        assert_eq!(key.kind(), Kind::String);
        assert_eq!(value.kind(), Kind::Number);
        assert!(string().entries().is_none());
    }

    #[test]
    fn test_min_on_unsupported_kind_is_unknown_rule() {
        let result = boolean().min(1);
        assert!(matches!(
            result,
            Err(DefinitionError::UnknownRule { kind: Kind::Boolean, .. })
        ));
    }

    #[test]
    fn test_malformed_rule_argument_fails_fast() {
        let result = bytes().min("lots");
        assert!(matches!(
            result,
            Err(DefinitionError::InvalidRuleArgument { rule: "min", .. })
        ));
        assert!(string().min(-1).is_err());
        assert!(number().max("ten").is_err());
    }

    #[test]
    fn test_allow_unknowns_only_on_objects() {
        assert!(object([("a", string())]).unwrap().allow_unknowns().unwrap().allows_unknowns());
        assert!(matches!(
            string().allow_unknowns(),
            Err(DefinitionError::UnsupportedModifier { kind: Kind::String, .. })
        ));
    }

    #[test]
    fn test_presence_modifiers() {
        assert_eq!(string().presence(), None);
        assert_eq!(string().optional().presence(), Some(Presence::Optional));
        assert_eq!(string().optional().required().presence(), Some(Presence::Required));
        assert_eq!(string().forbidden().presence(), Some(Presence::Forbidden));
    }

    #[test]
    fn test_schema_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Schema>();
    }
}
