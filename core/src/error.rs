//! Error and result model.
//!
//! Two families of failure exist and never mix:
//!
//! - [`ValidationErrors`]: expected failures produced by a validation pass,
//!   a non-empty ordered list of path-qualified [`ErrorDescriptor`]s.
//! - [`DefinitionError`]: programmer errors raised while building a schema
//!   (unknown rules, malformed rule arguments, duplicate fields, ...).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::schema::Kind;
use crate::value::Value;

/// Stable `kind.subkind` identifier of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Kind that raised the error (`any` for kind-independent failures).
    pub kind: Kind,
    /// Failure class within the kind (`base`, `parse`, `min`, ...).
    pub subkind: &'static str,
}

impl ErrorCode {
    /// Value absent, no default, presence required.
    pub const REQUIRED: ErrorCode = ErrorCode::new(Kind::Any, "required");
    /// Value present on a forbidden node.
    pub const UNKNOWN: ErrorCode = ErrorCode::new(Kind::Any, "unknown");
    /// Caller-supplied predicate rejected the value.
    pub const CUSTOM: ErrorCode = ErrorCode::new(Kind::Any, "custom");
    /// Deferred reference could not be resolved to a usable value.
    pub const REF: ErrorCode = ErrorCode::new(Kind::Any, "ref");
    /// Undeclared key in an object.
    pub const OBJECT_UNKNOWN: ErrorCode = ErrorCode::new(Kind::Object, "unknown");

    /// Creates a code.
    pub const fn new(kind: Kind, subkind: &'static str) -> Self {
        Self { kind, subkind }
    }

    /// `<kind>.base`
    pub const fn base(kind: Kind) -> Self {
        Self::new(kind, "base")
    }

    /// `<kind>.parse`
    pub const fn parse(kind: Kind) -> Self {
        Self::new(kind, "parse")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.subkind)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Object field or map/record entry key.
    Key(String),
    /// Array element index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Location of a value inside the validated input. Renders dotted
/// (`server.hosts.0`); the root path renders empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// The root path.
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Segments from the root down.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Returns a new path one segment deeper.
    pub fn child(&self, segment: impl Into<PathSegment>) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }

    /// Returns `self` followed by every segment of `tail`.
    pub fn join(&self, tail: &Path) -> Path {
        let mut segments = self.0.clone();
        segments.extend(tail.0.iter().cloned());
        Path(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Path(segments)
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDescriptor {
    /// Stable identifier.
    pub code: ErrorCode,
    /// Where the failure occurred.
    pub path: Path,
    /// Human-readable message.
    pub message: String,
    /// Structured payload (`value`, `limit`, `entryKey`, ...).
    pub context: BTreeMap<String, Value>,
}

impl ErrorDescriptor {
    /// Creates a descriptor with an empty context.
    pub fn new(code: ErrorCode, path: Path, message: impl Into<String>) -> Self {
        Self {
            code,
            path,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Adds a context entry.
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_root() {
            f.write_str(&self.message)
        } else {
            write!(f, "[{}]: {}", self.path, self.message)
        }
    }
}

/// Failure outcome of a validation pass: every violation found, in
/// traversal order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ErrorDescriptor>);

impl ValidationErrors {
    pub(crate) fn new(errors: Vec<ErrorDescriptor>) -> Self {
        debug_assert!(!errors.is_empty(), "validation failure without errors");
        Self(errors)
    }

    /// Number of descriptors (at least one).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates descriptors in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ErrorDescriptor> {
        self.0.iter()
    }

    /// Descriptors as a slice.
    pub fn as_slice(&self) -> &[ErrorDescriptor] {
        &self.0
    }

    /// Consumes into the underlying vector.
    pub fn into_vec(self) -> Vec<ErrorDescriptor> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl IntoIterator for ValidationErrors {
    type Item = ErrorDescriptor;
    type IntoIter = std::vec::IntoIter<ErrorDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ErrorDescriptor;
    type IntoIter = std::slice::Iter<'a, ErrorDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Schema construction errors.
///
/// These indicate a mistake in the schema itself, never in the validated
/// input, and are raised when the schema is built.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// No rule of that name is registered for the kind or for `any`.
    #[error("unknown rule [{rule}] for type [{kind}]")]
    UnknownRule { kind: Kind, rule: String },

    /// A registry already holds a rule with that name for the kind.
    #[error("rule [{rule}] is already registered for type [{kind}]")]
    DuplicateRule { kind: Kind, rule: &'static str },

    /// A rule argument does not satisfy the rule's argument assertion.
    #[error("invalid argument [{arg}] for rule [{kind}.{rule}]: {reason}")]
    InvalidRuleArgument {
        kind: Kind,
        rule: &'static str,
        arg: &'static str,
        reason: String,
    },

    /// An object declares the same field twice.
    #[error("duplicate field [{0}] in object definition")]
    DuplicateField(String),

    /// Modifier that makes no sense for the kind.
    #[error("[{modifier}] is not supported by type [{kind}]")]
    UnsupportedModifier { kind: Kind, modifier: &'static str },

    /// A literal default fails the schema it is attached to.
    #[error("invalid default value: {0}")]
    InvalidDefault(ValidationErrors),

    /// Malformed declarative definition.
    #[error("invalid schema definition: {0}")]
    InvalidDefinition(String),

    /// File system failure while loading a definition.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience alias for schema construction results.
pub type DefinitionResult<T> = std::result::Result<T, DefinitionError>;

/// `expected value of type [number] but got [string]`
pub(crate) fn base_message(kind: Kind, value: Option<&Value>) -> String {
    let actual = value.map_or("undefined", Value::type_name);
    format!(
        "expected value of type {} but got [{actual}]",
        kind.expected_label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_display() {
        assert_eq!(ErrorCode::base(Kind::Number).to_string(), "number.base");
        assert_eq!(ErrorCode::REQUIRED.to_string(), "any.required");
        assert_eq!(
            ErrorCode::new(Kind::Bytes, "min").to_string(),
            "bytes.min"
        );
    }

    #[test]
    fn test_path_display() {
        let path = Path::root().child("server").child("hosts").child(2usize);
        assert_eq!(path.to_string(), "server.hosts.2");
        assert_eq!(Path::root().to_string(), "");
    }

    #[test]
    fn test_descriptor_rendering() {
        let nested = ErrorDescriptor::new(
            ErrorCode::base(Kind::Number),
            Path::root().child("a").child("b"),
            base_message(Kind::Number, Some(&Value::from("x"))),
        );
        assert_eq!(
            nested.to_string(),
            "[a.b]: expected value of type [number] but got [string]"
        );

        let root = ErrorDescriptor::new(ErrorCode::CUSTOM, Path::root(), "nope");
        assert_eq!(root.to_string(), "nope");
    }

    #[test]
    fn test_missing_value_message() {
        assert_eq!(
            base_message(Kind::Duration, None),
            "expected value of type [Duration] but got [undefined]"
        );
        assert_eq!(
            base_message(Kind::Map, Some(&Value::Null)),
            "expected value of type [Map] or [object] but got [null]"
        );
    }

    #[test]
    fn test_errors_display_one_line_each() {
        let errors = ValidationErrors::new(vec![
            ErrorDescriptor::new(ErrorCode::REQUIRED, Path::root().child("a"), "first"),
            ErrorDescriptor::new(ErrorCode::REQUIRED, Path::root().child("b"), "second"),
        ]);
        assert_eq!(errors.to_string(), "[a]: first\n[b]: second");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_serialize_descriptor() {
        let error = ErrorDescriptor::new(
            ErrorCode::new(Kind::Bytes, "min"),
            Path::root().child("limits").child(0usize),
            "too small",
        )
        .with_context("value", 500);
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["code"], "bytes.min");
        assert_eq!(json["path"], serde_json::json!(["limits", 0]));
        assert_eq!(json["context"]["value"], 500);
    }
}
