//! Declarative schema definitions.
//!
//! A [`SchemaDefinition`] is the serde form of a schema tree, so schemas
//! can live next to the configuration they describe. Field order in
//! `fields` is preserved.
//!
//! # Example YAML
//!
//! ```yaml
//! type: object
//! fields:
//!   port:
//!     type: number
//!     min: 1
//!     max: 65535
//!     default: 5601
//!   maxPayload:
//!     type: bytes
//!     max: { contextRef: limits.maxPayload }
//!   hosts:
//!     type: array
//!     items: { type: string }
//!     optional: true
//! ```
//!
//! # Examples
//!
//! ```
//! use config_schema_core::{SchemaDefinition, Value};
//!
//! let definition = SchemaDefinition::from_yaml_str(
//!     "type: object\nfields:\n  timeout: { type: duration, default: 30s }\n",
//! )?;
//! let schema = definition.build()?;
//!
//! let output = schema.validate(Value::from(serde_json::json!({}))).unwrap().unwrap();
//! assert_eq!(output.get("timeout").unwrap().to_string(), "30s");
//! # Ok::<(), config_schema_core::DefinitionError>(())
//! ```

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::{DefinitionError, DefinitionResult};
use crate::rules::{Reference, RuleArg};
use crate::schema::{self, Kind, Schema};
use crate::value::Value;

/// Bound given to `min` or `max`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LimitDefinition {
    /// `{ ref: <sibling> }`
    Sibling {
        #[serde(rename = "ref")]
        key: String,
    },
    /// `{ contextRef: <key> }`
    Context {
        #[serde(rename = "contextRef")]
        key: String,
    },
    /// Literal limit.
    Value(Value),
}

impl LimitDefinition {
    fn to_rule_arg(&self) -> RuleArg {
        match self {
            LimitDefinition::Sibling { key } => RuleArg::Ref(Reference::sibling(key.as_str())),
            LimitDefinition::Context { key } => RuleArg::Ref(Reference::context(key.as_str())),
            LimitDefinition::Value(value) => RuleArg::Value(value.clone()),
        }
    }
}

/// Serde form of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SchemaDefinition {
    /// Node kind.
    #[serde(rename = "type")]
    pub kind: Kind,
    /// Absent input succeeds with no value.
    #[serde(default)]
    pub optional: bool,
    /// Present input fails.
    #[serde(default)]
    pub forbidden: bool,
    /// Literal default, coerced once when the schema is built.
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub min: Option<LimitDefinition>,
    #[serde(default)]
    pub max: Option<LimitDefinition>,
    /// Object fields in declaration order.
    #[serde(default, deserialize_with = "ordered_fields")]
    pub fields: Option<Vec<(String, SchemaDefinition)>>,
    /// Object passes undeclared keys through.
    #[serde(default)]
    pub allow_unknowns: bool,
    /// Map/record key schema.
    #[serde(default)]
    pub key: Option<Box<SchemaDefinition>>,
    /// Map/record value schema.
    #[serde(default)]
    pub value: Option<Box<SchemaDefinition>>,
    /// Array element schema.
    #[serde(default)]
    pub items: Option<Box<SchemaDefinition>>,
}

fn ordered_fields<'de, D>(deserializer: D) -> Result<Option<Vec<(String, SchemaDefinition)>>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FieldsVisitor;

    impl<'de> Visitor<'de> for FieldsVisitor {
        type Value = Vec<(String, SchemaDefinition)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of field names to schema definitions")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut fields = Vec::new();
            while let Some(entry) = access.next_entry::<String, SchemaDefinition>()? {
                fields.push(entry);
            }
            Ok(fields)
        }
    }

    deserializer.deserialize_map(FieldsVisitor).map(Some)
}

impl SchemaDefinition {
    /// Loads a definition from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](DefinitionError::Io) if the file cannot be read, or
    /// [`Yaml`](DefinitionError::Yaml) if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> DefinitionResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses YAML text (JSON is accepted as a YAML subset).
    pub fn from_yaml_str(text: &str) -> DefinitionResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parses JSON text.
    pub fn from_json_str(text: &str) -> DefinitionResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds the schema tree.
    ///
    /// # Errors
    ///
    /// Fails on modifiers that do not belong to the kind, missing child
    /// definitions, malformed limits, duplicate fields, and literal
    /// defaults that do not coerce.
    pub fn build(&self) -> DefinitionResult<Schema> {
        self.reject_misplaced()?;

        let mut schema = match self.kind {
            Kind::Object => {
                let fields = self
                    .fields
                    .iter()
                    .flatten()
                    .map(|(name, field)| field.build().map(|schema| (name.clone(), schema)))
                    .collect::<DefinitionResult<Vec<_>>>()?;
                schema::object(fields)?
            }
            Kind::Map | Kind::Record => {
                let (Some(key), Some(value)) = (&self.key, &self.value) else {
                    return Err(DefinitionError::InvalidDefinition(format!(
                        "type [{}] requires [key] and [value]",
                        self.kind
                    )));
                };
                if self.kind == Kind::Map {
                    schema::map(key.build()?, value.build()?)
                } else {
                    schema::record(key.build()?, value.build()?)
                }
            }
            Kind::Array => {
                let items = self.items.as_ref().ok_or_else(|| {
                    DefinitionError::InvalidDefinition("type [array] requires [items]".to_string())
                })?;
                schema::array(items.build()?)
            }
            Kind::Any => schema::any(),
            Kind::Boolean => schema::boolean(),
            Kind::Binary => schema::binary(),
            Kind::Stream => schema::stream(),
            Kind::String => schema::string(),
            Kind::Bytes => schema::bytes(),
            Kind::Duration => schema::duration(),
            Kind::Number => schema::number(),
        };

        if self.allow_unknowns {
            schema = schema.allow_unknowns()?;
        }
        if let Some(description) = &self.description {
            schema = schema.describe(description.as_str());
        }

        if let Some(default) = &self.default {
            let coerced = schema
                .validate(default.clone())
                .map_err(DefinitionError::InvalidDefault)?;
            if let Some(coerced) = coerced {
                schema = schema.default(coerced);
            }
        }
        if let Some(min) = &self.min {
            schema = schema.min(min.to_rule_arg())?;
        }
        if let Some(max) = &self.max {
            schema = schema.max(max.to_rule_arg())?;
        }

        match (self.optional, self.forbidden) {
            (true, true) => Err(DefinitionError::InvalidDefinition(
                "a node cannot be both optional and forbidden".to_string(),
            )),
            (true, false) => Ok(schema.optional()),
            (false, true) => Ok(schema.forbidden()),
            (false, false) => Ok(schema),
        }
    }

    fn reject_misplaced(&self) -> DefinitionResult<()> {
        let misplaced = [
            ("fields", self.fields.is_some(), self.kind == Kind::Object),
            (
                "key",
                self.key.is_some(),
                matches!(self.kind, Kind::Map | Kind::Record),
            ),
            (
                "value",
                self.value.is_some(),
                matches!(self.kind, Kind::Map | Kind::Record),
            ),
            ("items", self.items.is_some(), self.kind == Kind::Array),
        ]
        .into_iter()
        .find(|(_, present, allowed)| *present && !allowed);

        match misplaced {
            Some((modifier, _, _)) => Err(DefinitionError::UnsupportedModifier {
                kind: self.kind,
                modifier,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ValidationOptions;

    fn build(yaml: &str) -> DefinitionResult<Schema> {
        SchemaDefinition::from_yaml_str(yaml)?.build()
    }

    #[test]
    fn test_fields_keep_declaration_order() {
        let schema = build(
            "type: object\nfields:\n  zeta: { type: string }\n  alpha: { type: number }\n",
        )
        .unwrap();
        let names: Vec<&str> = schema.fields().map(|(name, _)| name).collect();
        assert_eq!(names, ["zeta", "alpha"]);
    }

    #[test]
    fn test_limits_and_defaults() {
        let schema = build("type: bytes\nmin: 1kb\ndefault: 4kb\n").unwrap();
        assert_eq!(
            schema.validate(None).unwrap().unwrap().as_byte_size().unwrap().bytes(),
            4096
        );
        let errors = schema.validate(Value::from(500)).unwrap_err();
        assert_eq!(errors.as_slice()[0].code.to_string(), "bytes.min");
    }

    #[test]
    fn test_reference_limits() {
        let schema = build(
            "type: object\nfields:\n  low: { type: number }\n  high: { type: number, min: { ref: low } }\n",
        )
        .unwrap();
        assert!(schema.validate(Value::from(json!({ "low": 1, "high": 2 }))).is_ok());
        assert!(schema.validate(Value::from(json!({ "low": 3, "high": 2 }))).is_err());

        let schema = build("type: duration\nmax: { contextRef: ttl }\n").unwrap();
        let options = ValidationOptions::default().with_context("ttl", "1h");
        assert!(schema.validate_with(Value::from("30m"), &options).is_ok());
        assert!(schema.validate_with(Value::from("2h"), &options).is_err());
    }

    #[test]
    fn test_composite_definitions() {
        let schema = build(
            "type: map\nkey: { type: string }\nvalue: { type: array, items: { type: boolean } }\n",
        )
        .unwrap();
        let output = schema
            .validate(Value::from(json!({ "flags": ["true", false] })))
            .unwrap()
            .unwrap();
        assert_eq!(
            output,
            Value::Map(vec![(
                Value::from("flags"),
                Value::Array(vec![Value::Bool(true), Value::Bool(false)])
            )])
        );
    }

    #[test]
    fn test_presence_flags() {
        let schema = build("type: string\noptional: true\n").unwrap();
        assert_eq!(schema.validate(None), Ok(None));

        let schema = build("type: string\nforbidden: true\n").unwrap();
        assert!(schema.validate(Value::from("x")).is_err());

        assert!(matches!(
            build("type: string\noptional: true\nforbidden: true\n"),
            Err(DefinitionError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_invalid_default_is_rejected() {
        assert!(matches!(
            build("type: number\ndefault: abc\n"),
            Err(DefinitionError::InvalidDefault(_))
        ));
    }

    #[test]
    fn test_misplaced_modifiers() {
        assert!(matches!(
            build("type: string\nitems: { type: string }\n"),
            Err(DefinitionError::UnsupportedModifier { modifier: "items", .. })
        ));
        assert!(matches!(
            build("type: number\nallowUnknowns: true\n"),
            Err(DefinitionError::UnsupportedModifier { .. })
        ));
        assert!(matches!(
            build("type: boolean\nmin: 1\n"),
            Err(DefinitionError::UnknownRule { .. })
        ));
    }

    #[test]
    fn test_missing_children() {
        assert!(matches!(
            build("type: map\nkey: { type: string }\n"),
            Err(DefinitionError::InvalidDefinition(_))
        ));
        assert!(matches!(
            build("type: array\n"),
            Err(DefinitionError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_unknown_properties_are_rejected() {
        assert!(matches!(
            SchemaDefinition::from_yaml_str("type: string\nrequired: true\n"),
            Err(DefinitionError::Yaml(_))
        ));
        assert!(matches!(
            SchemaDefinition::from_json_str(r#"{"type": "integer"}"#),
            Err(DefinitionError::Json(_))
        ));
    }

    #[test]
    fn test_duplicate_fields_in_json() {
        let definition =
            SchemaDefinition::from_json_str(r#"{"type":"object","fields":{"a":{"type":"string"},"a":{"type":"number"}}}"#)
                .unwrap();
        assert!(matches!(
            definition.build(),
            Err(DefinitionError::DuplicateField(name)) if name == "a"
        ));
    }
}
