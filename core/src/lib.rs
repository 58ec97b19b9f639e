//! Typed configuration schemas with coercion and path-qualified errors.
//!
//! This crate validates loosely typed configuration input (strings from
//! environment variables and CLI flags, YAML/JSON documents) against a
//! schema tree and produces strongly typed values:
//!
//! - [`Schema`]: a composable node built with [`any`], [`boolean`],
//!   [`binary`], [`stream`], [`string`], [`bytes`], [`duration`],
//!   [`number`], [`object`], [`map`], [`record`] and [`array`].
//! - [`Value`]: the dynamic input/output model.
//! - [`ByteSizeValue`] and [`DurationValue`]: quantities parsed from
//!   literals such as `"512kb"` or `"30s"`.
//! - [`RuleRegistry`]: named rules (`min`, `max`, `custom`, `entries`)
//!   keyed by kind.
//! - [`ValidationErrors`]: every violation of a failed pass, each with a
//!   stable [`ErrorCode`] and a [`Path`].
//! - [`SchemaDefinition`]: the YAML/JSON form of a schema.
//!
//! Mistakes in the schema itself surface as [`DefinitionError`] when the
//! schema is built, never during validation.
//!
//! # Example
//!
//! ```
//! use config_schema_core::*;
//!
//! let schema = object([
//!     ("a", number()),
//!     ("b", string().default("x")),
//!     ("limits", map(string(), bytes().min("1kb")?)),
//! ])?;
//!
//! let input = Value::from(serde_json::json!({ "a": "5", "limits": { "body": "2mb" } }));
//! let output = schema.validate(input).unwrap().unwrap();
//! assert_eq!(output.get("a"), Some(&Value::Number(5.0)));
//! assert_eq!(output.get("b"), Some(&Value::from("x")));
//!
//! let bad = Value::from(serde_json::json!({ "a": "five", "limits": { "body": 10 } }));
//! let errors = schema.validate(bad).unwrap_err();
//! let codes: Vec<String> = errors.iter().map(|e| e.code.to_string()).collect();
//! assert_eq!(codes, ["number.base", "map.value"]);
//! # Ok::<(), DefinitionError>(())
//! ```

mod byte_size;
mod coerce;
mod definition;
mod duration;
mod error;
mod rules;
mod schema;
mod validate;
mod value;

pub use byte_size::{ByteSizeParseError, ByteSizeValue, ByteUnit};
pub use definition::{LimitDefinition, SchemaDefinition};
pub use duration::{DurationParseError, DurationUnit, DurationValue};
pub use error::{
    DefinitionError, DefinitionResult, ErrorCode, ErrorDescriptor, Path, PathSegment,
    ValidationErrors,
};
pub use rules::{
    ArgAssertion, ArgSpec, Predicate, Reference, RuleArg, RuleCheck, RuleDefinition,
    RuleInstance, RuleRegistry, RuleResult,
};
pub use schema::{
    DefaultValue, Kind, Presence, Schema, any, array, binary, boolean, bytes, duration, map,
    number, object, record, stream, string,
};
pub use validate::{RuleContext, ValidationOptions, validate};
pub use value::{Object, StreamHandle, Value};
