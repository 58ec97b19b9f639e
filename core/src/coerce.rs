//! Per-kind coercion of raw input into canonical values.
//!
//! Every coercer takes the present raw value and either returns its
//! canonical form or a single error for the node. Absent input never
//! reaches a coercer; default substitution happens before.

use std::sync::LazyLock;

use regex::Regex;

use crate::byte_size::ByteSizeValue;
use crate::duration::DurationValue;
use crate::error::{ErrorCode, ErrorDescriptor, base_message};
use crate::schema::Kind;
use crate::validate::RuleContext;
use crate::value::Value;

static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[+-]?(\d+(\.\d*)?|\.\d+)(e[+-]?\d+)?\s*$")
        .expect("static regex must compile")
});

pub(crate) type Coercer = fn(&RuleContext<'_>, Value) -> Result<Value, ErrorDescriptor>;

/// Coercer table, one entry per kind.
pub(crate) fn coercer_for(kind: Kind) -> Coercer {
    match kind {
        Kind::Any => coerce_any,
        Kind::Boolean => coerce_boolean,
        Kind::Binary => coerce_binary,
        Kind::Stream => coerce_stream,
        Kind::String => coerce_string,
        Kind::Bytes => coerce_bytes,
        Kind::Duration => coerce_duration,
        Kind::Number => coerce_number,
        Kind::Object => coerce_object,
        Kind::Map => coerce_map,
        Kind::Record => coerce_record,
        Kind::Array => coerce_array,
    }
}

pub(crate) fn coerce(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    coercer_for(ctx.schema().kind())(ctx, value)
}

fn base_error(ctx: &RuleContext<'_>, value: Value) -> ErrorDescriptor {
    let kind = ctx.schema().kind();
    ctx.error(ErrorCode::base(kind), base_message(kind, Some(&value)))
        .with_context("value", value)
}

fn parse_error(ctx: &RuleContext<'_>, message: String, value: Value) -> ErrorDescriptor {
    ctx.error(ErrorCode::parse(ctx.schema().kind()), message)
        .with_context("value", value)
}

fn coerce_any(_ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    Ok(value)
}

fn coerce_boolean(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    match value {
        Value::Bool(_) => Ok(value),
        Value::String(ref s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
        Value::String(ref s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
        other => Err(base_error(ctx, other)),
    }
}

fn coerce_binary(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    match value {
        Value::Binary(_) => Ok(value),
        other => Err(base_error(ctx, other)),
    }
}

fn coerce_stream(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    match value {
        Value::Stream(_) => Ok(value),
        other => Err(base_error(ctx, other)),
    }
}

fn coerce_string(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    match value {
        Value::String(_) => Ok(value),
        other => Err(base_error(ctx, other)),
    }
}

fn coerce_bytes(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    let parsed = match &value {
        Value::Bytes(_) => return Ok(value),
        Value::String(s) => ByteSizeValue::parse(s),
        Value::Number(n) => ByteSizeValue::from_number(*n),
        _ => return Err(base_error(ctx, value)),
    };
    parsed
        .map(Value::Bytes)
        .map_err(|e| parse_error(ctx, e.to_string(), value))
}

fn coerce_duration(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    let parsed = match &value {
        Value::Duration(_) => return Ok(value),
        Value::String(s) => DurationValue::parse(s),
        Value::Number(n) => DurationValue::from_number(*n),
        _ => return Err(base_error(ctx, value)),
    };
    parsed
        .map(Value::Duration)
        .map_err(|e| parse_error(ctx, e.to_string(), value))
}

fn coerce_number(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    let number = match &value {
        Value::Number(n) => *n,
        Value::String(s) if ctx.convert() && NUMERIC_RE.is_match(s) => {
            match s.trim().parse::<f64>() {
                Ok(n) => n,
                Err(_) => return Err(base_error(ctx, value)),
            }
        }
        _ => return Err(base_error(ctx, value)),
    };

    if number.is_nan() {
        return Err(base_error(ctx, value));
    }
    if number.is_infinite() {
        return Err(ctx
            .error(
                ErrorCode::new(Kind::Number, "infinity"),
                "cannot be infinity",
            )
            .with_context("value", value));
    }
    Ok(Value::Number(number))
}

/// Parses a string as JSON when conversion is on. `None` means the input
/// is not a string or conversion is off.
fn json_fallback(
    ctx: &RuleContext<'_>,
    value: &Value,
) -> Option<Result<Value, ErrorDescriptor>> {
    let text = value.as_str().filter(|_| ctx.convert())?;
    Some(Value::from_json_str(text).map_err(|_| {
        let kind = ctx.schema().kind();
        parse_error(
            ctx,
            format!("could not parse {kind} value from json input"),
            value.clone(),
        )
    }))
}

fn coerce_object(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    match value {
        Value::Object(_) => Ok(value),
        other => match json_fallback(ctx, &other) {
            Some(Ok(parsed @ Value::Object(_))) => Ok(parsed),
            Some(Ok(parsed)) => Err(base_error(ctx, parsed)),
            Some(Err(error)) => Err(error),
            None => Err(base_error(ctx, other)),
        },
    }
}

fn coerce_map(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    let object = match value {
        Value::Map(_) => return Ok(value),
        Value::Object(map) => map,
        other => match json_fallback(ctx, &other) {
            Some(Ok(Value::Object(map))) => map,
            Some(Ok(parsed)) => return Err(base_error(ctx, parsed)),
            Some(Err(error)) => return Err(error),
            None => return Err(base_error(ctx, other)),
        },
    };
    Ok(Value::Map(
        object
            .into_iter()
            .map(|(key, item)| (Value::String(key), item))
            .collect(),
    ))
}

fn coerce_record(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    coerce_object(ctx, value)
}

fn coerce_array(ctx: &RuleContext<'_>, value: Value) -> Result<Value, ErrorDescriptor> {
    match value {
        Value::Array(_) => Ok(value),
        other => match json_fallback(ctx, &other) {
            Some(Ok(parsed @ Value::Array(_))) => Ok(parsed),
            Some(Ok(parsed)) => Err(base_error(ctx, parsed)),
            Some(Err(error)) => Err(error),
            None => Err(base_error(ctx, other)),
        },
    }
}
