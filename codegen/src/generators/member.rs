//! Member-level code shared by the structure, union and collection generators:
//! type hints, default values, and the serializer/deserializer call for a
//! member's target kind.

use crate::{
    args,
    error::{Error, Result},
    gen::CodegenContext,
    generators::errors::default_timestamp_symbol,
    model::{Member, ScalarKind, ShapeId, ShapeKind},
    runtime,
    symbols::{Symbol, DESERIALIZER, SERIALIZER},
    writer::{python_string, CodeWriter},
    JsonValue,
};

/// Python literal for a json value
pub(crate) fn python_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "None".to_string(),
        JsonValue::Bool(true) => "True".to_string(),
        JsonValue::Bool(false) => "False".to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => python_string(s),
        JsonValue::Array(items) => {
            format!("[{}]", items.iter().map(python_literal).collect::<Vec<_>>().join(", "))
        }
        JsonValue::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", python_string(k), python_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// `_SCHEMA_X.members["name"]`, importing the schema if needed
pub(crate) fn member_schema(w: &mut CodeWriter, schema: &Symbol, member: &str) -> String {
    format!("{}.members[{}]", w.reference(schema), python_string(member))
}

/// Type annotation for a member target, imported and quoted as a whole when
/// the target is declared later in the file
pub(crate) fn annotation(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    target: &ShapeId,
    optional: bool,
) -> Result<String> {
    let symbol = cx.symbol(target)?;
    let mut text = w.reference(&symbol);
    if optional {
        text.push_str(" | None");
    }
    if cx.is_deferred(target) {
        text = format!("\"{}\"", text);
    }
    Ok(text)
}

/// A member has a usable default when it carries a non-null default trait
pub(crate) fn has_default(member: &Member) -> bool {
    member.default_value().map(|v| !v.is_null()).unwrap_or(false)
}

/// Members that may be absent: not required and without a default
pub(crate) fn is_optional(member: &Member) -> bool {
    !member.is_required() && !has_default(member)
}

/// Python expression for the member's default value, or None if it has none
pub(crate) fn default_expr(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    member: &Member,
) -> Result<Option<String>> {
    let value = match member.default_value() {
        Some(v) if !v.is_null() => v,
        _ => return Ok(None),
    };
    let target = cx.shape(&member.target)?;
    let expr = match (&target.kind, value) {
        (ShapeKind::List(_), _) => format!("{}(default_factory=list)", w.reference(&runtime::field())),
        (ShapeKind::Set(_), _) => format!("{}(default_factory=set)", w.reference(&runtime::field())),
        (ShapeKind::Map(_), _) => format!("{}(default_factory=dict)", w.reference(&runtime::field())),
        (ShapeKind::Enum(_), JsonValue::String(s)) => {
            format!("{}.{}", w.reference(&cx.symbol(&target.id)?), enum_constant_for(target, s)?)
        }
        (ShapeKind::Scalar(ScalarKind::Timestamp), v) => timestamp_default(cx, w, v)?,
        (ShapeKind::Scalar(ScalarKind::Blob), JsonValue::String(s)) if s.is_empty() => "b\"\"".to_string(),
        (ShapeKind::Scalar(ScalarKind::Blob), JsonValue::String(s)) => {
            format!("{}({})", w.reference(&runtime::b64decode()), python_string(s))
        }
        (ShapeKind::Scalar(ScalarKind::BigDecimal), v) => {
            let text = match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}({})", w.reference(&runtime::decimal()), python_string(&text))
        }
        (ShapeKind::Scalar(ScalarKind::Document), v) => format!(
            "{}(default_factory=lambda: {}({}))",
            w.reference(&runtime::field()),
            w.reference(&runtime::document()),
            python_literal(v)
        ),
        (_, v) => python_literal(v),
    };
    Ok(Some(expr))
}

fn enum_constant_for(shape: &crate::model::Shape, value: &str) -> Result<String> {
    match &shape.kind {
        ShapeKind::Enum(values) => values
            .iter()
            .find(|v| v.value == value)
            .map(|v| super::enumeration::constant_name(&v.name))
            .ok_or_else(|| {
                Error::InvalidModel(format!("default '{}' is not a value of enum {}", value, shape.id))
            }),
        _ => Err(Error::InvalidModel(format!("{} is not an enum", shape.id))),
    }
}

fn timestamp_default(cx: &CodegenContext<'_>, w: &mut CodeWriter, value: &JsonValue) -> Result<String> {
    Ok(match value {
        JsonValue::Number(n) if n.as_f64() == Some(0.0) => {
            w.reference(&default_timestamp_symbol(&cx.settings.module))
        }
        JsonValue::Number(n) => format!(
            "{}.fromtimestamp({}, tz={})",
            w.reference(&runtime::datetime()),
            n,
            w.reference(&runtime::utc())
        ),
        JsonValue::String(s) => {
            format!("{}.fromisoformat({})", w.reference(&runtime::datetime()), python_string(s))
        }
        other => {
            return Err(Error::InvalidModel(format!("invalid timestamp default {}", other)));
        }
    })
}

/// Writes one statement that serializes `value` with member schema `schema`
pub(crate) fn write_serialize(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    target: &ShapeId,
    serializer: &str,
    schema: &str,
    value: &str,
) -> Result<()> {
    let shape = cx.shape(target)?;
    match &shape.kind {
        ShapeKind::Scalar(kind) => {
            w.write("$L.write_$L($L, $L)", args![serializer, kind.method_suffix(), schema, value])
        }
        ShapeKind::Enum(_) => w.write("$L.write_string($L, $L)", args![serializer, schema, value]),
        ShapeKind::Structure(_) | ShapeKind::Union(_) => {
            w.write("$L.write_struct($L, $L)", args![serializer, schema, value])
        }
        ShapeKind::List(_) | ShapeKind::Set(_) | ShapeKind::Map(_) => {
            let symbol = cx.symbol(target)?;
            match symbol.property(SERIALIZER) {
                Some(helper) => w.write("$T($L, $L, $L)", args![helper, serializer, schema, value]),
                None if matches!(shape.kind, ShapeKind::Map(_)) => {
                    w.write("$L.write_map($L, $L)", args![serializer, schema, value])
                }
                None => w.write("$L.write_list($L, $L)", args![serializer, schema, value]),
            }
        }
        ShapeKind::Operation(_) | ShapeKind::Service(_) => Err(Error::InvalidModel(format!(
            "member targets {} {}",
            shape.kind.type_name(),
            target
        ))),
    }
}

/// Writes an expression, without a newline, that reads a value of `target`
/// from deserializer `de` using member schema `schema`
pub(crate) fn write_deserialize(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    target: &ShapeId,
    de: &str,
    schema: &str,
) -> Result<()> {
    let shape = cx.shape(target)?;
    match &shape.kind {
        ShapeKind::Scalar(kind) => w.write_inline("$L.read_$L($L)", args![de, kind.method_suffix(), schema]),
        ShapeKind::Enum(_) => {
            let symbol = cx.symbol(target)?;
            w.write_inline("$T($L.read_string($L))", args![&symbol, de, schema])
        }
        ShapeKind::Structure(_) => {
            let symbol = cx.symbol(target)?;
            w.write_inline("$T.deserialize($L)", args![&symbol, de])
        }
        ShapeKind::Union(_) => {
            let symbol = cx.symbol(target)?;
            w.write_inline("$T().deserialize($L)", args![symbol.expect_property(DESERIALIZER)?, de])
        }
        ShapeKind::List(_) | ShapeKind::Set(_) | ShapeKind::Map(_) => {
            let symbol = cx.symbol(target)?;
            match symbol.property(DESERIALIZER) {
                Some(helper) => w.write_inline("$T($L, $L)", args![helper, de, schema]),
                None if matches!(shape.kind, ShapeKind::Map(_)) => {
                    w.write_inline("$L.read_map($L)", args![de, schema])
                }
                None => w.write_inline("$L.read_list($L)", args![de, schema]),
            }
        }
        ShapeKind::Operation(_) | ShapeKind::Service(_) => Err(Error::InvalidModel(format!(
            "member targets {} {}",
            shape.kind.type_name(),
            target
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_to_python_literals() {
        assert_eq!(python_literal(&json!(null)), "None");
        assert_eq!(python_literal(&json!(true)), "True");
        assert_eq!(python_literal(&json!([1, "a"])), "[1, \"a\"]");
        assert_eq!(python_literal(&json!({"k": false})), "{\"k\": False}");
    }
}
