//! Schema constants in `{module}/_private/schemas.py`.
//!
//! Recursive shapes are declared in two steps. Every recursive shape gets a
//! member-less shell at the top of the file, before anything else; its
//! members are filled in with `update_members` when the shape is visited.
//! Non-recursive schemas can then refer to a recursive one at any point.

use crate::{
    args,
    error::Result,
    gen::CodegenContext,
    generators::{member::python_literal, separate},
    model::{documentation_trait, enum_value_trait, unit_shape, Member, Shape, ShapeId, ShapeKind, Traits},
    runtime,
    symbols::SCHEMA,
    writer::{CodeWriter, Section, WriterDelegator},
    JsonValue,
};

/// traits that are only useful to humans
const SKIPPED_TRAITS: &[&str] = &["smithy.api#examples", "smithy.api#since", "smithy.api#tags"];

fn shape_type(shape: &Shape) -> &'static str {
    match &shape.kind {
        ShapeKind::Structure(_) => "STRUCTURE",
        ShapeKind::Union(_) => "UNION",
        ShapeKind::List(_) | ShapeKind::Set(_) => "LIST",
        ShapeKind::Map(_) => "MAP",
        ShapeKind::Enum(_) => "ENUM",
        ShapeKind::Scalar(kind) => match kind.method_suffix() {
            "blob" => "BLOB",
            "boolean" => "BOOLEAN",
            "string" => "STRING",
            "byte" => "BYTE",
            "short" => "SHORT",
            "integer" => "INTEGER",
            "long" => "LONG",
            "float" => "FLOAT",
            "double" => "DOUBLE",
            "big_integer" => "BIG_INTEGER",
            "big_decimal" => "BIG_DECIMAL",
            "timestamp" => "TIMESTAMP",
            _ => "DOCUMENT",
        },
        ShapeKind::Operation(_) => "OPERATION",
        ShapeKind::Service(_) => "SERVICE",
    }
}

fn has_members(shape: &Shape) -> bool {
    !matches!(shape.kind, ShapeKind::Scalar(_))
}

fn kept_traits(traits: &Traits) -> Vec<&(ShapeId, JsonValue)> {
    traits
        .iter()
        .filter(|(id, _)| {
            id != documentation_trait() && !SKIPPED_TRAITS.contains(&id.to_string().as_str())
        })
        .collect()
}

/// Writes `traits=[...],` unless there are no traits worth keeping
fn write_traits(w: &mut CodeWriter, traits: &Traits) -> Result<()> {
    let kept = kept_traits(traits);
    if kept.is_empty() {
        return Ok(());
    }
    w.open_block("traits=[", args![], |w| write_trait_list(w, &kept))?;
    w.write("],", args![])
}

/// `Trait.new(...)` entries, without the surrounding brackets
fn write_trait_list(w: &mut CodeWriter, traits: &[&(ShapeId, JsonValue)]) -> Result<()> {
    let trait_value = runtime::trait_value();
    let shape_id = runtime::shape_id();
    for (id, value) in traits.iter().map(|t| (&t.0, &t.1)) {
        let annotation = value.is_null() || value.as_object().map(|o| o.is_empty()).unwrap_or(false);
        if annotation {
            w.write("$T.new(id=$T($S)),", args![&trait_value, &shape_id, id.to_string()])?;
        } else {
            w.write(
                "$T.new(id=$T($S), value=$L),",
                args![&trait_value, &shape_id, id.to_string(), python_literal(value)],
            )?;
        }
    }
    Ok(())
}

fn write_member(cx: &CodegenContext<'_>, w: &mut CodeWriter, member: &Member) -> Result<()> {
    let target = cx.symbol(&member.target)?;
    let target_schema = target.expect_property(SCHEMA)?.clone();
    w.open_block("$S: {", args![member.name()], |w| {
        w.write("\"target\": $T,", args![&target_schema])?;
        let kept = kept_traits(&member.traits);
        if !kept.is_empty() {
            w.open_block("\"traits\": [", args![], |w| write_trait_list(w, &kept))?;
            w.write("],", args![])?;
        }
        Ok(())
    })?;
    w.write("},", args![])
}

/// Writes the lines of a members dict, without the surrounding braces
fn write_members(cx: &CodegenContext<'_>, w: &mut CodeWriter, shape: &Shape) -> Result<()> {
    match &shape.kind {
        ShapeKind::Enum(values) => {
            let unit_schema =
                cx.symbol(unit_shape())?.expect_property(SCHEMA)?.clone();
            let trait_value = runtime::trait_value();
            let shape_id = runtime::shape_id();
            for value in values {
                w.open_block("$S: {", args![&value.name], |w| {
                    w.write("\"target\": $T,", args![&unit_schema])?;
                    w.write(
                        "\"traits\": [$T.new(id=$T($S), value=$S)],",
                        args![
                            &trait_value,
                            &shape_id,
                            enum_value_trait().to_string(),
                            &value.value
                        ],
                    )
                })?;
                w.write("},", args![])?;
            }
            Ok(())
        }
        kind => {
            for member in kind.members() {
                write_member(cx, w, member)?;
            }
            Ok(())
        }
    }
}

/// Writes `NAME = Schema...(` through the traits, for full schemas and shells
fn write_header(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    shape: &Shape,
    with_members: bool,
) -> Result<()> {
    let symbol = cx.symbol(&shape.id)?;
    let schema = symbol.expect_property(SCHEMA)?.clone();
    let constructor = if has_members(shape) { "Schema.collection" } else { "Schema" };
    w.add_import(&runtime::schema());
    w.open_block("$L = $L(", args![schema.name(), constructor], |w| {
        w.write("id=$T($S),", args![&runtime::shape_id(), shape.id.to_string()])?;
        if !matches!(shape.kind, ShapeKind::Structure(_)) {
            w.write("shape_type=$T.$L,", args![&runtime::shape_type(), shape_type(shape)])?;
        }
        write_traits(w, &shape.traits)?;
        if with_members {
            w.open_block("members={", args![], |w| write_members(cx, w, shape))?;
            w.write("},", args![])?;
        }
        Ok(())
    })?;
    w.write(")", args![])
}

/// Member-less declarations of every recursive shape.
/// Must run before any other schema is written.
pub(crate) fn generate_recursive_shells(
    cx: &CodegenContext<'_>,
    writers: &mut WriterDelegator,
) -> Result<()> {
    for id in cx.index.recursive_shapes() {
        let shape = cx.shape(id)?;
        let symbol = cx.symbol(id)?;
        let schema = symbol.expect_property(SCHEMA)?.clone();
        writers.use_shape_writer(&schema, |w| {
            write_header(cx, w, shape, false)?;
            separate(w);
            Ok(())
        })?;
    }
    Ok(())
}

/// Writes the schema constant of a shape, or the members of a recursive shell
pub(crate) fn generate_schema(
    cx: &CodegenContext<'_>,
    writers: &mut WriterDelegator,
    shape: &Shape,
) -> Result<()> {
    let symbol = cx.symbol(&shape.id)?;
    let schema = symbol.expect_property(SCHEMA)?.clone();
    let recursive = cx.index.is_recursive(&shape.id);
    writers.use_shape_writer(&schema, |w| {
        w.with_state(Some(Section::Schema(shape.id.clone())), |w| {
            if recursive {
                w.open_block("$L.update_members({", args![schema.name()], |w| {
                    write_members(cx, w, shape)
                })?;
                w.write("})", args![])
            } else {
                write_header(cx, w, shape, has_members(shape))
            }
        })?;
        separate(w);
        Ok(())
    })
}
