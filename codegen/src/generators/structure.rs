//! Structure declarations: a keyword-only dataclass with `serialize`,
//! `serialize_members`, `deserialize` and `deserialize_kwargs`.
//!
//! Deserialization dispatches on the member index the runtime reports for
//! each member it reads. Indices without a case are logged and skipped.

use crate::{
    args,
    error::{Error, Result},
    gen::CodegenContext,
    generators::{
        errors::api_error_symbol,
        member::{
            annotation, default_expr, has_default, is_optional, member_schema, write_deserialize,
            write_serialize,
        },
        separate,
    },
    model::{error_trait, Member, Shape, StructureOrUnion},
    runtime,
    symbols::{Symbol, SCHEMA},
    writer::{Arg, CodeWriter, Section, WriterDelegator},
};

pub(crate) fn generate_structure(
    cx: &CodegenContext<'_>,
    writers: &mut WriterDelegator,
    shape: &Shape,
    body: &StructureOrUnion,
) -> Result<()> {
    let symbol = cx.symbol(&shape.id)?;
    let schema = symbol.expect_property(SCHEMA)?.clone();
    writers.use_shape_writer(&symbol, |w| {
        w.with_state(Some(Section::Structure(shape.id.clone())), |w| {
            w.write("@$T(kw_only=True)", args![&runtime::dataclass()])?;
            if shape.is_error() {
                write_error_header(cx, w, &symbol, shape.id.shape_name())?;
            } else {
                w.write("class $L:", args![symbol.name()])?;
            }
            w.indent();
            let result = write_class_body(cx, w, shape, body, &schema);
            w.dedent();
            result
        })?;
        separate(w);
        Ok(())
    })
}

/// fault of an error structure, "client" or "server"
fn error_fault(shape: &Shape) -> Result<String> {
    match shape.traits.get(error_trait()).and_then(|v| v.as_str()) {
        Some(fault @ ("client" | "server")) => Ok(fault.to_string()),
        other => Err(Error::InvalidModel(format!(
            "error trait on {} must be \"client\" or \"server\", found {:?}",
            shape.id, other
        ))),
    }
}

fn write_error_header(cx: &CodegenContext<'_>, w: &mut CodeWriter, symbol: &Symbol, code: &str) -> Result<()> {
    w.write(
        "class $L($T[$T[$S]]):",
        args![symbol.name(), &api_error_symbol(&cx.settings.module), &runtime::literal(), code],
    )
}

fn write_error_fields(w: &mut CodeWriter, code: &str, fault: &str) -> Result<()> {
    let literal = runtime::literal();
    w.write("code: $T[$S] = $S", args![&literal, code, code])?;
    w.write("fault: $T[\"client\", \"server\"] | None = $S", args![&literal, fault])?;
    w.newline();
    Ok(())
}

/// required members without defaults first, then the rest, keeping declaration order
fn field_order(body: &StructureOrUnion) -> Vec<&Member> {
    let (first, rest): (Vec<&Member>, Vec<&Member>) = body
        .members()
        .partition(|m| m.is_required() && !has_default(m));
    first.into_iter().chain(rest).collect()
}

fn write_class_body(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    shape: &Shape,
    body: &StructureOrUnion,
    schema: &Symbol,
) -> Result<()> {
    if let Some(docs) = shape.traits.documentation() {
        w.write_docs(docs);
        w.newline();
    }
    if shape.is_error() {
        write_error_fields(w, shape.id.shape_name(), &error_fault(shape)?)?;
    }

    for member in field_order(body) {
        write_field(cx, w, member)?;
    }

    let serializer = runtime::shape_serializer();
    w.open_block("def serialize(self, serializer: $T):", args![&serializer], |w| {
        w.write("serializer.write_struct($T, self)", args![schema])
    })?;
    w.newline();

    w.open_block("def serialize_members(self, serializer: $T):", args![&serializer], |w| {
        if body.members.is_empty() {
            return w.write("pass", args![]);
        }
        for member in body.members() {
            let name = cx.member_name(member);
            let member_schema = member_schema(w, schema, member.name());
            let value = format!("self.{}", name);
            if is_optional(member) {
                w.open_block("if self.$L is not None:", args![&name], |w| {
                    write_serialize(cx, w, &member.target, "serializer", &member_schema, &value)
                })?;
            } else {
                write_serialize(cx, w, &member.target, "serializer", &member_schema, &value)?;
            }
        }
        Ok(())
    })?;
    w.newline();

    let deserializer = runtime::shape_deserializer();
    w.write("@classmethod", args![])?;
    w.open_block(
        "def deserialize(cls, deserializer: $T) -> $T:",
        args![&deserializer, &runtime::self_type()],
        |w| w.write("return cls(**cls.deserialize_kwargs(deserializer))", args![]),
    )?;
    w.newline();

    let any = runtime::any();
    w.write("@classmethod", args![])?;
    w.open_block(
        "def deserialize_kwargs(cls, deserializer: $T) -> dict[str, $T]:",
        args![&deserializer, &any],
        |w| {
            w.write("kwargs: dict[str, $T] = {}", args![&any])?;
            w.newline();
            w.open_block(
                "def _consumer(schema: $T, de: $T) -> None:",
                args![&runtime::schema(), &deserializer],
                |w| write_member_dispatch(cx, w, body, schema),
            )?;
            w.newline();
            w.write("deserializer.read_struct($T, consumer=_consumer)", args![schema])?;
            w.write("return kwargs", args![])
        },
    )
}

fn write_field(cx: &CodegenContext<'_>, w: &mut CodeWriter, member: &Member) -> Result<()> {
    let name = cx.member_name(member);
    let optional = is_optional(member);
    let hint = annotation(cx, w, &member.target, optional)?;
    if let Some(default) = default_expr(cx, w, member)? {
        w.write("$L: $L = $L", args![&name, hint, default])?;
    } else if optional {
        w.write("$L: $L = None", args![&name, hint])?;
    } else {
        w.write("$L: $L", args![&name, hint])?;
    }
    if let Some(docs) = member.traits.documentation() {
        w.write_docs(docs);
    }
    w.newline();
    Ok(())
}

fn write_member_dispatch(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    body: &StructureOrUnion,
    schema: &Symbol,
) -> Result<()> {
    w.open_block("match schema.expect_member_index():", args![], |w| {
        for (index, member) in body.members().enumerate() {
            let name = cx.member_name(member);
            let member_schema = member_schema(w, schema, member.name());
            w.open_block("case $L:", args![Arg::lit(index)], |w| {
                w.write(
                    "kwargs[$S] = $C",
                    args![
                        &name,
                        Arg::block(|w| write_deserialize(cx, w, &member.target, "de", &member_schema))
                    ],
                )
            })?;
            w.newline();
        }
        w.open_block("case _:", args![], |w| {
            w.write("logger.debug($S, schema)", args!["Unexpected member schema: %s"])
        })
    })
}
