//! Serializer and deserializer functions for lists, sets and maps whose
//! values need converting. Other collections use python's builtin containers
//! and the runtime's `write_list`/`read_list` directly, so nothing is written.

use tracing::trace;

use crate::{
    args,
    error::Result,
    gen::CodegenContext,
    generators::{
        member::{write_deserialize, write_serialize},
        separate,
    },
    model::{Member, Shape, ShapeKind},
    runtime,
    symbols::{Symbol, DESERIALIZER, SERIALIZER},
    writer::{Arg, CodeWriter, WriterDelegator},
};

pub(crate) fn generate_collection(
    cx: &CodegenContext<'_>,
    writers: &mut WriterDelegator,
    shape: &Shape,
) -> Result<()> {
    let symbol = cx.symbol(&shape.id)?;
    let (serializer, deserializer) = match (symbol.property(SERIALIZER), symbol.property(DESERIALIZER)) {
        (Some(s), Some(d)) => (s.clone(), d.clone()),
        _ => {
            trace!(id = %shape.id, "collection needs no helpers");
            return Ok(());
        }
    };
    let annotation = {
        let text = symbol.name().to_string();
        if cx.is_deferred(&shape.id) {
            format!("\"{}\"", text)
        } else {
            text
        }
    };

    writers.use_shape_writer(&serializer, |w| {
        w.add_import(&symbol);
        match &shape.kind {
            ShapeKind::List(l) | ShapeKind::Set(l) => {
                write_list_serializer(cx, w, &serializer, &annotation, &l.member)?;
                separate(w);
                let set = matches!(shape.kind, ShapeKind::Set(_));
                write_list_deserializer(cx, w, &deserializer, &annotation, &l.member, set)?;
            }
            ShapeKind::Map(m) => {
                write_map_serializer(cx, w, &serializer, &annotation, &m.value)?;
                separate(w);
                write_map_deserializer(cx, w, &deserializer, &annotation, &m.value)?;
            }
            _ => {}
        }
        separate(w);
        Ok(())
    })
}

fn write_list_serializer(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    function: &Symbol,
    annotation: &str,
    member: &Member,
) -> Result<()> {
    w.open_block(
        "def $L(serializer: $T, schema: $T, value: $L) -> None:",
        args![function.name(), &runtime::shape_serializer(), &runtime::schema(), annotation],
        |w| {
            w.write("member_schema = schema.members[\"member\"]", args![])?;
            w.open_block("with serializer.begin_list(schema, len(value)) as ls:", args![], |w| {
                w.open_block("for e in value:", args![], |w| {
                    write_serialize(cx, w, &member.target, "ls", "member_schema", "e")
                })
            })
        },
    )
}

fn write_list_deserializer(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    function: &Symbol,
    annotation: &str,
    member: &Member,
    set: bool,
) -> Result<()> {
    let deserializer = runtime::shape_deserializer();
    let (empty, add) = if set { ("set()", "add") } else { ("[]", "append") };
    w.open_block(
        "def $L(deserializer: $T, schema: $T) -> $L:",
        args![function.name(), &deserializer, &runtime::schema(), annotation],
        |w| {
            w.write("result: $L = $L", args![annotation, empty])?;
            w.write("member_schema = schema.members[\"member\"]", args![])?;
            w.open_block("def _read_value(d: $T):", args![&deserializer], |w| {
                w.open_block("if d.is_null():", args![], |w| w.write("d.read_null()", args![]))?;
                w.open_block("else:", args![], |w| {
                    w.write(
                        "result.$L($C)",
                        args![
                            add,
                            Arg::block(|w| write_deserialize(cx, w, &member.target, "d", "member_schema"))
                        ],
                    )
                })
            })?;
            w.write("deserializer.read_list(schema, _read_value)", args![])?;
            w.write("return result", args![])
        },
    )
}

fn write_map_serializer(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    function: &Symbol,
    annotation: &str,
    value: &Member,
) -> Result<()> {
    w.open_block(
        "def $L(serializer: $T, schema: $T, value: $L) -> None:",
        args![function.name(), &runtime::shape_serializer(), &runtime::schema(), annotation],
        |w| {
            w.write("value_schema = schema.members[\"value\"]", args![])?;
            w.newline();
            w.open_block(
                "def _write_value(vs: $T, v: $T) -> None:",
                args![&runtime::shape_serializer(), &runtime::any()],
                |w| write_serialize(cx, w, &value.target, "vs", "value_schema", "v"),
            )?;
            w.newline();
            w.open_block("with serializer.begin_map(schema, len(value)) as m:", args![], |w| {
                w.open_block("for k, v in value.items():", args![], |w| {
                    w.write("m.entry(k, lambda vs: _write_value(vs, v))", args![])
                })
            })
        },
    )
}

fn write_map_deserializer(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    function: &Symbol,
    annotation: &str,
    value: &Member,
) -> Result<()> {
    let deserializer = runtime::shape_deserializer();
    w.open_block(
        "def $L(deserializer: $T, schema: $T) -> $L:",
        args![function.name(), &deserializer, &runtime::schema(), annotation],
        |w| {
            w.write("result: $L = {}", args![annotation])?;
            w.write("value_schema = schema.members[\"value\"]", args![])?;
            w.open_block("def _read_value(k: str, d: $T):", args![&deserializer], |w| {
                w.open_block("if d.is_null():", args![], |w| w.write("d.read_null()", args![]))?;
                w.open_block("else:", args![], |w| {
                    w.write(
                        "result[k] = $C",
                        args![Arg::block(|w| write_deserialize(cx, w, &value.target, "d", "value_schema"))],
                    )
                })
            })?;
            w.write("deserializer.read_map(schema, _read_value)", args![])?;
            w.write("return result", args![])
        },
    )
}
