//! Union declarations.
//!
//! A union `Payment` with members `card` and `cash` becomes:
//! - one dataclass per member (`PaymentCard`, `PaymentCash`) holding `value`
//! - `PaymentUnknown`, holding only the tag of a variant this client doesn't know.
//!   It can't be serialized.
//! - `type Payment = PaymentCard | PaymentCash | PaymentUnknown`
//! - `_PaymentDeserializer`, which fails unless exactly one known member is present.
//!   Unknown member indexes are logged and skipped.

use crate::{
    args,
    error::Result,
    gen::CodegenContext,
    generators::{
        member::{annotation, member_schema, write_deserialize, write_serialize},
        separate,
    },
    model::{Member, Shape, StructureOrUnion},
    runtime,
    symbols::{Symbol, DESERIALIZER, SCHEMA, UNKNOWN},
    writer::{Arg, CodeWriter, Section, WriterDelegator},
};

const NO_VALUE: &str = "Unions must have exactly one value, but found none.";
const MORE_THAN_ONE: &str = "Unions must have exactly one value, but found more than one.";
const UNKNOWN_SERIALIZE: &str = "Unknown union variants may not be serialized.";

pub(crate) fn generate_union(
    cx: &CodegenContext<'_>,
    writers: &mut WriterDelegator,
    shape: &Shape,
    body: &StructureOrUnion,
) -> Result<()> {
    let symbol = cx.symbol(&shape.id)?;
    let schema = symbol.expect_property(SCHEMA)?.clone();
    let unknown = symbol.expect_property(UNKNOWN)?.clone();
    let deserializer = symbol.expect_property(DESERIALIZER)?.clone();

    writers.use_shape_writer(&symbol, |w| {
        w.with_state(Some(Section::Union(shape.id.clone())), |w| {
            let mut variants = Vec::with_capacity(body.members.len() + 1);
            for member in body.members() {
                let variant = cx.symbol(&member.id)?;
                w.with_state(Some(Section::UnionMember(member.id.clone())), |w| {
                    write_variant(cx, w, member, &variant, &schema)
                })?;
                separate(w);
                variants.push(variant);
            }

            write_unknown(w, &unknown)?;
            separate(w);
            variants.push(unknown.clone());

            let names = variants.iter().map(|v| v.name()).collect::<Vec<_>>().join(" | ");
            w.write("type $L = $L", args![symbol.name(), names])?;
            if let Some(docs) = shape.traits.documentation() {
                w.write_docs(docs);
            }
            separate(w);

            write_deserializer(cx, w, body, &symbol, &deserializer, &schema)
        })?;
        separate(w);
        Ok(())
    })
}

fn write_variant(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    member: &Member,
    variant: &Symbol,
    schema: &Symbol,
) -> Result<()> {
    let member_schema = member_schema(w, schema, member.name());
    let hint = annotation(cx, w, &member.target, false)?;
    w.write("@$T", args![&runtime::dataclass()])?;
    w.open_block("class $L:", args![variant.name()], |w| {
        if let Some(docs) = member.traits.documentation() {
            w.write_docs(docs);
            w.newline();
        }
        w.write("value: $L", args![hint])?;
        w.newline();

        let serializer = runtime::shape_serializer();
        w.open_block("def serialize(self, serializer: $T):", args![&serializer], |w| {
            w.write("serializer.write_struct($T, self)", args![schema])
        })?;
        w.newline();
        w.open_block("def serialize_members(self, serializer: $T):", args![&serializer], |w| {
            write_serialize(cx, w, &member.target, "serializer", &member_schema, "self.value")
        })?;
        w.newline();

        w.write("@classmethod", args![])?;
        w.open_block(
            "def deserialize(cls, deserializer: $T) -> $T:",
            args![&runtime::shape_deserializer(), &runtime::self_type()],
            |w| {
                w.write(
                    "return cls(value=$C)",
                    args![Arg::block(|w| {
                        write_deserialize(cx, w, &member.target, "deserializer", &member_schema)
                    })],
                )
            },
        )
    })
}

fn write_unknown(w: &mut CodeWriter, unknown: &Symbol) -> Result<()> {
    let error = runtime::serialization_error();
    let serializer = runtime::shape_serializer();
    w.write("@$T", args![&runtime::dataclass()])?;
    w.open_block("class $L:", args![unknown.name()], |w| {
        w.write_docs(
            "Represents an unknown variant.\n\n\
             If you receive this value, you will need to update your library to receive the\n\
             parsed value.\n\n\
             This value may not be deliberately sent.",
        );
        w.newline();
        w.write("tag: str", args![])?;
        w.newline();
        w.open_block("def serialize(self, serializer: $T):", args![&serializer], |w| {
            w.write("raise $T($S)", args![&error, UNKNOWN_SERIALIZE])
        })?;
        w.newline();
        w.open_block("def serialize_members(self, serializer: $T):", args![&serializer], |w| {
            w.write("raise $T($S)", args![&error, UNKNOWN_SERIALIZE])
        })?;
        w.newline();
        w.write("@classmethod", args![])?;
        w.open_block(
            "def deserialize(cls, deserializer: $T) -> $T:",
            args![&runtime::shape_deserializer(), &runtime::self_type()],
            |w| w.write("raise NotImplementedError()", args![]),
        )
    })
}

fn write_deserializer(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    body: &StructureOrUnion,
    union: &Symbol,
    deserializer: &Symbol,
    schema: &Symbol,
) -> Result<()> {
    let error = runtime::serialization_error();
    let shape_deserializer = runtime::shape_deserializer();
    w.open_block("class $L:", args![deserializer.name()], |w| {
        w.write("_result: $L | None = None", args![union.name()])?;
        w.newline();
        w.open_block(
            "def deserialize(self, deserializer: $T) -> $L:",
            args![&shape_deserializer, union.name()],
            |w| {
                w.write("self._result = None", args![])?;
                w.write("deserializer.read_struct($T, self._consumer)", args![schema])?;
                w.newline();
                w.open_block("if self._result is None:", args![], |w| {
                    w.write("raise $T($S)", args![&error, NO_VALUE])
                })?;
                w.newline();
                w.write("return self._result", args![])
            },
        )?;
        w.newline();

        w.open_block(
            "def _consumer(self, schema: $T, de: $T) -> None:",
            args![&runtime::schema(), &shape_deserializer],
            |w| {
                w.open_block("match schema.expect_member_index():", args![], |w| {
                    for (index, member) in body.members().enumerate() {
                        let variant = cx.symbol(&member.id)?;
                        w.open_block("case $L:", args![Arg::lit(index)], |w| {
                            w.write("self._set_result($L.deserialize(de))", args![variant.name()])
                        })?;
                        w.newline();
                    }
                    w.open_block("case _:", args![], |w| {
                        w.write("logger.debug($S, schema)", args!["Unexpected member schema: %s"])
                    })
                })
            },
        )?;
        w.newline();

        w.open_block("def _set_result(self, value: $L) -> None:", args![union.name()], |w| {
            w.open_block("if self._result is not None:", args![], |w| {
                w.write("raise $T($S)", args![&error, MORE_THAN_ONE])
            })?;
            w.write("self._result = value", args![])
        })
    })
}
