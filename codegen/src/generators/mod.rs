//! Declaration generators, one per shape kind.
//!
//! `generate_shape` dispatches on the shape kind. Model classes go to
//! `{module}/models.py` and schema constants to `{module}/_private/schemas.py`.

use tracing::trace;

use crate::{
    error::Result,
    gen::CodegenContext,
    model::{Shape, ShapeKind},
    writer::WriterDelegator,
};

pub(crate) mod client;
pub(crate) mod collection;
pub(crate) mod config;
pub(crate) mod enumeration;
pub(crate) mod errors;
pub(crate) mod member;
pub(crate) mod schema;
pub(crate) mod structure;
pub(crate) mod union;

/// Writes the declarations for one shape
pub(crate) fn generate_shape(
    cx: &CodegenContext<'_>,
    writers: &mut WriterDelegator,
    shape: &Shape,
) -> Result<()> {
    if shape.is_trait_definition() {
        trace!(id = %shape.id, "skipping trait definition");
        return Ok(());
    }
    match &shape.kind {
        ShapeKind::Structure(s) => {
            schema::generate_schema(cx, writers, shape)?;
            structure::generate_structure(cx, writers, shape, s)
        }
        ShapeKind::Union(u) => {
            schema::generate_schema(cx, writers, shape)?;
            union::generate_union(cx, writers, shape, u)
        }
        ShapeKind::List(_) | ShapeKind::Set(_) | ShapeKind::Map(_) => {
            schema::generate_schema(cx, writers, shape)?;
            collection::generate_collection(cx, writers, shape)
        }
        ShapeKind::Enum(values) => {
            schema::generate_schema(cx, writers, shape)?;
            enumeration::generate_enum(cx, writers, shape, values)
        }
        ShapeKind::Scalar(_) => schema::generate_schema(cx, writers, shape),
        // the client generator writes operations and the service
        ShapeKind::Operation(_) | ShapeKind::Service(_) => Ok(()),
    }
}

/// blank lines between top-level python declarations
pub(crate) fn separate(w: &mut crate::writer::CodeWriter) {
    w.newline();
    w.newline();
}
