#![forbid(unsafe_code)]

mod error;
pub use error::{Error, Result};
pub mod auth;
pub mod builtin;
pub mod config;
pub mod format;
pub mod gen;
pub(crate) mod generators;
pub mod integration;
mod loader;
pub mod model;
pub mod protocol;
pub mod render;
pub mod runtime;
pub mod symbols;
pub mod topo;
pub mod writer;
pub use gen::{CodegenContext, GenerationResult, Generator};

pub use loader::{check_codegen_version, load_json_str, sources_to_model};

// re-export
pub use bytes::Bytes;
pub(crate) use bytes::BytesMut;

// common types used in this crate
pub(crate) type JsonValue = serde_json::Value;
pub(crate) type JsonMap = serde_json::Map<String, JsonValue>;

/// first line of every generated python file
pub const GENERATED_MARKER: &str = "# Code generated by shapegen. DO NOT EDIT.";

pub(crate) mod strings {
    /// re-export inflector string conversions
    pub use inflector::cases::{
        pascalcase::to_pascal_case, screamingsnakecase::to_screaming_snake_case,
        snakecase::to_snake_case,
    };
}
