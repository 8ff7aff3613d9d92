//! Symbols provided by the python runtime packages that generated code imports.

use crate::symbols::{PythonDependency, Symbol};

pub const SMITHY_CORE: &str = "smithy_core";
pub const SMITHY_HTTP: &str = "smithy_http";
pub const SMITHY_JSON: &str = "smithy_json";
pub const SMITHY_AWS_CORE: &str = "smithy_aws_core";

/// runtime version the generated code is written against
const RUNTIME_VERSION: &str = "~=0.1.0";

/// pyproject dependency for a runtime module
pub fn dependency(module: &str) -> PythonDependency {
    PythonDependency::new(&module.replace('_', "-"), RUNTIME_VERSION)
}

fn runtime(module: &str, name: &str) -> Symbol {
    let package = module.split('.').next().unwrap_or(module);
    Symbol::new(name, module).with_dependency(dependency(package))
}

fn stdlib(module: &str, name: &str) -> Symbol {
    Symbol::new(name, module)
}

pub fn document() -> Symbol {
    runtime("smithy_core.documents", "Document")
}

pub fn schema() -> Symbol {
    runtime("smithy_core.schemas", "Schema")
}

pub fn shape_id() -> Symbol {
    runtime("smithy_core.shapes", "ShapeID")
}

pub fn shape_type() -> Symbol {
    runtime("smithy_core.shapes", "ShapeType")
}

pub fn trait_value() -> Symbol {
    runtime("smithy_core.traits", "Trait")
}

pub fn shape_serializer() -> Symbol {
    runtime("smithy_core.serializers", "ShapeSerializer")
}

pub fn shape_deserializer() -> Symbol {
    runtime("smithy_core.deserializers", "ShapeDeserializer")
}

pub fn serialization_error() -> Symbol {
    runtime("smithy_core.exceptions", "SerializationError")
}

pub fn smithy_exception() -> Symbol {
    runtime("smithy_core.exceptions", "SmithyException")
}

pub fn auth_option() -> Symbol {
    runtime("smithy_core.auth", "AuthOption")
}

pub fn auth_params() -> Symbol {
    runtime("smithy_core.auth", "AuthParams")
}

pub fn interceptor() -> Symbol {
    runtime("smithy_core.interceptors", "Interceptor")
}

pub fn retry_strategy() -> Symbol {
    runtime("smithy_core.retries", "RetryStrategy")
}

pub fn simple_retry_strategy() -> Symbol {
    runtime("smithy_core.retries", "SimpleRetryStrategy")
}

pub fn client_protocol() -> Symbol {
    runtime("smithy_core.aio.interfaces", "ClientProtocol")
}

pub fn http_client() -> Symbol {
    runtime("smithy_http.aio.interfaces", "HTTPClient")
}

pub fn aiohttp_client() -> Symbol {
    runtime("smithy_http.aio.aiohttp", "AIOHTTPClient")
}

pub fn http_request() -> Symbol {
    runtime("smithy_http.aio", "HTTPRequest")
}

pub fn http_response() -> Symbol {
    runtime("smithy_http.aio.interfaces", "HTTPResponse")
}

pub fn http_fields() -> Symbol {
    runtime("smithy_http", "Fields")
}

pub fn http_field() -> Symbol {
    runtime("smithy_http", "Field")
}

pub fn uri() -> Symbol {
    runtime("smithy_core", "URI")
}

pub fn retry_error() -> Symbol {
    runtime("smithy_core.exceptions", "SmithyRetryException")
}

pub fn http_auth_scheme() -> Symbol {
    runtime("smithy_http.aio.interfaces.auth", "HTTPAuthScheme")
}

/// prelude schema constant for a prelude shape name, e.g. `String` -> `STRING`
pub fn prelude_schema(screaming_name: &str) -> Symbol {
    runtime("smithy_core.prelude", screaming_name)
}

pub fn dataclass() -> Symbol {
    stdlib("dataclasses", "dataclass")
}

pub fn field() -> Symbol {
    stdlib("dataclasses", "field")
}

pub fn any() -> Symbol {
    stdlib("typing", "Any")
}

pub fn literal() -> Symbol {
    stdlib("typing", "Literal")
}

pub fn self_type() -> Symbol {
    stdlib("typing", "Self")
}

pub fn str_enum() -> Symbol {
    stdlib("enum", "StrEnum")
}

pub fn datetime() -> Symbol {
    stdlib("datetime", "datetime")
}

pub fn utc() -> Symbol {
    stdlib("datetime", "UTC")
}

pub fn decimal() -> Symbol {
    stdlib("decimal", "Decimal")
}

pub fn b64decode() -> Symbol {
    stdlib("base64", "b64decode")
}

pub fn deepcopy() -> Symbol {
    stdlib("copy", "deepcopy")
}

pub fn replace() -> Symbol {
    stdlib("dataclasses", "replace")
}

pub fn urlparse() -> Symbol {
    stdlib("urllib.parse", "urlparse")
}

pub fn awaitable() -> Symbol {
    stdlib("collections.abc", "Awaitable")
}

pub fn quote() -> Symbol {
    stdlib("urllib.parse", "quote")
}

pub fn callable() -> Symbol {
    stdlib("collections.abc", "Callable")
}

pub fn sequence() -> Symbol {
    stdlib("collections.abc", "Sequence")
}

/// true if the module is part of the python standard library
pub fn is_stdlib_module(module: &str) -> bool {
    const STDLIB: &[&str] = &[
        "abc",
        "asyncio",
        "base64",
        "collections",
        "copy",
        "dataclasses",
        "datetime",
        "decimal",
        "enum",
        "functools",
        "logging",
        "typing",
        "urllib",
        "uuid",
    ];
    let root = module.split('.').next().unwrap_or(module);
    STDLIB.contains(&root)
}
