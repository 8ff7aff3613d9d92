//! Request serializers and response deserializers for HTTP protocols that send
//! the whole input as the body, encoded by a runtime codec.
//!
//! restJson1 takes method and path from the operation's `@http` trait and
//! substitutes path labels. rpcv2Cbor always POSTs to
//! `/service/{Service}/operation/{Operation}`.

use serde::Deserialize;

use crate::{
    args,
    error::{Error, Result},
    gen::CodegenContext,
    generators::{
        config::config_symbol,
        errors::{api_error_symbol, unknown_api_error_symbol},
    },
    integration::ProtocolGenerator,
    model::{Operation, Shape, ShapeId, ShapeKind, PRELUDE_NAMESPACE},
    protocol::{deserializer_symbol, serializer_symbol},
    runtime,
    symbols::{PythonDependency, Symbol},
    writer::{python_string, CodeWriter},
};

const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Routing {
    /// method and uri from `@http`
    Rest,
    /// fixed rpc path
    Rpc,
}

#[derive(Debug, Deserialize)]
struct HttpTrait {
    method: String,
    uri: String,
}

pub struct HttpProtocolGenerator {
    protocol: ShapeId,
    routing: Routing,
    content_type: &'static str,
    codec: Symbol,
    /// extra request header, name and value
    header: Option<(&'static str, &'static str)>,
}

impl HttpProtocolGenerator {
    pub fn rest_json() -> Self {
        HttpProtocolGenerator {
            protocol: ShapeId::new_unchecked("aws.protocols", "restJson1", None),
            routing: Routing::Rest,
            content_type: "application/json",
            codec: Symbol::new("JSONCodec", runtime::SMITHY_JSON)
                .with_dependency(runtime::dependency(runtime::SMITHY_JSON)),
            header: None,
        }
    }

    pub fn rpcv2_cbor() -> Self {
        HttpProtocolGenerator {
            protocol: ShapeId::new_unchecked("smithy.protocols", "rpcv2Cbor", None),
            routing: Routing::Rpc,
            content_type: "application/cbor",
            codec: Symbol::new("CBORCodec", "smithy_cbor")
                .with_dependency(runtime::dependency("smithy_cbor")),
            header: Some(("smithy-protocol", "rpc-v2-cbor")),
        }
    }

    fn request_line(&self, cx: &CodegenContext<'_>, operation: &Shape) -> Result<(String, String)> {
        match self.routing {
            Routing::Rpc => Ok((
                "POST".to_string(),
                format!(
                    "/service/{}/operation/{}",
                    cx.service.id.shape_name(),
                    operation.id.shape_name()
                ),
            )),
            Routing::Rest => {
                let http_id = ShapeId::new_unchecked(PRELUDE_NAMESPACE, "http", None);
                Ok(match operation.traits.get_as::<HttpTrait>(&http_id)? {
                    Some(http) => (http.method, http.uri),
                    None => ("POST".to_string(), "/".to_string()),
                })
            }
        }
    }

    fn write_serializer(
        &self,
        cx: &CodegenContext<'_>,
        w: &mut CodeWriter,
        operation: &Shape,
        body: &Operation,
    ) -> Result<()> {
        let function = serializer_symbol(&cx.settings.module, &operation.id);
        let input = cx.operation_io(body.input.as_ref())?;
        let (method, uri) = self.request_line(cx, operation)?;
        let (path, query) = match uri.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (uri.clone(), None),
        };

        let input_hint = match &input {
            Some(symbol) => w.reference(symbol),
            None => "None".to_string(),
        };
        let config = config_symbol(&cx.settings.module);
        w.open_block(
            "async def $L(input: $L, config: $T) -> $T:",
            args![function.name(), input_hint, &config, &runtime::http_request()],
            |w| {
                w.write_inline("path = $S", args![&path])?;
                for label in labels(&path) {
                    let member = body
                        .input
                        .as_ref()
                        .filter(|_| input.is_some())
                        .and_then(|id| cx.model.get(id))
                        .and_then(|s| s.member(&label))
                        .ok_or_else(|| {
                            Error::InvalidModel(format!(
                                "{} uri label {{{}}} has no matching input member",
                                operation.id, label
                            ))
                        })?;
                    let token = format!("{{{}}}", label_token(&path, &label));
                    w.write_inline(
                        ".replace($S, $T(str(input.$L), safe=\"\"))",
                        args![token, &runtime::quote(), cx.member_name(member)],
                    )?;
                }
                w.newline();
                if input.is_some() {
                    w.write("body = $T().serialize(input)", args![&self.codec])?;
                } else {
                    w.write("body = b\"\"", args![])?;
                }
                let query = query.map(|q| python_string(&q)).unwrap_or_else(|| "None".to_string());
                w.open_block("return $T(", args![&runtime::http_request()], |w| {
                    w.write("method=$S,", args![&method])?;
                    w.write("destination=$T(host=\"\", path=path, query=$L),", args![&runtime::uri(), query])?;
                    w.write_inline(
                        "fields=$T([$T(name=\"Content-Type\", values=[$S])",
                        args![&runtime::http_fields(), &runtime::http_field(), self.content_type],
                    )?;
                    if let Some((name, value)) = self.header {
                        w.write_inline(", $T(name=$S, values=[$S])", args![&runtime::http_field(), name, value])?;
                    }
                    w.write("]),", args![])?;
                    w.write("body=body,", args![])
                })?;
                w.write(")", args![])
            },
        )
    }

    fn write_deserializer(
        &self,
        cx: &CodegenContext<'_>,
        w: &mut CodeWriter,
        operation: &Shape,
        body: &Operation,
    ) -> Result<()> {
        let function = deserializer_symbol(&cx.settings.module, &operation.id);
        let output = cx.operation_io(body.output.as_ref())?;
        let output_hint = match &output {
            Some(symbol) => w.reference(symbol),
            None => "None".to_string(),
        };
        let mut errors = body.errors.clone();
        if let ShapeKind::Service(service) = &cx.service.kind {
            errors.extend(service.errors.iter().cloned());
        }
        let mut error_entries = Vec::new();
        for id in errors {
            let symbol = cx.symbol(&id)?;
            error_entries.push(format!("{}: {}", python_string(id.shape_name()), w.reference(&symbol)));
        }

        let config = config_symbol(&cx.settings.module);
        w.open_block(
            "async def $L(http_response: $T, config: $T) -> $L:",
            args![function.name(), &runtime::http_response(), &config, output_hint],
            |w| {
                w.write("body = await http_response.consume_body_async()", args![])?;
                w.open_block("if http_response.status >= 300:", args![], |w| {
                    w.write(
                        "raise _deserialize_error(http_response, body, {$L})",
                        args![error_entries.join(", ")],
                    )
                })?;
                match &output {
                    Some(symbol) => w.write("return $T().deserialize(body, $T)", args![&self.codec, symbol]),
                    None => w.write("return None", args![]),
                }
            },
        )
    }

    fn write_error_helper(&self, cx: &CodegenContext<'_>, w: &mut CodeWriter) -> Result<()> {
        let api_error = api_error_symbol(&cx.settings.module);
        let any = runtime::any();
        w.open_block(
            "def _deserialize_error(http_response: $T, body: bytes, errors: dict[str, type[$T[$T]]]) -> $T[$T]:",
            args![&runtime::http_response(), &api_error, &any, &api_error, &any],
            |w| {
                w.write("code = \"\"", args![])?;
                if self.routing == Routing::Rest {
                    w.open_block("if $S in http_response.fields:", args![ERROR_TYPE_HEADER], |w| {
                        w.write("code = http_response.fields[$S].as_string()", args![ERROR_TYPE_HEADER])
                    })?;
                }
                w.open_block("if not code and body:", args![], |w| {
                    w.write(
                        "code = str($T().deserialize(body, $T).as_value().get(\"__type\", \"\"))",
                        args![&self.codec, &runtime::document()],
                    )
                })?;
                w.write("code = code.split(\":\")[0].split(\"#\")[-1]", args![])?;
                w.open_block("if code in errors:", args![], |w| {
                    w.write("return $T().deserialize(body, errors[code])", args![&self.codec])
                })?;
                w.write(
                    "return $T(message=f\"Unknown error for {code}: {body!r}\")",
                    args![&unknown_api_error_symbol(&cx.settings.module)],
                )
            },
        )
    }
}

/// `{name}` and `{name+}` labels in a uri path, without braces or `+`
fn labels(path: &str) -> Vec<String> {
    path.split('{')
        .skip(1)
        .filter_map(|s| s.split_once('}').map(|(label, _)| label.trim_end_matches('+').to_string()))
        .collect()
}

/// the label as written in the path, including a greedy `+`
fn label_token(path: &str, label: &str) -> String {
    if path.contains(&format!("{{{}+}}", label)) {
        format!("{}+", label)
    } else {
        label.to_string()
    }
}

impl ProtocolGenerator for HttpProtocolGenerator {
    fn protocol(&self) -> ShapeId {
        self.protocol.clone()
    }

    fn dependencies(&self) -> Vec<PythonDependency> {
        self.codec.dependencies().to_vec()
    }

    fn generate_request_serializers(&self, cx: &CodegenContext<'_>, writer: &mut CodeWriter) -> Result<()> {
        for (operation, body) in cx.operations()? {
            self.write_serializer(cx, writer, operation, body)?;
            writer.newline();
            writer.newline();
        }
        Ok(())
    }

    fn generate_response_deserializers(
        &self,
        cx: &CodegenContext<'_>,
        writer: &mut CodeWriter,
    ) -> Result<()> {
        for (operation, body) in cx.operations()? {
            self.write_deserializer(cx, writer, operation, body)?;
            writer.newline();
            writer.newline();
        }
        self.write_error_helper(cx, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_labels() {
        assert_eq!(labels("/cities/{cityId}/forecast/{rest+}"), vec!["cityId", "rest"]);
        assert!(labels("/").is_empty());
        assert_eq!(label_token("/a/{rest+}", "rest"), "rest+");
        assert_eq!(label_token("/a/{id}", "id"), "id");
    }
}
