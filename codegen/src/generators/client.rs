//! `client.py`: the service client class with one async method per operation.
//!
//! With a protocol generator the client serializes, resolves auth, signs, sends
//! with retries and deserializes. Without one every operation goes through
//! `config.protocol`, which the caller must set.

use crate::{
    args,
    error::Result,
    gen::CodegenContext,
    generators::{
        config::{config_symbol, plugin_symbol},
        errors::{api_error_symbol, service_error_symbol},
    },
    model::{Operation, Shape},
    protocol::{deserializer_symbol, serializer_symbol},
    runtime,
    writer::{CodeWriter, Section, WriterDelegator},
};

pub(crate) fn generate_client(cx: &CodegenContext<'_>, writers: &mut WriterDelegator) -> Result<()> {
    let client = cx.symbol(&cx.service.id)?;
    let operations = cx.operations()?;
    let module = &cx.settings.module;
    let config = config_symbol(module);
    let plugin = plugin_symbol(module);

    writers.use_shape_writer(&client, |w| {
        w.with_state(Some(Section::ClientClass(cx.service.id.clone())), |w| {
            w.open_block("class $L:", args![client.name()], |w| {
                if let Some(docs) = cx.service.traits.documentation() {
                    w.write_docs(docs);
                    w.newline();
                }
                w.open_block(
                    "def __init__(self, config: $T | None = None, plugins: list[$T] | None = None):",
                    args![&config, &plugin],
                    |w| {
                        w.write("self._config = config or $T()", args![&config])?;
                        w.open_block("for plugin in plugins or []:", args![], |w| {
                            w.write("plugin(self._config)", args![])
                        })
                    },
                )?;
                for (operation, body) in operations.iter() {
                    w.newline();
                    write_operation(cx, w, operation, body)?;
                }
                w.newline();
                write_execute(cx, w)
            })
        })
    })
}

fn write_operation(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    operation: &Shape,
    body: &Operation,
) -> Result<()> {
    let module = &cx.settings.module;
    let method = cx.symbol(&operation.id)?;
    let input = cx.operation_io(body.input.as_ref())?;
    let output = cx.operation_io(body.output.as_ref())?;
    let output_hint = match &output {
        Some(symbol) => w.reference(symbol),
        None => "None".to_string(),
    };
    let input_param = match &input {
        Some(symbol) => format!("input: {}, ", w.reference(symbol)),
        None => String::new(),
    };
    let plugin = w.reference(&plugin_symbol(module));
    let (serialize, deserialize) = match &cx.protocol {
        Some(_) => (
            w.reference(&serializer_symbol(module, &operation.id)),
            w.reference(&deserializer_symbol(module, &operation.id)),
        ),
        None => ("None".to_string(), "None".to_string()),
    };

    w.with_state(Some(Section::Operation(operation.id.clone())), |w| {
        w.open_block(
            "async def $L(self, $Lplugins: list[$L] | None = None) -> $L:",
            args![method.name(), input_param, plugin, output_hint],
            |w| {
                if let Some(docs) = operation.traits.documentation() {
                    w.write_docs(docs);
                    w.newline();
                }
                w.write("config = $T(self._config)", args![&runtime::deepcopy()])?;
                w.open_block("for plugin in plugins or []:", args![], |w| {
                    w.write("plugin(config)", args![])
                })?;
                w.open_block("return await self._execute_operation(", args![], |w| {
                    let input = if input.is_some() { "input" } else { "None" };
                    w.write("input=$L,", args![input])?;
                    w.write("config=config,", args![])?;
                    w.write("operation_name=$S,", args![operation.id.shape_name()])?;
                    w.write("serialize=$L,", args![serialize])?;
                    w.write("deserialize=$L,", args![deserialize])
                })?;
                w.write(")", args![])
            },
        )
    })
}

/// `_execute_operation`, shared by every operation method
fn write_execute(cx: &CodegenContext<'_>, w: &mut CodeWriter) -> Result<()> {
    let module = &cx.settings.module;
    let callable = w.reference(&runtime::callable());
    let awaitable = w.reference(&runtime::awaitable());
    let config = w.reference(&config_symbol(module));
    let request = w.reference(&runtime::http_request());
    let response = w.reference(&runtime::http_response());
    let service_error = service_error_symbol(module);

    w.open_block("async def _execute_operation[Input, Output](", args![], |w| {
        w.write("self,", args![])?;
        w.write("input: Input,", args![])?;
        w.write("config: $L,", args![&config])?;
        w.write("operation_name: str,", args![])?;
        w.write(
            "serialize: $1L[[Input, $3L], $2L[$4L]] | None,",
            args![&callable, &awaitable, &config, &request],
        )?;
        w.write(
            "deserialize: $1L[[$4L, $3L], $2L[Output]] | None,",
            args![&callable, &awaitable, &config, &response],
        )
    })?;
    w.open_block(") -> Output:", args![], |w| {
        if cx.protocol.is_none() {
            w.open_block("if config.protocol is None:", args![], |w| {
                w.write(
                    "raise $T(f\"No protocol is configured for {operation_name}; set Config.protocol.\")",
                    args![&service_error],
                )
            })?;
            return w.write(
                "return await config.protocol.send(operation_name=operation_name, input=input, config=config)",
                args![],
            );
        }

        w.open_block("if serialize is None or deserialize is None:", args![], |w| {
            w.write(
                "raise $T(f\"{operation_name} has no serializer for this client's protocol.\")",
                args![&service_error],
            )
        })?;
        w.write("request = await serialize(input, config)", args![])?;
        w.newline();

        w.open_block("if config.endpoint_uri is None:", args![], |w| {
            w.write("raise $T(\"No endpoint_uri found on the operation config.\")", args![&service_error])
        })?;
        w.write("endpoint = $T(config.endpoint_uri)", args![&runtime::urlparse()])?;
        w.open_block("request.destination = $T(", args![&runtime::replace()], |w| {
            w.write("request.destination,", args![])?;
            w.write("scheme=endpoint.scheme,", args![])?;
            w.write("host=endpoint.hostname or \"\",", args![])?;
            w.write("port=endpoint.port,", args![])?;
            w.write("path=endpoint.path.rstrip(\"/\") + request.destination.path,", args![])
        })?;
        w.write(")", args![])?;
        w.newline();

        w.write("auth_options = config.auth_scheme_resolver.resolve_auth_scheme(", args![])?;
        w.write(
            "    auth_parameters=$T(operation=operation_name, config=config)",
            args![&runtime::auth_params()],
        )?;
        w.write(")", args![])?;
        w.open_block("for option in auth_options:", args![], |w| {
            w.open_block("if (scheme := config.auth_schemes.get(option.scheme_id)) is None:", args![], |w| {
                w.write("continue", args![])
            })?;
            w.write("identity_resolver = scheme.identity_resolver(config=config)", args![])?;
            w.write(
                "identity = await identity_resolver.get_identity(properties=option.identity_properties)",
                args![],
            )?;
            w.write(
                "request = await scheme.signer.sign(request=request, identity=identity, properties=option.signer_properties)",
                args![],
            )?;
            w.write("break", args![])
        })?;
        w.newline();

        w.write("retry_token = config.retry_strategy.acquire_initial_retry_token()", args![])?;
        w.open_block("while True:", args![], |w| {
            w.open_block("try:", args![], |w| {
                w.write("response = await config.http_client.send(request)", args![])?;
                w.write("return await deserialize(response, config)", args![])
            })?;
            w.open_block("except Exception as error:", args![], |w| {
                w.open_block(
                    "if isinstance(error, $T) and error.fault == \"client\":",
                    args![&api_error_symbol(module)],
                    |w| w.write("raise", args![]),
                )?;
                w.open_block("try:", args![], |w| {
                    w.write("retry_token = config.retry_strategy.refresh_retry_token_for_retry(", args![])?;
                    w.write("    token_to_renew=retry_token, error=error", args![])?;
                    w.write(")", args![])
                })?;
                w.open_block("except $T:", args![&runtime::retry_error()], |w| {
                    w.write("raise error from None", args![])
                })?;
                w.add_module_import("asyncio");
                w.write("await asyncio.sleep(retry_token.retry_delay)", args![])
            })
        })
    })
}
