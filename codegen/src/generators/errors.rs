//! Top of `models.py`: the module logger, the service error hierarchy, and the
//! default timestamp constant.

use crate::{
    args,
    error::Result,
    gen::CodegenContext,
    generators::separate,
    model::is_timestamp,
    runtime,
    symbols::Symbol,
    writer::{Section, WriterDelegator},
};

fn models_symbol(module: &str, name: &str) -> Symbol {
    Symbol::new(name, &format!("{}.models", module))
        .with_definition_file(&format!("{}/models.py", module))
}

pub(crate) fn service_error_symbol(module: &str) -> Symbol {
    models_symbol(module, "ServiceError")
}

pub(crate) fn api_error_symbol(module: &str) -> Symbol {
    models_symbol(module, "ApiError")
}

pub(crate) fn unknown_api_error_symbol(module: &str) -> Symbol {
    models_symbol(module, "UnknownApiError")
}

pub(crate) fn default_timestamp_symbol(module: &str) -> Symbol {
    models_symbol(module, "_DEFAULT_TIMESTAMP")
}

/// Writes the preamble of `models.py`. Runs before any shape is generated.
pub(crate) fn generate_service_errors(
    cx: &CodegenContext<'_>,
    writers: &mut WriterDelegator,
) -> Result<()> {
    let module = &cx.settings.module;
    let service_error = service_error_symbol(module);
    let any_timestamp = cx.model.shapes().any(is_timestamp)
        || cx.model.shapes().flat_map(|s| s.kind.members()).any(|m| {
            m.target.is_prelude() && m.target.shape_name() == "Timestamp"
        });

    writers.use_shape_writer(&service_error, |w| {
        w.add_module_import("logging");
        w.write("logger = logging.getLogger(__name__)", args![])?;
        separate(w);

        if any_timestamp {
            w.write(
                "_DEFAULT_TIMESTAMP = $T(1970, 1, 1, tzinfo=$T)",
                args![&runtime::datetime(), &runtime::utc()],
            )?;
            separate(w);
        }

        w.with_state(Some(Section::ServiceErrors), |w| {
            w.open_block("class ServiceError($T):", args![&runtime::smithy_exception()], |w| {
                w.write_docs(&format!(
                    "Base error for all errors in the {} service.",
                    cx.service.id.shape_name()
                ));
                w.write("pass", args![])
            })?;
            separate(w);

            w.write("@$T(kw_only=True)", args![&runtime::dataclass()])?;
            w.open_block("class ApiError[T: str](ServiceError):", args![], |w| {
                w.write_docs("Base error for all api errors in the service.");
                w.newline();
                w.write("code: T", args![])?;
                w.write_docs("A string code that identifies the error.");
                w.newline();
                w.write("fault: $T[\"client\", \"server\"] | None = None", args![&runtime::literal()])?;
                w.write_docs("Whether the client or server is at fault.\n\nIf None, then there was not enough information to determine fault.");
                w.newline();
                w.write("message: str = $T(default=\"\")", args![&runtime::field()])?;
                w.newline();
                w.open_block("def __post_init__(self) -> None:", args![], |w| {
                    w.write("super().__init__(self.message)", args![])
                })
            })?;
            separate(w);

            w.write("@$T(kw_only=True)", args![&runtime::dataclass()])?;
            w.open_block(
                "class UnknownApiError(ApiError[$T[\"Unknown\"]]):",
                args![&runtime::literal()],
                |w| {
                    w.write_docs("Error representing any unknown api errors.");
                    w.newline();
                    w.write("code: $T[\"Unknown\"] = \"Unknown\"", args![&runtime::literal()])
                },
            )?;
            separate(w);
            Ok(())
        })
    })
}
