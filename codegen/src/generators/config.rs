//! `config.py`: the client `Config` dataclass and the `Plugin` alias

use crate::{
    args,
    auth::resolver_symbol,
    error::Result,
    gen::CodegenContext,
    generators::separate,
    integration::ConfigProperty,
    model::ShapeId,
    runtime,
    symbols::Symbol,
    writer::{python_string, CodeWriter, Section, WriterDelegator},
};

pub(crate) fn config_symbol(module: &str) -> Symbol {
    Symbol::new("Config", &format!("{}.config", module))
        .with_definition_file(&format!("{}/config.py", module))
}

pub(crate) fn plugin_symbol(module: &str) -> Symbol {
    Symbol::new("Plugin", &format!("{}.config", module))
        .with_definition_file(&format!("{}/config.py", module))
}

fn write_property(w: &mut CodeWriter, property: &ConfigProperty) -> Result<()> {
    match &property.default {
        Some(default) => {
            w.write("$L: $T = $L", args![&property.name, &property.type_symbol, default])?
        }
        None => w.write("$L: $T | None = None", args![&property.name, &property.type_symbol])?,
    }
    w.write_docs(&property.documentation);
    w.newline();
    Ok(())
}

/// Properties every client config has, before any contributed by plugins
fn base_properties(
    cx: &CodegenContext<'_>,
    w: &mut CodeWriter,
    schemes: &[(ShapeId, Symbol)],
) -> Result<Vec<ConfigProperty>> {
    let any = w.reference(&runtime::any());
    let field = w.reference(&runtime::field());
    let factory = |symbol: &Symbol, w: &mut CodeWriter| {
        format!("{}(default_factory={})", field, w.reference(symbol))
    };

    let scheme_entries = schemes
        .iter()
        .map(|(id, symbol)| format!("{}: {}()", python_string(&id.to_string()), w.reference(symbol)))
        .collect::<Vec<_>>();
    let http_client = factory(&runtime::aiohttp_client(), w);
    let retry_strategy = factory(&runtime::simple_retry_strategy(), w);
    let resolver = factory(&resolver_symbol(&cx.settings.module), w);

    Ok(vec![
        ConfigProperty::new(
            "http_client",
            runtime::http_client(),
            "The HTTP client used to make requests.",
        )
        .with_default(&http_client),
        ConfigProperty::new(
            "protocol",
            Symbol::builtin(&format!("{}[{}, {}]", w.reference(&runtime::client_protocol()), any, any)),
            "The protocol used to serialize requests and deserialize responses when \
             the client has no generated serializers.",
        ),
        ConfigProperty::new(
            "interceptors",
            Symbol::builtin(&format!(
                "list[{}[{}, {}, {}, {}]]",
                w.reference(&runtime::interceptor()),
                any,
                any,
                any,
                any
            )),
            "The interceptors used by the client.",
        )
        .with_default(&format!("{}(default_factory=list)", field)),
        ConfigProperty::new(
            "retry_strategy",
            runtime::retry_strategy(),
            "The retry strategy for issuing retry tokens and computing retry delays.",
        )
        .with_default(&retry_strategy),
        ConfigProperty::new("endpoint_uri", Symbol::builtin("str"), "The endpoint requests are sent to."),
        ConfigProperty::new(
            "auth_scheme_resolver",
            resolver_symbol(&cx.settings.module),
            "Selects the auth options for each operation.",
        )
        .with_default(&resolver),
        ConfigProperty::new(
            "auth_schemes",
            Symbol::builtin(&format!(
                "dict[str, {}[{}, {}, {}, {}]]",
                w.reference(&runtime::http_auth_scheme()),
                any,
                any,
                any,
                any
            )),
            "The auth schemes the client can use, keyed by scheme id.",
        )
        .with_default(&format!(
            "{}(default_factory=lambda: {{{}}})",
            field,
            scheme_entries.join(", ")
        )),
    ])
}

/// Writes `config.py`. `schemes` are the auth schemes in use with their runtime classes.
pub(crate) fn generate_config(
    cx: &CodegenContext<'_>,
    writers: &mut WriterDelegator,
    schemes: &[(ShapeId, Symbol)],
) -> Result<()> {
    let config = config_symbol(&cx.settings.module);
    let plugin_properties = cx
        .plugins
        .iter()
        .flat_map(|p| p.config_properties().iter().cloned())
        .collect::<Vec<_>>();

    writers.use_shape_writer(&config, |w| {
        let mut properties = base_properties(cx, w, schemes)?;
        for property in plugin_properties {
            if !properties.iter().any(|p| p.name == property.name) {
                properties.push(property);
            }
        }

        w.write("@$T(kw_only=True)", args![&runtime::dataclass()])?;
        w.open_block("class $L:", args![config.name()], |w| {
            w.write_docs(&format!("Configuration for the {} client.", cx.service.id.shape_name()));
            w.newline();
            w.with_state(Some(Section::ConfigProperties), |w| {
                for property in properties.iter() {
                    write_property(w, property)?;
                }
                Ok(())
            })
        })?;
        separate(w);

        let plugin = plugin_symbol(&cx.settings.module);
        w.write(
            "type $L = $T[[$L], None]",
            args![plugin.name(), &runtime::callable(), config.name()],
        )?;
        w.write_docs("A callable that allows customizing the config object on each request.");
        Ok(())
    })
}
