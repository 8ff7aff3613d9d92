//! Integrations: plugins that customize a generation run.
//!
//! Each hook has a default that does nothing, so an integration only
//! implements what it contributes. Integrations are supplied by the caller as
//! an explicit list; `sort_integrations` orders them by priority.

use std::sync::Arc;

use crate::{
    config::PythonSettings,
    error::Result,
    gen::CodegenContext,
    model::{Model, Shape, ShapeId},
    symbols::{Symbol, SymbolProvider},
    writer::{CodeWriter, FileManifest, Interceptor, WriterDelegator},
};

pub trait Integration: Send + Sync {
    /// name used to enable the integration in codegen.toml
    fn name(&self) -> &str;

    /// Integrations with higher priority are applied first
    fn priority(&self) -> i8 {
        0
    }

    /// Runs before the model is pruned and ordered
    fn preprocess_model(&self, model: Model, _settings: &PythonSettings) -> Result<Model> {
        Ok(model)
    }

    /// Wraps the symbol provider
    fn decorate_symbol_provider(
        &self,
        _model: &Model,
        _settings: &PythonSettings,
        provider: Box<dyn SymbolProvider>,
    ) -> Box<dyn SymbolProvider> {
        provider
    }

    fn protocol_generators(&self) -> Vec<Arc<dyn ProtocolGenerator>> {
        Vec::new()
    }

    fn client_plugins(&self) -> Vec<RuntimeClientPlugin> {
        Vec::new()
    }

    fn interceptors(&self, _settings: &PythonSettings) -> Vec<Interceptor> {
        Vec::new()
    }

    /// Runs after every shape has been generated, before anything is flushed.
    /// Writers may still be changed; extra files can be added to the manifest.
    fn customize(
        &self,
        _cx: &CodegenContext<'_>,
        _writers: &mut WriterDelegator,
        _manifest: &mut FileManifest,
    ) -> Result<()> {
        Ok(())
    }
}

/// Stable sort, highest priority first
pub fn sort_integrations(integrations: &mut [&dyn Integration]) {
    integrations.sort_by(|a, b| b.priority().cmp(&a.priority()));
}

/// Generates request serializers and response deserializers for one protocol
pub trait ProtocolGenerator: Send + Sync {
    /// id of the protocol trait, e.g. `aws.protocols#restJson1`
    fn protocol(&self) -> ShapeId;

    /// runtime dependencies of the generated protocol code
    fn dependencies(&self) -> Vec<crate::symbols::PythonDependency> {
        Vec::new()
    }

    /// Writes `_serialize_{operation}` for every operation into `writer`
    fn generate_request_serializers(&self, cx: &CodegenContext<'_>, writer: &mut CodeWriter) -> Result<()>;

    /// Writes `_deserialize_{operation}` for every operation into `writer`
    fn generate_response_deserializers(
        &self,
        cx: &CodegenContext<'_>,
        writer: &mut CodeWriter,
    ) -> Result<()>;
}

/// Signing capability for one auth trait
pub trait AuthScheme: Send + Sync {
    /// id of the auth trait, e.g. `smithy.api#httpBearerAuth`
    fn auth_trait(&self) -> ShapeId;

    /// name of the python factory function written by `write_option_factory`
    fn factory_name(&self) -> String;

    /// Writes a function `(auth_params: AuthParams) -> AuthOption | None`.
    /// It returns None when the scheme can't be used with the given parameters.
    fn write_option_factory(
        &self,
        cx: &CodegenContext<'_>,
        service: &Shape,
        writer: &mut CodeWriter,
    ) -> Result<()>;

    /// Runtime class implementing the scheme, registered in the client config
    fn scheme_symbol(&self) -> Option<Symbol> {
        None
    }
}

/// A property added to the generated client `Config`
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigProperty {
    pub name: String,
    pub type_symbol: Symbol,
    pub documentation: String,
    /// python expression used when the caller passes nothing; None leaves it None
    pub default: Option<String>,
}

impl ConfigProperty {
    pub fn new(name: &str, type_symbol: Symbol, documentation: &str) -> Self {
        ConfigProperty {
            name: name.to_string(),
            type_symbol,
            documentation: documentation.to_string(),
            default: None,
        }
    }

    pub fn with_default(mut self, expr: &str) -> Self {
        self.default = Some(expr.to_string());
        self
    }
}

pub type ServicePredicate = Arc<dyn Fn(&Model, &Shape) -> bool + Send + Sync>;

/// Runtime wiring contributed by an integration: an optional auth scheme
/// and client config properties, applied to services the predicate accepts
#[derive(Clone)]
pub struct RuntimeClientPlugin {
    auth_scheme: Option<Arc<dyn AuthScheme>>,
    config_properties: Vec<ConfigProperty>,
    applies_to: ServicePredicate,
}

impl RuntimeClientPlugin {
    pub fn new() -> Self {
        RuntimeClientPlugin {
            auth_scheme: None,
            config_properties: Vec::new(),
            applies_to: Arc::new(|_, _| true),
        }
    }

    pub fn with_auth_scheme(mut self, scheme: Arc<dyn AuthScheme>) -> Self {
        self.auth_scheme = Some(scheme);
        self
    }

    pub fn with_config_property(mut self, property: ConfigProperty) -> Self {
        self.config_properties.push(property);
        self
    }

    pub fn applies_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Model, &Shape) -> bool + Send + Sync + 'static,
    {
        self.applies_to = Arc::new(predicate);
        self
    }

    pub fn auth_scheme(&self) -> Option<&Arc<dyn AuthScheme>> {
        self.auth_scheme.as_ref()
    }

    pub fn config_properties(&self) -> &[ConfigProperty] {
        &self.config_properties
    }

    pub fn applies_to_service(&self, model: &Model, service: &Shape) -> bool {
        (self.applies_to)(model, service)
    }
}

impl Default for RuntimeClientPlugin {
    fn default() -> Self {
        RuntimeClientPlugin::new()
    }
}

/// Client plugins from all integrations that apply to the service, in integration order
pub fn service_plugins(
    integrations: &[&dyn Integration],
    model: &Model,
    service: &Shape,
) -> Vec<RuntimeClientPlugin> {
    integrations
        .iter()
        .flat_map(|i| i.client_plugins())
        .filter(|p| p.applies_to_service(model, service))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Service, ShapeKind};

    struct Named(&'static str, i8);

    impl Integration for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn priority(&self) -> i8 {
            self.1
        }

        fn client_plugins(&self) -> Vec<RuntimeClientPlugin> {
            let name = self.0;
            vec![RuntimeClientPlugin::new()
                .with_config_property(ConfigProperty::new(name, Symbol::builtin("str"), "doc"))
                .applies_when(move |_, service| service.id.shape_name() != name)]
        }
    }

    #[test]
    fn priority_sort_is_stable() {
        let (a, b, c, d) = (Named("a", 0), Named("b", 10), Named("c", 0), Named("d", -1));
        let mut list: Vec<&dyn Integration> = vec![&a, &b, &c, &d];
        sort_integrations(&mut list);
        let names = list.iter().map(|i| i.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn plugins_filtered_by_service() {
        let (a, svc) = (Named("a", 0), Named("Svc", 0));
        let list: Vec<&dyn Integration> = vec![&a, &svc];
        let model = Model::new();
        let service = Shape::new("ex#Svc".parse().unwrap(), ShapeKind::Service(Service::default()));
        let plugins = service_plugins(&list, &model, &service);
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].config_properties()[0].name, "a");
    }
}
