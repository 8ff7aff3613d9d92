//! Generation run
//!
//! `Generator::generate` takes a model and settings through these phases:
//! - check the generator version the model requires
//! - let integrations preprocess the model, then prune it to the service closure
//! - order shapes and find the recursive set
//! - build the symbol provider chain and the interceptor registry
//! - write the error preamble, recursive schema shells, then every shape in order
//! - for clients: protocol serializers, auth resolver, config and client
//! - let integrations customize, then flush writers and render package files
//!
//! Nothing is written to disk until every phase has succeeded.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, instrument};

use crate::{
    auth::{generate_auth, registered_schemes, AuthResolution},
    builtin::integrations_for,
    config::{ArtifactKind, CodegenConfig, PythonSettings},
    error::{Error, Result},
    format,
    generators::{
        client::generate_client, config::generate_config, errors::generate_service_errors,
        generate_shape, schema::generate_recursive_shells,
    },
    integration::{
        service_plugins, sort_integrations, Integration, ProtocolGenerator, RuntimeClientPlugin,
    },
    loader::{check_codegen_version, sources_to_model},
    model::{unit_shape, Member, Model, Operation, Shape, ShapeId, ShapeKind},
    protocol::{generate_protocol, resolve_protocol},
    render::{sorted_dependencies, PackageInfo, Renderer, PYPROJECT_TEMPLATE, README_TEMPLATE},
    symbols::{
        CachingSymbolProvider, PythonDependency, PythonSymbolProvider, Symbol, SymbolProvider,
    },
    topo::TopologicalIndex,
    writer::{FileManifest, InterceptorRegistry, WriterDelegator},
};

const PYTHON_REQUIRES: &str = ">=3.12";

/// Everything a generator needs to know about the run
pub struct CodegenContext<'a> {
    pub model: &'a Model,
    pub settings: &'a PythonSettings,
    pub symbols: &'a CachingSymbolProvider,
    pub index: &'a TopologicalIndex,
    pub service: &'a Shape,
    /// selected protocol, None in bare mode
    pub protocol: Option<Arc<dyn ProtocolGenerator>>,
    /// client plugins that apply to the service
    pub plugins: Vec<RuntimeClientPlugin>,
}

impl<'a> CodegenContext<'a> {
    pub fn symbol(&self, id: &ShapeId) -> Result<Symbol> {
        self.symbols.symbol(self.model, id)
    }

    pub fn member_name(&self, member: &Member) -> String {
        self.symbols.member_name(member)
    }

    pub fn shape(&self, id: &ShapeId) -> Result<&'a Shape> {
        self.model.expect_shape(id)
    }

    /// true if a type annotation for `target` must be a quoted forward reference:
    /// the target is recursive, or is a collection whose values are.
    pub fn is_deferred(&self, target: &ShapeId) -> bool {
        let mut seen = Vec::new();
        self.deferred(target, &mut seen)
    }

    fn deferred(&self, target: &ShapeId, seen: &mut Vec<ShapeId>) -> bool {
        if self.index.needs_deferred_reference(target) {
            return true;
        }
        if seen.contains(target) {
            return false;
        }
        seen.push(target.clone());
        match self.model.get(target).map(|s| &s.kind) {
            Some(ShapeKind::List(l)) | Some(ShapeKind::Set(l)) => {
                self.deferred(&l.member.target, seen)
            }
            Some(ShapeKind::Map(m)) => self.deferred(&m.value.target, seen),
            _ => false,
        }
    }

    /// Operations of the service, sorted by id
    pub fn operations(&self) -> Result<Vec<(&'a Shape, &'a Operation)>> {
        self.model.service_operations(&self.service.id)
    }

    /// Symbol of an operation input or output. None when absent or Unit.
    pub fn operation_io(&self, id: Option<&ShapeId>) -> Result<Option<Symbol>> {
        match id {
            Some(id) if id != unit_shape() => Ok(Some(self.symbol(id)?)),
            _ => Ok(None),
        }
    }
}

/// Output of a run written to disk
#[derive(Debug)]
pub struct GenerationResult {
    pub manifest: FileManifest,
    /// absolute paths of written files
    pub written: Vec<PathBuf>,
}

/// Runs generation with the builtin integrations named in settings plus any
/// supplied by the caller
#[derive(Default)]
pub struct Generator {
    integrations: Vec<Box<dyn Integration>>,
}

fn is_python_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Generator {
    pub fn new() -> Self {
        Generator::default()
    }

    /// Adds an integration that isn't one of the builtins
    pub fn with_integration(mut self, integration: Box<dyn Integration>) -> Self {
        self.integrations.push(integration);
        self
    }

    /// Generates the package in memory
    #[instrument(level = "debug", skip_all, fields(service = %settings.service))]
    pub fn generate(&self, model: Model, settings: &PythonSettings) -> Result<FileManifest> {
        if !is_python_identifier(&settings.module) {
            return Err(Error::Config(format!(
                "module '{}' is not a valid python package name",
                settings.module
            )));
        }
        check_codegen_version(&model)?;

        let builtins = integrations_for(settings)?;
        let mut integrations = builtins
            .iter()
            .chain(self.integrations.iter())
            .map(|i| i.as_ref())
            .collect::<Vec<&dyn Integration>>();
        sort_integrations(&mut integrations);

        let mut model = model;
        for integration in integrations.iter() {
            model = integration.preprocess_model(model, settings)?;
        }
        model.expect_service(&settings.service)?;
        let model = model.prune(&settings.service)?;
        let index = TopologicalIndex::new(&model, &settings.service)?;

        let mut provider: Box<dyn SymbolProvider> =
            Box::new(PythonSymbolProvider::new(&settings.module));
        for integration in integrations.iter() {
            provider = integration.decorate_symbol_provider(&model, settings, provider);
        }
        let symbols = CachingSymbolProvider::new(provider);

        let mut registry = InterceptorRegistry::default();
        for integration in integrations.iter() {
            for interceptor in integration.interceptors(settings) {
                registry.register(interceptor);
            }
        }
        debug!(interceptors = registry.len(), "registered interceptors");
        let mut writers = WriterDelegator::new(&settings.module, Arc::new(registry));

        let (service, _) = model.expect_service(&settings.service)?;
        let plugins = service_plugins(&integrations, &model, service);
        let protocol = match settings.artifact {
            ArtifactKind::Client => {
                let generators =
                    integrations.iter().flat_map(|i| i.protocol_generators()).collect::<Vec<_>>();
                resolve_protocol(&model, service, settings.protocol.as_ref(), &generators)?
            }
            ArtifactKind::Types => None,
        };

        let cx = CodegenContext {
            model: &model,
            settings,
            symbols: &symbols,
            index: &index,
            service,
            protocol,
            plugins,
        };

        generate_service_errors(&cx, &mut writers)?;
        generate_recursive_shells(&cx, &mut writers)?;
        for id in index.emission_order() {
            generate_shape(&cx, &mut writers, cx.shape(id)?)?;
        }

        if settings.artifact == ArtifactKind::Client {
            generate_protocol(&cx, &mut writers)?;

            let schemes = registered_schemes(&cx);
            let registered = schemes.keys().cloned().collect::<Vec<_>>();
            let operations =
                cx.operations()?.into_iter().map(|(shape, _)| shape).collect::<Vec<_>>();
            let resolution = AuthResolution::resolve(&model, service, &operations, &registered)?;
            generate_auth(&cx, &resolution, &schemes, &mut writers)?;

            let scheme_symbols = resolution
                .all_schemes()
                .into_iter()
                .filter_map(|id| {
                    let symbol = schemes.get(id)?.scheme_symbol()?;
                    Some((id.clone(), symbol))
                })
                .collect::<Vec<_>>();
            generate_config(&cx, &mut writers, &scheme_symbols)?;
            generate_client(&cx, &mut writers)?;
        }

        let mut manifest = FileManifest::default();
        for integration in integrations.iter() {
            integration.customize(&cx, &mut writers, &mut manifest)?;
        }

        let dependencies = writers.dependencies();
        writers.flush(&mut manifest);
        manifest.add_init_files();
        self.render_package_files(&cx, &dependencies, &mut manifest)?;
        info!(files = manifest.len(), "generated package");
        Ok(manifest)
    }

    fn render_package_files(
        &self,
        cx: &CodegenContext<'_>,
        dependencies: &BTreeSet<PythonDependency>,
        manifest: &mut FileManifest,
    ) -> Result<()> {
        let settings = cx.settings;
        let client = match settings.artifact {
            ArtifactKind::Client => Some(cx.symbol(&cx.service.id)?.name().to_string()),
            ArtifactKind::Types => None,
        };
        let description = settings
            .description
            .clone()
            .or_else(|| {
                let docs = cx.service.traits.documentation()?;
                docs.lines().next().map(|line| line.trim().to_string())
            })
            .unwrap_or_else(|| {
                format!("Generated types for the {} service", cx.service.id.shape_name())
            });
        let operations = match client {
            Some(_) => {
                cx.operations()?.iter().map(|(op, _)| op.id.shape_name().to_string()).collect()
            }
            None => Vec::new(),
        };
        let info = PackageInfo {
            name: settings.module.clone(),
            version: settings.version.clone(),
            description: description.replace('\\', "\\\\").replace('"', "\\\""),
            service: cx.service.id.to_string(),
            client,
            python_requires: PYTHON_REQUIRES.to_string(),
            dependencies: sorted_dependencies(dependencies),
            operations,
        };

        let renderer = Renderer::with_default_templates()?;
        let files = [("pyproject.toml", PYPROJECT_TEMPLATE), ("README.md", README_TEMPLATE)];
        for (path, template) in files {
            if manifest.has_file(Path::new(path)) {
                debug!(path, "keeping file added by an integration");
                continue;
            }
            manifest.write_file(path, renderer.render(template, &info)?);
        }
        Ok(())
    }

    /// Generates the package and writes it under `output_dir`.
    /// Formatting and type checking run afterwards unless `post_process` is false.
    pub fn gen(
        &self,
        model: Model,
        settings: &PythonSettings,
        output_dir: &Path,
        post_process: bool,
    ) -> Result<GenerationResult> {
        let manifest = self.generate(model, settings)?;
        let written = manifest.write_to_dir(output_dir)?;
        info!(files = written.len(), output_dir = %output_dir.display(), "wrote generated files");
        if post_process {
            format::post_process(settings, &output_dir.join(&settings.module))?;
        }
        Ok(GenerationResult { manifest, written })
    }

    /// Loads the models named in a codegen.toml and generates.
    /// `output_dir` overrides the configured one; relative configured paths
    /// are relative to the config's base_dir.
    pub fn gen_from_config(
        &self,
        config: &CodegenConfig,
        output_dir: Option<&Path>,
        post_process: bool,
    ) -> Result<GenerationResult> {
        let model = sources_to_model(&config.models, &config.base_dir)?;
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None if config.python.output_dir.is_absolute() => config.python.output_dir.clone(),
            None => config.base_dir.join(&config.python.output_dir),
        };
        self.gen(model, &config.python, &output_dir, post_process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_json_str;

    const MODEL: &str = r##"{ "smithy": "2.0", "shapes": {
        "ex#Svc": { "type": "service", "operations": [ { "target": "ex#Op" } ] },
        "ex#Op": { "type": "operation", "input": { "target": "ex#Node" } },
        "ex#Node": { "type": "structure", "members": {
            "children": { "target": "ex#NodeList" },
            "labels": { "target": "ex#Labels" }
        } },
        "ex#NodeList": { "type": "list", "member": { "target": "ex#Node" } },
        "ex#Labels": { "type": "list", "member": { "target": "smithy.api#String" } },
        "ex#Wrapper": { "type": "map", "key": { "target": "smithy.api#String" }, "value": { "target": "ex#NodeList" } }
    } }"##;

    fn id(s: &str) -> ShapeId {
        format!("ex#{}", s).parse().unwrap()
    }

    #[test]
    fn deferred_references_look_through_collections() {
        let model = load_json_str(MODEL).unwrap();
        let settings = PythonSettings::new(id("Svc"), "svc", PathBuf::from("out"));
        let index = TopologicalIndex::new(&model, &id("Svc")).unwrap();
        let symbols = CachingSymbolProvider::new(Box::new(PythonSymbolProvider::new("svc")));
        let (service, _) = model.expect_service(&id("Svc")).unwrap();
        let cx = CodegenContext {
            model: &model,
            settings: &settings,
            symbols: &symbols,
            index: &index,
            service,
            protocol: None,
            plugins: Vec::new(),
        };
        assert!(cx.is_deferred(&id("Node")));
        assert!(cx.is_deferred(&id("NodeList")));
        assert!(cx.is_deferred(&id("Wrapper")));
        assert!(!cx.is_deferred(&id("Labels")));
        assert!(cx.operation_io(Some(unit_shape())).unwrap().is_none());
        assert_eq!(cx.operation_io(Some(&id("Node"))).unwrap().unwrap().name(), "Node");
    }

    #[test]
    fn invalid_module_name_is_config_error() {
        let model = load_json_str(MODEL).unwrap();
        let settings = PythonSettings::new(id("Svc"), "my-package", PathBuf::from("out"));
        let result = Generator::new().generate(model, &settings);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn missing_service_is_an_error() {
        let model = load_json_str(MODEL).unwrap();
        let settings = PythonSettings::new(id("Nope"), "svc", PathBuf::from("out"));
        assert!(Generator::new().generate(model, &settings).is_err());
    }
}
