//! Handlebars rendering for the non-python package files:
//! `pyproject.toml` and `README.md`.
//!
use std::str::FromStr;

pub use handlebars::RenderError;
use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderErrorReason};
use serde::Serialize;

use crate::{error::Error, model::ShapeId, strings, symbols::PythonDependency};

/// Pairing of template name and contents
///
pub type Template<'template> = (&'template str, &'template str);

pub const PYPROJECT_TEMPLATE: &str = "pyproject";
pub const README_TEMPLATE: &str = "readme";

/// Templates compiled into the binary
pub const DEFAULT_TEMPLATES: &[Template<'static>] = &[
    (PYPROJECT_TEMPLATE, include_str!("../templates/pyproject.toml.hbs")),
    (README_TEMPLATE, include_str!("../templates/README.md.hbs")),
];

#[derive(Default, Debug)]
pub struct RenderConfig<'render> {
    /// Templates to be loaded for renderer. List of template name, data
    pub templates: Vec<Template<'render>>,
    /// Whether parser is in strict mode:
    ///   If true, a variable used in template that is undefined would raise an error
    ///   if false, an undefined variable would evaluate to 'falsey'
    pub strict_mode: bool,
}

/// HBTemplate processor for package metadata files
pub struct Renderer<'gen> {
    /// Handlebars processor
    hb: Handlebars<'gen>,
}

impl<'gen> Renderer<'gen> {
    /// Initialize handlebars template processor.
    pub fn init(config: &RenderConfig) -> Result<Self, Error> {
        let mut hb = Handlebars::new();
        hb.set_strict_mode(config.strict_mode);
        // output is toml and markdown, not html
        hb.register_escape_fn(handlebars::no_escape);

        add_base_helpers(&mut hb);
        for t in &config.templates {
            hb.register_template_string(t.0, t.1)?;
        }

        Ok(Self { hb })
    }

    /// Renderer with the built-in templates, in strict mode
    pub fn with_default_templates() -> Result<Self, Error> {
        Self::init(&RenderConfig { templates: DEFAULT_TEMPLATES.to_vec(), strict_mode: true })
    }

    /// Render a named template
    pub fn render<T>(&self, template_name: &str, data: &T) -> Result<String, Error>
    where
        T: Serialize,
    {
        let rendered = self.hb.render(template_name, data)?;
        Ok(rendered)
    }
}

/// Data for the package templates
#[derive(Debug, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub service: String,
    pub client: Option<String>,
    pub python_requires: String,
    pub dependencies: Vec<DependencyInfo>,
    pub operations: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DependencyInfo {
    pub package: String,
    pub version: String,
}

/// Sorts dependencies case-insensitively by package name
pub fn sorted_dependencies<'a, I>(deps: I) -> Vec<DependencyInfo>
where
    I: IntoIterator<Item = &'a PythonDependency>,
{
    let mut deps = deps
        .into_iter()
        .map(|d| DependencyInfo { package: d.package.clone(), version: d.version.clone() })
        .collect::<Vec<_>>();
    deps.sort_by(|a, b| lexical_sort::natural_lexical_only_alnum_cmp(&a.package, &b.package));
    deps.dedup_by(|a, b| a.package == b.package);
    deps
}

fn arg_as_string<'a>(h: &'a Helper<'_>, n: usize, tag: &str) -> Result<&'a str, RenderError> {
    let param = h
        .param(n)
        .ok_or_else(|| RenderErrorReason::Other(format!("missing string param after {}", tag)))?;
    param.value().as_str().ok_or_else(|| {
        RenderErrorReason::Other(format!("{} expects string param, not {:?}", tag, param.value())).into()
    })
}

fn parse_id(h: &Helper<'_>, tag: &str) -> Result<ShapeId, RenderError> {
    let id = arg_as_string(h, 0, tag)?;
    ShapeId::from_str(id)
        .map_err(|e| RenderErrorReason::Other(format!("invalid shape id for {}: {}", tag, e)).into())
}

/// Add template helpers functions
fn add_base_helpers(hb: &mut Handlebars) {
    //
    // extract the namespace part of a ShapeId
    //
    hb.register_helper(
        "namespace_name",
        Box::new(
            |h: &Helper,
             _r: &Handlebars,
             _: &Context,
             _rc: &mut RenderContext,
             out: &mut dyn Output|
             -> HelperResult {
                let id = parse_id(h, "namespace_name")?;
                out.write(id.namespace())?;
                Ok(())
            },
        ),
    );

    //
    // extract the shape-name part of a ShapeId
    //
    hb.register_helper(
        "shape_name",
        Box::new(
            |h: &Helper,
             _r: &Handlebars,
             _: &Context,
             _rc: &mut RenderContext,
             out: &mut dyn Output|
             -> HelperResult {
                let id = parse_id(h, "shape_name")?;
                out.write(id.shape_name())?;
                Ok(())
            },
        ),
    );

    hb.register_helper(
        "to_pascal_case",
        Box::new(
            |h: &Helper,
             _r: &Handlebars,
             _: &Context,
             _rc: &mut RenderContext,
             out: &mut dyn Output|
             -> HelperResult {
                let id = arg_as_string(h, 0, "to_pascal_case")?;
                out.write(&strings::to_pascal_case(id))?;
                Ok(())
            },
        ),
    );

    hb.register_helper(
        "to_snake_case",
        Box::new(
            |h: &Helper,
             _r: &Handlebars,
             _: &Context,
             _rc: &mut RenderContext,
             out: &mut dyn Output|
             -> HelperResult {
                let id = arg_as_string(h, 0, "to_snake_case")?;
                out.write(&strings::to_snake_case(id))?;
                Ok(())
            },
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> PackageInfo {
        PackageInfo {
            name: "weather".to_string(),
            version: "0.1.0".to_string(),
            description: "Weather client".to_string(),
            service: "example.weather#Weather".to_string(),
            client: Some("WeatherClient".to_string()),
            python_requires: ">=3.12".to_string(),
            dependencies: sorted_dependencies(&[
                PythonDependency::new("smithy-json", "~=0.1.0"),
                PythonDependency::new("Smithy-Core", "~=0.1.0"),
                PythonDependency::new("smithy-json", "~=0.1.0"),
            ]),
            operations: vec!["GetCity".to_string(), "ListCities".to_string()],
        }
    }

    #[test]
    fn dependencies_sorted_and_deduplicated() {
        let deps = info().dependencies;
        let names = deps.iter().map(|d| d.package.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Smithy-Core", "smithy-json"]);
    }

    #[test]
    fn pyproject_lists_dependencies() {
        let renderer = Renderer::with_default_templates().unwrap();
        let text = renderer.render(PYPROJECT_TEMPLATE, &info()).unwrap();
        assert!(text.contains("name = \"weather\""));
        assert!(text.contains("requires-python = \">=3.12\""));
        assert!(text.contains("\"Smithy-Core~=0.1.0\""));
        assert!(text.find("Smithy-Core").unwrap() < text.find("smithy-json").unwrap());
    }

    #[test]
    fn readme_uses_helpers() {
        let renderer = Renderer::with_default_templates().unwrap();
        let text = renderer.render(README_TEMPLATE, &info()).unwrap();
        assert!(text.contains("# weather"));
        assert!(text.contains("`example.weather`"));
        assert!(text.contains("- `get_city`"));
        assert!(text.contains("WeatherClient"));
    }

    #[test]
    fn strict_mode_rejects_missing_fields() {
        let renderer =
            Renderer::init(&RenderConfig { templates: vec![("t", "{{missing}}")], strict_mode: true })
                .unwrap();
        assert!(renderer.render("t", &info()).is_err());
    }
}
