use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::Error, model::ShapeId};

#[derive(Debug, Deserialize, Serialize)]
pub struct CodegenConfig {
    /// model inputs
    #[serde(default)]
    pub models: Vec<ModelSource>,

    /// Python package settings
    pub python: PythonSettings,

    /// The directory containing the codegen.toml file, and the base_dir
    /// used for evaluating all relative paths in the file.
    /// This is not set inside the toml file but is set by the file reader,
    /// It is always set to an absolute path
    #[serde(default)]
    pub base_dir: PathBuf,
}

/// Source directory or file for finding model files.
/// Directories are searched recursively for `.json` model files.
/// `files` array is optional if path directly references a model file,
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ModelSource {
    Path {
        path: PathBuf,
        #[serde(default)]
        files: Vec<String>,
    },
}

impl FromStr for ModelSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(ModelSource::Path { path: s.into(), files: Vec::default() })
    }
}

impl ModelSource {
    /// convenience function to create a ModelSource for a single file path
    pub fn from_file<P: Into<std::path::PathBuf>>(path: P) -> ModelSource {
        ModelSource::Path { path: path.into(), files: Vec::default() }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ModelSource::Path { path, files: _ } = self;
        write!(f, "path({})", path.display())
    }
}

/// What gets generated for the service
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// models, schemas, serializers, auth, config, and client
    #[default]
    Client,
    /// models and schemas only
    Types,
}

/// Settings for the generated python package
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PythonSettings {
    /// absolute id of the service to generate, e.g. `example.weather#Weather`
    pub service: ShapeId,

    /// python package name, e.g. `weather`
    pub module: String,

    /// package version written to pyproject.toml
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub artifact: ArtifactKind,

    /// Output directory. Required.
    /// Relative paths are relative to base_dir, unless overridden on the command line.
    pub output_dir: PathBuf,

    /// use this protocol, instead of the first one the service declares
    #[serde(default)]
    pub protocol: Option<ShapeId>,

    /// integrations to apply, by name, in addition to the always-on ones.
    #[serde(default)]
    pub integrations: Vec<String>,

    /// source-code formatter; first item in vec is the program, rest are args.
    /// The package directory is appended as the last argument.
    /// example: [ "ruff", "format" ]
    #[serde(default)]
    pub formatter: Vec<String>,

    /// type checker, run after the formatter. example: [ "pyright" ]
    #[serde(default)]
    pub type_checker: Vec<String>,
}

fn default_version() -> String {
    "0.0.1".to_string()
}

impl PythonSettings {
    pub fn new(service: ShapeId, module: &str, output_dir: PathBuf) -> Self {
        PythonSettings {
            service,
            module: module.to_string(),
            version: default_version(),
            description: None,
            artifact: ArtifactKind::default(),
            output_dir,
            protocol: None,
            integrations: Vec::new(),
            formatter: Vec::new(),
            type_checker: Vec::new(),
        }
    }
}

impl FromStr for CodegenConfig {
    type Err = Error;

    fn from_str(content: &str) -> std::result::Result<CodegenConfig, Self::Err> {
        let config = toml::from_str(content).map_err(|e| Error::Config(format!("codegen: {}", e)))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config() {
        let config: CodegenConfig = r#"
            [[models]]
            path = "models"
            files = [ "weather.json" ]

            [python]
            service = "example.weather#Weather"
            module = "weather"
            output-dir = "out"
            integrations = [ "rest-json", "http-auth" ]
            formatter = [ "ruff", "format" ]
        "#
        .parse()
        .unwrap();
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.python.service.shape_name(), "Weather");
        assert_eq!(config.python.artifact, ArtifactKind::Client);
        assert_eq!(config.python.version, "0.0.1");
        assert_eq!(config.python.integrations, vec!["rest-json", "http-auth"]);
        assert!(config.python.protocol.is_none());
    }

    #[test]
    fn types_artifact_and_protocol() {
        let config: CodegenConfig = r#"
            [python]
            service = "ex#Svc"
            module = "svc"
            output-dir = "out"
            artifact = "types"
            protocol = "aws.protocols#restJson1"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.python.artifact, ArtifactKind::Types);
        assert_eq!(config.python.protocol.unwrap().namespace(), "aws.protocols");
    }

    #[test]
    fn bad_service_id_is_config_error() {
        let result = r#"
            [python]
            service = "NotAnId"
            module = "svc"
            output-dir = "out"
        "#
        .parse::<CodegenConfig>();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
