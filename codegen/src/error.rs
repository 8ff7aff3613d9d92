use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("missing input file: {0}")]
    MissingFile(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("smithy error: {0}")]
    Model(String),

    #[error("invalid shape id '{0}'")]
    InvalidShapeId(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("shape {0} was not found in the model")]
    ShapeNotFound(String),

    #[error("service {0} contains unknown operation: {1}")]
    OperationNotFound(String, String),

    #[error("naming collision: {first} and {second} both resolve to {namespace}.{name}")]
    NamingCollision {
        first: String,
        second: String,
        namespace: String,
        name: String,
    },

    #[error("shape {0} is part of a reference cycle but was not classified as recursive")]
    UnclassifiedCycle(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("writer error: {0}")]
    Writer(String),

    #[error("handlebars error: {0}")]
    Handlebars(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("formatter error: {0}")]
    Formatter(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Model(format!("json: {}", e))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Error {
        Error::Config(e.to_string())
    }
}

impl From<semver::Error> for Error {
    fn from(e: semver::Error) -> Error {
        Error::Model(format!("version: {}", e))
    }
}

impl From<handlebars::TemplateError> for Error {
    fn from(e: handlebars::TemplateError) -> Error {
        Error::Handlebars(e.to_string())
    }
}

impl From<handlebars::RenderError> for Error {
    fn from(e: handlebars::RenderError) -> Error {
        Error::Handlebars(e.to_string())
    }
}
