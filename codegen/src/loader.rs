use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::debug;

use crate::{
    config::ModelSource,
    error::{Error, Result},
    model::{
        enum_trait, enum_value_trait, EnumValue, ListOrSet, MapShape, Member, Model, Operation,
        ScalarKind, Service, Shape, ShapeId, ShapeKind, StructureOrUnion, Traits,
    },
    JsonMap, JsonValue,
};

/// metadata key holding per-language generator requirements
pub const CODEGEN_METADATA_KEY: &str = "codegen";
const PYTHON_LANGUAGE: &str = "python";

/// Load all model sources and merge into single model.
/// - Sources may be a combination of files and directories.
/// - Model files must be smithy json-ast (.json)
///
/// All relative paths are made relative to `base_dir`
/// (relative paths in codegen.toml are relative to the file codegen.toml, not
/// necessarily the current directory of the OS process)
pub fn sources_to_model(sources: &[ModelSource], base_dir: &Path) -> Result<Model> {
    let paths = sources_to_paths(sources, base_dir)?;
    let mut assembler = ModelAssembler::default();
    for path in paths.iter() {
        if !path.exists() {
            return Err(Error::MissingFile(format!(
                "'{}' is not a valid path to a file or directory",
                path.display(),
            )));
        }
        for file in json_files(path)? {
            debug!(path = %file.display(), "loading model file");
            let text = std::fs::read_to_string(&file)
                .map_err(|e| Error::Io(format!("reading {}: {}", file.display(), e)))?;
            assembler
                .push_str(&text)
                .map_err(|e| Error::Model(format!("{}: {}", file.display(), e)))?;
        }
    }
    assembler.finish()
}

/// Parses a single json-ast document into a model
pub fn load_json_str(text: &str) -> Result<Model> {
    let mut assembler = ModelAssembler::default();
    assembler.push_str(text)?;
    assembler.finish()
}

/// Flatten source lists and collect list of paths to local files or directories.
/// All returned paths that were relative have been joined to base_dir.
pub(crate) fn sources_to_paths(sources: &[ModelSource], base_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    for source in sources.iter() {
        let ModelSource::Path { path, files } = source;
        let prefix = if path.is_absolute() { path.to_path_buf() } else { base_dir.join(path) };
        if files.is_empty() {
            debug!(path = %prefix.display(), "adding model path");
            results.push(prefix)
        } else {
            for file in files.iter() {
                let path = prefix.join(file);
                debug!(path = %path.display(), "adding model path");
                results.push(path);
            }
        }
    }
    Ok(results)
}

/// Returns the path if it's a file, or all `.json` files under a directory, sorted
fn json_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut found = Vec::new();
    let mut dirs = vec![path.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let p = entry.path();
            if p.is_dir() {
                dirs.push(p);
            } else if p.extension().map(|ext| ext == "json").unwrap_or(false) {
                found.push(p);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Checks `metadata.codegen` entries for python. An entry with `min_version`
/// greater than this crate's version means the model needs a newer generator.
pub fn check_codegen_version(model: &Model) -> Result<()> {
    #[derive(Deserialize)]
    struct Requirement {
        language: String,
        #[serde(default)]
        min_version: Option<String>,
    }

    let entries = match model.metadata_value(CODEGEN_METADATA_KEY) {
        Some(JsonValue::Array(entries)) => entries,
        Some(_) => {
            return Err(Error::Model(format!(
                "metadata '{}' must be an array",
                CODEGEN_METADATA_KEY
            )))
        }
        None => return Ok(()),
    };
    let current = semver::Version::parse(env!("CARGO_PKG_VERSION"))?;
    for entry in entries {
        let req: Requirement = serde_json::from_value(entry.clone())?;
        if !req.language.eq_ignore_ascii_case(PYTHON_LANGUAGE) {
            continue;
        }
        if let Some(min) = req.min_version {
            let min = semver::Version::parse(&min)?;
            if min > current {
                return Err(Error::Model(format!(
                    "model requires code generator version {} or later; this is {}",
                    min, current
                )));
            }
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct AstDocument {
    #[serde(default)]
    metadata: JsonMap,
    #[serde(default)]
    shapes: BTreeMap<String, AstShape>,
}

#[derive(Deserialize)]
struct AstTarget {
    target: String,
}

#[derive(Deserialize)]
struct AstMember {
    target: String,
    #[serde(default)]
    traits: JsonMap,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AstShape {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    traits: JsonMap,
    #[serde(default)]
    members: Option<serde_json::Map<String, JsonValue>>,
    #[serde(default)]
    member: Option<AstMember>,
    #[serde(default)]
    key: Option<AstMember>,
    #[serde(default)]
    value: Option<AstMember>,
    #[serde(default)]
    input: Option<AstTarget>,
    #[serde(default)]
    output: Option<AstTarget>,
    #[serde(default)]
    errors: Vec<AstTarget>,
    #[serde(default)]
    operations: Vec<AstTarget>,
    #[serde(default)]
    collection_operations: Vec<AstTarget>,
    #[serde(default)]
    resources: Vec<AstTarget>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    create: Option<AstTarget>,
    #[serde(default)]
    put: Option<AstTarget>,
    #[serde(default)]
    read: Option<AstTarget>,
    #[serde(default)]
    update: Option<AstTarget>,
    #[serde(default)]
    delete: Option<AstTarget>,
    #[serde(default)]
    list: Option<AstTarget>,
}

/// operations and nested resources bound to a resource
#[derive(Default)]
struct ResourceBindings {
    operations: Vec<ShapeId>,
    resources: Vec<ShapeId>,
}

/// Merges json-ast documents, then flattens resources into their services
#[derive(Default)]
struct ModelAssembler {
    model: Model,
    resources: HashMap<ShapeId, ResourceBindings>,
    service_resources: HashMap<ShapeId, Vec<ShapeId>>,
}

impl ModelAssembler {
    fn push_str(&mut self, text: &str) -> Result<()> {
        let doc: AstDocument = serde_json::from_str(text)?;
        for (key, value) in doc.metadata {
            self.merge_metadata(key, value)?;
        }
        for (id, ast) in doc.shapes {
            let id: ShapeId = id.parse()?;
            self.push_shape(id, ast)?;
        }
        Ok(())
    }

    fn merge_metadata(&mut self, key: String, value: JsonValue) -> Result<()> {
        let merged = match (self.model.metadata_value(&key), value) {
            (None, value) => value,
            (Some(JsonValue::Array(existing)), JsonValue::Array(more)) => {
                let mut all = existing.clone();
                all.extend(more);
                JsonValue::Array(all)
            }
            (Some(existing), value) if existing == &value => value,
            (Some(_), _) => {
                return Err(Error::InvalidModel(format!("conflicting metadata for key '{}'", key)))
            }
        };
        self.model.set_metadata(&key, merged);
        Ok(())
    }

    fn push_shape(&mut self, id: ShapeId, ast: AstShape) -> Result<()> {
        let traits = parse_traits(&ast.traits)?;
        let kind = match ast.kind.as_str() {
            "structure" | "union" => {
                let agg = StructureOrUnion { members: parse_members(&id, ast.members.as_ref())? };
                if ast.kind == "union" {
                    ShapeKind::Union(agg)
                } else {
                    ShapeKind::Structure(agg)
                }
            }
            "list" | "set" => {
                let member = ast.member.as_ref().ok_or_else(|| missing(&id, "member"))?;
                let member = ListOrSet { member: parse_member(&id, "member", member)? };
                if ast.kind == "set" {
                    ShapeKind::Set(member)
                } else {
                    ShapeKind::List(member)
                }
            }
            "map" => {
                let key = ast.key.as_ref().ok_or_else(|| missing(&id, "key"))?;
                let value = ast.value.as_ref().ok_or_else(|| missing(&id, "value"))?;
                ShapeKind::Map(MapShape {
                    key: parse_member(&id, "key", key)?,
                    value: parse_member(&id, "value", value)?,
                })
            }
            "enum" => ShapeKind::Enum(parse_enum_members(&id, ast.members.as_ref())?),
            "string" if traits.has(enum_trait()) => ShapeKind::Enum(parse_enum_trait(&id, &traits)?),
            "operation" => ShapeKind::Operation(Operation {
                input: ast.input.as_ref().map(|t| t.target.parse()).transpose()?,
                output: ast.output.as_ref().map(|t| t.target.parse()).transpose()?,
                errors: targets(&ast.errors)?,
            }),
            "service" => {
                self.service_resources.insert(id.clone(), targets(&ast.resources)?);
                ShapeKind::Service(Service {
                    version: ast.version.clone(),
                    operations: targets(&ast.operations)?,
                    errors: targets(&ast.errors)?,
                })
            }
            "resource" => {
                let mut operations = targets(&ast.operations)?;
                operations.extend(targets(&ast.collection_operations)?);
                for lifecycle in [&ast.create, &ast.put, &ast.read, &ast.update, &ast.delete, &ast.list]
                    .into_iter()
                    .flatten()
                {
                    operations.push(lifecycle.target.parse()?);
                }
                self.resources.insert(
                    id,
                    ResourceBindings { operations, resources: targets(&ast.resources)? },
                );
                return Ok(());
            }
            other => match ScalarKind::from_type_name(other) {
                Some(scalar) => ShapeKind::Scalar(scalar),
                None => {
                    return Err(Error::InvalidModel(format!(
                        "shape {} has unsupported type '{}'",
                        id, other
                    )))
                }
            },
        };
        self.model.add_shape(Shape::new(id, kind).with_traits(traits))
    }

    /// attaches resource-bound operations to each service and returns the model
    fn finish(mut self) -> Result<Model> {
        let services = std::mem::take(&mut self.service_resources);
        for (service_id, roots) in services {
            let mut extra = Vec::new();
            let mut stack = roots;
            let mut seen = Vec::new();
            while let Some(resource_id) = stack.pop() {
                if seen.contains(&resource_id) {
                    continue;
                }
                let bindings = self.resources.get(&resource_id).ok_or_else(|| {
                    Error::InvalidModel(format!(
                        "service {} binds unknown resource {}",
                        service_id, resource_id
                    ))
                })?;
                extra.extend(bindings.operations.iter().cloned());
                stack.extend(bindings.resources.iter().cloned());
                seen.push(resource_id);
            }
            if extra.is_empty() {
                continue;
            }
            let mut shape = self.model.expect_shape(&service_id)?.clone();
            if let ShapeKind::Service(service) = &mut shape.kind {
                for op in extra {
                    if !service.operations.contains(&op) {
                        service.operations.push(op);
                    }
                }
            }
            self.model.replace_shape(shape)?;
        }
        Ok(self.model)
    }
}

fn missing(id: &ShapeId, field: &str) -> Error {
    Error::InvalidModel(format!("shape {} is missing '{}'", id, field))
}

fn targets(list: &[AstTarget]) -> Result<Vec<ShapeId>> {
    list.iter().map(|t| t.target.parse()).collect()
}

fn parse_traits(map: &JsonMap) -> Result<Traits> {
    let mut traits = Traits::new();
    for (name, value) in map.iter() {
        traits.insert(ShapeId::parse_relative(name)?, value.clone());
    }
    Ok(traits)
}

fn parse_member(container: &ShapeId, name: &str, ast: &AstMember) -> Result<Member> {
    Ok(Member {
        id: container.with_member(name),
        target: ast.target.parse()?,
        traits: parse_traits(&ast.traits)?,
    })
}

fn parse_members(container: &ShapeId, members: Option<&JsonMap>) -> Result<Vec<Member>> {
    let mut result = Vec::new();
    for (name, value) in members.into_iter().flatten() {
        let ast: AstMember = serde_json::from_value(value.clone())
            .map_err(|e| Error::InvalidModel(format!("member {}${}: {}", container, name, e)))?;
        result.push(parse_member(container, name, &ast)?);
    }
    Ok(result)
}

/// IDL 2.0 enum shape: members target Unit and carry @enumValue
fn parse_enum_members(id: &ShapeId, members: Option<&JsonMap>) -> Result<Vec<EnumValue>> {
    parse_members(id, members)?
        .into_iter()
        .map(|m| {
            let value = match m.traits.get(enum_value_trait()) {
                Some(JsonValue::String(s)) => s.clone(),
                Some(_) => {
                    return Err(Error::InvalidModel(format!(
                        "enum member {} must have a string value",
                        m.id
                    )))
                }
                None => m.name().to_string(),
            };
            Ok(EnumValue {
                name: m.name().to_string(),
                value,
                documentation: m.traits.documentation().map(|s| s.to_string()),
            })
        })
        .collect()
}

/// IDL 1.0 string shape with @enum trait
fn parse_enum_trait(id: &ShapeId, traits: &Traits) -> Result<Vec<EnumValue>> {
    #[derive(Deserialize)]
    struct EnumDefinition {
        value: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        documentation: Option<String>,
    }
    let defs: Vec<EnumDefinition> = traits
        .get_as(enum_trait())?
        .ok_or_else(|| Error::InvalidModel(format!("{} has no enum values", id)))?;
    Ok(defs
        .into_iter()
        .map(|d| EnumValue {
            name: d.name.unwrap_or_else(|| d.value.clone()),
            value: d.value,
            documentation: d.documentation,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEATHER: &str = r##"{
        "smithy": "2.0",
        "metadata": { "suppressions": [] },
        "shapes": {
            "example.weather#Weather": {
                "type": "service",
                "version": "2006-03-01",
                "resources": [ { "target": "example.weather#City" } ],
                "operations": [ { "target": "example.weather#GetCurrentTime" } ]
            },
            "example.weather#City": {
                "type": "resource",
                "read": { "target": "example.weather#GetCity" },
                "resources": [ { "target": "example.weather#Forecast" } ]
            },
            "example.weather#Forecast": {
                "type": "resource",
                "read": { "target": "example.weather#GetForecast" }
            },
            "example.weather#GetCurrentTime": { "type": "operation" },
            "example.weather#GetCity": { "type": "operation" },
            "example.weather#GetForecast": { "type": "operation" },
            "example.weather#Color": {
                "type": "enum",
                "members": {
                    "RED": { "target": "smithy.api#Unit", "traits": { "smithy.api#enumValue": "red" } },
                    "BLUE": { "target": "smithy.api#Unit" }
                }
            },
            "example.weather#Legacy": {
                "type": "string",
                "traits": { "smithy.api#enum": [ { "value": "a", "name": "A" }, { "value": "b" } ] }
            },
            "example.weather#Code": { "type": "intEnum", "members": {} }
        }
    }"##;

    #[test]
    fn resources_flatten_into_service() {
        let model = load_json_str(WEATHER).unwrap();
        let (_, service) = model.expect_service(&"example.weather#Weather".parse().unwrap()).unwrap();
        let mut names =
            service.operations.iter().map(|id| id.shape_name().to_string()).collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["GetCity", "GetCurrentTime", "GetForecast"]);
        // resources are not shapes of their own
        assert!(model.get(&"example.weather#City".parse().unwrap()).is_none());
    }

    #[test]
    fn enums_load_from_both_forms() {
        let model = load_json_str(WEATHER).unwrap();
        match &model.expect_shape(&"example.weather#Color".parse().unwrap()).unwrap().kind {
            ShapeKind::Enum(values) => {
                assert_eq!(values[0].name, "RED");
                assert_eq!(values[0].value, "red");
                assert_eq!(values[1].value, "BLUE");
            }
            other => panic!("unexpected kind {:?}", other),
        }
        match &model.expect_shape(&"example.weather#Legacy".parse().unwrap()).unwrap().kind {
            ShapeKind::Enum(values) => {
                assert_eq!(values[0].name, "A");
                assert_eq!(values[1].name, "b");
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(matches!(
            model.expect_shape(&"example.weather#Code".parse().unwrap()).unwrap().kind,
            ShapeKind::Scalar(ScalarKind::Integer)
        ));
    }

    #[test]
    fn members_keep_declared_order() {
        let text = r##"{ "smithy": "2.0", "shapes": {
            "ex#Order": { "type": "structure", "members": {
                "zeta": { "target": "smithy.api#String" },
                "alpha": { "target": "smithy.api#String", "traits": { "required": {} } }
            } } } }"##;
        let model = load_json_str(text).unwrap();
        let shape = model.expect_shape(&"ex#Order".parse().unwrap()).unwrap();
        let names = shape.kind.members().iter().map(|m| m.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(shape.member("alpha").unwrap().is_required());
    }

    #[test]
    fn duplicate_definitions_across_files_fail() {
        let text = r##"{ "smithy": "2.0", "shapes": { "ex#A": { "type": "string" } } }"##;
        let mut assembler = ModelAssembler::default();
        assembler.push_str(text).unwrap();
        assert!(matches!(assembler.push_str(text), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn codegen_min_version() {
        let text = r##"{ "smithy": "2.0", "metadata": { "codegen": [
            { "language": "python", "min_version": "99.0.0" } ] }, "shapes": {} }"##;
        let model = load_json_str(text).unwrap();
        assert!(matches!(check_codegen_version(&model), Err(Error::Model(_))));

        let text = r##"{ "smithy": "2.0", "metadata": { "codegen": [
            { "language": "python", "min_version": "0.1.0" },
            { "language": "rust", "min_version": "99.0.0" } ] }, "shapes": {} }"##;
        let model = load_json_str(text).unwrap();
        assert!(check_codegen_version(&model).is_ok());
    }

    #[test]
    fn missing_source_path() {
        let sources = vec![ModelSource::from_file("no-such-dir/model.json")];
        let err = sources_to_model(&sources, Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, Error::MissingFile(_)));
    }
}
