//! Smithy shape graph
//! - `ShapeId`, the identity used for every edge and cache key
//! - `Shape`/`ShapeKind`, a closed set of shape kinds the generators dispatch on
//! - `Model`, an arena of shapes indexed by id, with prelude fallback and
//!   reachability pruning from a service root
//!
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    str::FromStr,
};

use lazy_static::lazy_static;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    JsonMap, JsonValue,
};

pub const PRELUDE_NAMESPACE: &str = "smithy.api";

pub const TRAIT_DOCUMENTATION: &str = "documentation";
pub const TRAIT_ENUM: &str = "enum";
pub const TRAIT_ENUM_VALUE: &str = "enumValue";
pub const TRAIT_ERROR: &str = "error";
pub const TRAIT_AUTH: &str = "auth";
pub const TRAIT_AUTH_DEFINITION: &str = "authDefinition";
pub const TRAIT_PROTOCOL_DEFINITION: &str = "protocolDefinition";
pub const TRAIT_REQUIRED: &str = "required";
pub const TRAIT_DEFAULT: &str = "default";
pub const TRAIT_TRAIT: &str = "trait";
pub const TRAIT_UNIT_TYPE: &str = "unitType";

lazy_static! {
    static ref DOCUMENTATION_TRAIT_ID: ShapeId = prelude_id(TRAIT_DOCUMENTATION);
    static ref ENUM_TRAIT_ID: ShapeId = prelude_id(TRAIT_ENUM);
    static ref ENUM_VALUE_TRAIT_ID: ShapeId = prelude_id(TRAIT_ENUM_VALUE);
    static ref ERROR_TRAIT_ID: ShapeId = prelude_id(TRAIT_ERROR);
    static ref AUTH_TRAIT_ID: ShapeId = prelude_id(TRAIT_AUTH);
    static ref AUTH_DEFINITION_TRAIT_ID: ShapeId = prelude_id(TRAIT_AUTH_DEFINITION);
    static ref PROTOCOL_DEFINITION_TRAIT_ID: ShapeId = prelude_id(TRAIT_PROTOCOL_DEFINITION);
    static ref REQUIRED_TRAIT_ID: ShapeId = prelude_id(TRAIT_REQUIRED);
    static ref DEFAULT_TRAIT_ID: ShapeId = prelude_id(TRAIT_DEFAULT);
    static ref TRAIT_TRAIT_ID: ShapeId = prelude_id(TRAIT_TRAIT);
    static ref UNIT_ID: ShapeId = prelude_id("Unit");
    static ref PRELUDE: HashMap<ShapeId, Shape> = prelude_shapes();
}

fn prelude_id(name: &str) -> ShapeId {
    ShapeId::new_unchecked(PRELUDE_NAMESPACE, name, None)
}

/// shape id of trait @documentation
pub fn documentation_trait() -> &'static ShapeId {
    &DOCUMENTATION_TRAIT_ID
}

/// shape id of trait @enum (smithy 1.0 string enums)
pub fn enum_trait() -> &'static ShapeId {
    &ENUM_TRAIT_ID
}

/// shape id of trait @enumValue
pub fn enum_value_trait() -> &'static ShapeId {
    &ENUM_VALUE_TRAIT_ID
}

/// shape id of trait @error
pub fn error_trait() -> &'static ShapeId {
    &ERROR_TRAIT_ID
}

/// shape id of trait @auth
pub fn auth_trait() -> &'static ShapeId {
    &AUTH_TRAIT_ID
}

/// shape id of trait @authDefinition
pub fn auth_definition_trait() -> &'static ShapeId {
    &AUTH_DEFINITION_TRAIT_ID
}

/// shape id of trait @protocolDefinition
pub fn protocol_definition_trait() -> &'static ShapeId {
    &PROTOCOL_DEFINITION_TRAIT_ID
}

/// shape id of trait @required
pub fn required_trait() -> &'static ShapeId {
    &REQUIRED_TRAIT_ID
}

/// shape id of trait @default
pub fn default_trait() -> &'static ShapeId {
    &DEFAULT_TRAIT_ID
}

/// shape id of trait @trait
pub fn trait_trait() -> &'static ShapeId {
    &TRAIT_TRAIT_ID
}

pub fn unit_shape() -> &'static ShapeId {
    &UNIT_ID
}

/// Absolute shape identifier: `namespace#Name` or `namespace#Name$member`.
/// Ordering is namespace, then name, then member, so sorted output is stable.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShapeId {
    namespace: String,
    name: String,
    member: Option<String>,
}

impl ShapeId {
    pub fn new_unchecked(namespace: &str, name: &str, member: Option<&str>) -> Self {
        ShapeId {
            namespace: namespace.to_string(),
            name: name.to_string(),
            member: member.map(|m| m.to_string()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn shape_name(&self) -> &str {
        &self.name
    }

    pub fn member_name(&self) -> Option<&str> {
        self.member.as_deref()
    }

    pub fn is_member(&self) -> bool {
        self.member.is_some()
    }

    pub fn is_prelude(&self) -> bool {
        self.namespace == PRELUDE_NAMESPACE
    }

    /// Returns the id of a member of this shape
    pub fn with_member(&self, member: &str) -> ShapeId {
        ShapeId {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            member: Some(member.to_string()),
        }
    }

    /// Returns the id with any member part removed
    pub fn root(&self) -> ShapeId {
        ShapeId {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            member: None,
        }
    }

    /// Parses a possibly-relative id. Ids without a namespace
    /// are resolved against the prelude namespace, as trait names are.
    pub fn parse_relative(s: &str) -> Result<ShapeId> {
        if s.contains('#') {
            s.parse()
        } else {
            format!("{}#{}", PRELUDE_NAMESPACE, s).parse()
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

impl FromStr for ShapeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (namespace, rest) = s
            .split_once('#')
            .ok_or_else(|| Error::InvalidShapeId(s.to_string()))?;
        let (name, member) = match rest.split_once('$') {
            Some((name, member)) => (name, Some(member)),
            None => (rest, None),
        };
        if namespace.is_empty() || !namespace.split('.').all(is_identifier) {
            return Err(Error::InvalidShapeId(s.to_string()));
        }
        if !is_identifier(name) || !member.map(is_identifier).unwrap_or(true) {
            return Err(Error::InvalidShapeId(s.to_string()));
        }
        Ok(ShapeId::new_unchecked(namespace, name, member))
    }
}

impl TryFrom<String> for ShapeId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ShapeId> for String {
    fn from(id: ShapeId) -> String {
        id.to_string()
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "{}#{}${}", self.namespace, self.name, member),
            None => write!(f, "{}#{}", self.namespace, self.name),
        }
    }
}

impl fmt::Debug for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShapeId({})", self)
    }
}

/// Traits applied to a shape or member, in declaration order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Traits(Vec<(ShapeId, JsonValue)>);

impl Traits {
    pub fn new() -> Self {
        Traits::default()
    }

    /// Adds or replaces a trait, keeping its original position if replaced
    pub fn insert(&mut self, id: ShapeId, value: JsonValue) {
        match self.0.iter_mut().find(|(k, _)| k == &id) {
            Some(existing) => existing.1 = value,
            None => self.0.push((id, value)),
        }
    }

    pub fn get(&self, id: &ShapeId) -> Option<&JsonValue> {
        self.0.iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    pub fn has(&self, id: &ShapeId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ShapeId, JsonValue)> {
        self.0.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ShapeId> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn documentation(&self) -> Option<&str> {
        self.get(documentation_trait()).and_then(|v| v.as_str())
    }

    /// Returns trait as deserialized object, or None if the trait is not applied.
    /// Returns error if the deserialization failed.
    pub fn get_as<T: DeserializeOwned>(&self, id: &ShapeId) -> Result<Option<T>> {
        match self.get(id) {
            Some(val) => serde_json::from_value(val.clone())
                .map(Some)
                .map_err(|e| Error::Model(format!("invalid value for trait {}: {}", id, e))),
            None => Ok(None),
        }
    }
}

/// Smithy simple shapes, minus string enums which have their own kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    Blob,
    Boolean,
    String,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    BigInteger,
    BigDecimal,
    Timestamp,
    Document,
}

impl ScalarKind {
    /// Returns the scalar kind for a json-ast type name
    pub fn from_type_name(name: &str) -> Option<ScalarKind> {
        Some(match name {
            "blob" => ScalarKind::Blob,
            "boolean" => ScalarKind::Boolean,
            "string" => ScalarKind::String,
            "byte" => ScalarKind::Byte,
            "short" => ScalarKind::Short,
            "integer" | "intEnum" => ScalarKind::Integer,
            "long" => ScalarKind::Long,
            "float" => ScalarKind::Float,
            "double" => ScalarKind::Double,
            "bigInteger" => ScalarKind::BigInteger,
            "bigDecimal" => ScalarKind::BigDecimal,
            "timestamp" => ScalarKind::Timestamp,
            "document" => ScalarKind::Document,
            _ => return None,
        })
    }

    /// name used in runtime reader/writer methods, e.g. `write_big_decimal`
    pub fn method_suffix(&self) -> &'static str {
        match self {
            ScalarKind::Blob => "blob",
            ScalarKind::Boolean => "boolean",
            ScalarKind::String => "string",
            ScalarKind::Byte => "byte",
            ScalarKind::Short => "short",
            ScalarKind::Integer => "integer",
            ScalarKind::Long => "long",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
            ScalarKind::BigInteger => "big_integer",
            ScalarKind::BigDecimal => "big_decimal",
            ScalarKind::Timestamp => "timestamp",
            ScalarKind::Document => "document",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    pub id: ShapeId,
    pub target: ShapeId,
    pub traits: Traits,
}

impl Member {
    pub fn new(id: ShapeId, target: ShapeId) -> Self {
        Member { id, target, traits: Traits::default() }
    }

    /// declared name of the member
    pub fn name(&self) -> &str {
        self.id.member_name().unwrap_or_default()
    }

    pub fn is_required(&self) -> bool {
        self.traits.has(required_trait())
    }

    pub fn default_value(&self) -> Option<&JsonValue> {
        self.traits.get(default_trait())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructureOrUnion {
    pub members: Vec<Member>,
}

impl StructureOrUnion {
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOrSet {
    pub member: Member,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapShape {
    pub key: Member,
    pub value: Member,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumValue {
    /// declared member name, used as the constant name
    pub name: String,
    /// serialized value
    pub value: String,
    pub documentation: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Operation {
    pub input: Option<ShapeId>,
    pub output: Option<ShapeId>,
    pub errors: Vec<ShapeId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Service {
    pub version: Option<String>,
    pub operations: Vec<ShapeId>,
    pub errors: Vec<ShapeId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShapeKind {
    Structure(StructureOrUnion),
    Union(StructureOrUnion),
    List(ListOrSet),
    Set(ListOrSet),
    Map(MapShape),
    Enum(Vec<EnumValue>),
    Scalar(ScalarKind),
    Operation(Operation),
    Service(Service),
}

impl ShapeKind {
    /// Outgoing reference edges, in declaration order
    pub fn references(&self) -> Vec<&ShapeId> {
        match self {
            ShapeKind::Structure(s) | ShapeKind::Union(s) => {
                s.members().map(|m| &m.target).collect()
            }
            ShapeKind::List(l) | ShapeKind::Set(l) => vec![&l.member.target],
            ShapeKind::Map(m) => vec![&m.key.target, &m.value.target],
            ShapeKind::Operation(op) => op
                .input
                .iter()
                .chain(op.output.iter())
                .chain(op.errors.iter())
                .collect(),
            ShapeKind::Service(svc) => svc.operations.iter().chain(svc.errors.iter()).collect(),
            ShapeKind::Enum(_) | ShapeKind::Scalar(_) => Vec::new(),
        }
    }

    /// Members of aggregate kinds, in declaration order
    pub fn members(&self) -> Vec<&Member> {
        match self {
            ShapeKind::Structure(s) | ShapeKind::Union(s) => s.members().collect(),
            ShapeKind::List(l) | ShapeKind::Set(l) => vec![&l.member],
            ShapeKind::Map(m) => vec![&m.key, &m.value],
            _ => Vec::new(),
        }
    }

    /// json-ast style name of the kind, used in messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ShapeKind::Structure(_) => "structure",
            ShapeKind::Union(_) => "union",
            ShapeKind::List(_) => "list",
            ShapeKind::Set(_) => "set",
            ShapeKind::Map(_) => "map",
            ShapeKind::Enum(_) => "enum",
            ShapeKind::Scalar(_) => "scalar",
            ShapeKind::Operation(_) => "operation",
            ShapeKind::Service(_) => "service",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Shape {
    pub id: ShapeId,
    pub traits: Traits,
    pub kind: ShapeKind,
}

impl Shape {
    pub fn new(id: ShapeId, kind: ShapeKind) -> Self {
        Shape { id, traits: Traits::default(), kind }
    }

    pub fn with_traits(mut self, traits: Traits) -> Self {
        self.traits = traits;
        self
    }

    pub fn is_error(&self) -> bool {
        self.traits.has(error_trait())
    }

    /// trait definitions are not generated
    pub fn is_trait_definition(&self) -> bool {
        self.traits.has(trait_trait())
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.kind.members().into_iter().find(|m| m.name() == name)
    }
}

fn prelude_shapes() -> HashMap<ShapeId, Shape> {
    let scalars = [
        ("Blob", ScalarKind::Blob),
        ("Boolean", ScalarKind::Boolean),
        ("PrimitiveBoolean", ScalarKind::Boolean),
        ("String", ScalarKind::String),
        ("Byte", ScalarKind::Byte),
        ("PrimitiveByte", ScalarKind::Byte),
        ("Short", ScalarKind::Short),
        ("PrimitiveShort", ScalarKind::Short),
        ("Integer", ScalarKind::Integer),
        ("PrimitiveInteger", ScalarKind::Integer),
        ("Long", ScalarKind::Long),
        ("PrimitiveLong", ScalarKind::Long),
        ("Float", ScalarKind::Float),
        ("PrimitiveFloat", ScalarKind::Float),
        ("Double", ScalarKind::Double),
        ("PrimitiveDouble", ScalarKind::Double),
        ("BigInteger", ScalarKind::BigInteger),
        ("BigDecimal", ScalarKind::BigDecimal),
        ("Timestamp", ScalarKind::Timestamp),
        ("Document", ScalarKind::Document),
    ];
    let mut shapes = scalars
        .iter()
        .map(|(name, kind)| {
            let id = prelude_id(name);
            (id.clone(), Shape::new(id, ShapeKind::Scalar(*kind)))
        })
        .collect::<HashMap<_, _>>();
    let mut unit_traits = Traits::new();
    unit_traits.insert(prelude_id(TRAIT_UNIT_TYPE), JsonValue::Object(JsonMap::new()));
    shapes.insert(
        unit_shape().clone(),
        Shape::new(unit_shape().clone(), ShapeKind::Structure(StructureOrUnion::default()))
            .with_traits(unit_traits),
    );
    shapes
}

/// Shape graph: an arena of shapes plus an id index.
/// Prelude shapes resolve without being declared.
#[derive(Clone, Debug, Default)]
pub struct Model {
    shapes: Vec<Shape>,
    index: HashMap<ShapeId, usize>,
    metadata: JsonMap,
}

impl Model {
    pub fn new() -> Self {
        Model::default()
    }

    /// Adds a shape. Redefinition of an existing shape is an error.
    pub fn add_shape(&mut self, shape: Shape) -> Result<()> {
        if self.index.contains_key(&shape.id) {
            return Err(Error::InvalidModel(format!(
                "shape {} is defined more than once",
                shape.id
            )));
        }
        self.index.insert(shape.id.clone(), self.shapes.len());
        self.shapes.push(shape);
        Ok(())
    }

    /// Replaces the definition of a shape that is already in the model
    pub fn replace_shape(&mut self, shape: Shape) -> Result<()> {
        match self.index.get(&shape.id) {
            Some(ix) => {
                self.shapes[*ix] = shape;
                Ok(())
            }
            None => Err(Error::ShapeNotFound(shape.id.to_string())),
        }
    }

    pub fn set_metadata(&mut self, key: &str, value: JsonValue) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn metadata_value(&self, key: &str) -> Option<&JsonValue> {
        self.metadata.get(key)
    }

    pub fn metadata(&self) -> &JsonMap {
        &self.metadata
    }

    /// Declared shapes, in insertion order
    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Returns a declared or prelude shape. Member ids resolve to their container.
    pub fn get(&self, id: &ShapeId) -> Option<&Shape> {
        let root;
        let id = if id.is_member() {
            root = id.root();
            &root
        } else {
            id
        };
        match self.index.get(id) {
            Some(ix) => self.shapes.get(*ix),
            None => PRELUDE.get(id),
        }
    }

    pub fn contains(&self, id: &ShapeId) -> bool {
        self.get(id).is_some()
    }

    pub fn expect_shape(&self, id: &ShapeId) -> Result<&Shape> {
        self.get(id).ok_or_else(|| Error::ShapeNotFound(id.to_string()))
    }

    /// Returns the member for a member id
    pub fn get_member(&self, id: &ShapeId) -> Option<&Member> {
        let name = id.member_name()?;
        self.get(id)?.member(name)
    }

    pub fn expect_member(&self, id: &ShapeId) -> Result<&Member> {
        self.get_member(id).ok_or_else(|| Error::ShapeNotFound(id.to_string()))
    }

    /// Returns the service shape and its body, or an error if the id is not a service
    pub fn expect_service(&self, id: &ShapeId) -> Result<(&Shape, &Service)> {
        let shape = self.expect_shape(id)?;
        match &shape.kind {
            ShapeKind::Service(service) => Ok((shape, service)),
            other => Err(Error::Model(format!(
                "{} is a {}, not a service",
                id,
                other.type_name()
            ))),
        }
    }

    /// Finds the operation in the model or returns error
    pub fn expect_operation(
        &self,
        service_id: &ShapeId,
        operation_id: &ShapeId,
    ) -> Result<(&Shape, &Operation)> {
        match self.get(operation_id) {
            Some(Shape { kind: ShapeKind::Operation(op), .. }) => {
                let shape = self.expect_shape(operation_id)?;
                Ok((shape, op))
            }
            _ => Err(Error::OperationNotFound(
                service_id.to_string(),
                operation_id.to_string(),
            )),
        }
    }

    /// Operations bound to the service, sorted by id
    pub fn service_operations(&self, service_id: &ShapeId) -> Result<Vec<(&Shape, &Operation)>> {
        let (_, service) = self.expect_service(service_id)?;
        let mut ids = service.operations.iter().collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        ids.into_iter().map(|id| self.expect_operation(service_id, id)).collect()
    }

    /// Returns the set of declared shapes reachable from `root` through
    /// member targets, operation input/output/errors, and service operations.
    /// Prelude shapes are followed but not included.
    pub fn walk_shapes(&self, root: &ShapeId) -> Result<BTreeSet<ShapeId>> {
        let root_shape = self.expect_shape(root)?;
        let mut seen = BTreeSet::new();
        let mut stack = vec![root_shape];
        while let Some(shape) = stack.pop() {
            if !self.index.contains_key(&shape.id) || !seen.insert(shape.id.clone()) {
                continue;
            }
            for target in shape.kind.references() {
                let next = self.get(target).ok_or_else(|| {
                    Error::InvalidModel(format!(
                        "shape {} references {}, which is not defined",
                        shape.id, target
                    ))
                })?;
                stack.push(next);
            }
        }
        Ok(seen)
    }

    /// Returns a new model containing only shapes reachable from the root.
    /// Metadata is carried over unchanged.
    pub fn prune(&self, root: &ShapeId) -> Result<Model> {
        let keep = self.walk_shapes(root)?;
        let mut pruned = Model { metadata: self.metadata.clone(), ..Default::default() };
        for shape in self.shapes.iter().filter(|s| keep.contains(&s.id)) {
            pruned.add_shape(shape.clone())?;
        }
        Ok(pruned)
    }
}

/// true if the shape is a timestamp scalar
pub fn is_timestamp(shape: &Shape) -> bool {
    matches!(shape.kind, ShapeKind::Scalar(ScalarKind::Timestamp))
}
