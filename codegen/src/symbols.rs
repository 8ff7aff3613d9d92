//! Symbols: the python identity of each shape.
//!
//! `PythonSymbolProvider` derives default symbols. Integrations may wrap it
//! in decorators. `CachingSymbolProvider` sits on top of the chain, so every
//! lookup of the same id observes the same symbol, and declared symbols that
//! map to the same (namespace, name) are reported as a collision.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::{
    error::{Error, Result},
    model::{Member, Model, ScalarKind, ShapeId, ShapeKind},
    runtime,
    strings::{to_pascal_case, to_screaming_snake_case, to_snake_case},
};

/// schema constant for the shape
pub const SCHEMA: &str = "schema";
/// union deserializer class, or collection deserializer function
pub const DESERIALIZER: &str = "deserializer";
/// collection serializer function
pub const SERIALIZER: &str = "serializer";
/// union unknown-variant class
pub const UNKNOWN: &str = "unknown";

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// names imported into generated modules, which declared classes must not shadow
const RESERVED_CLASS_NAMES: &[&str] = &[
    "Any", "ApiError", "Callable", "Config", "Decimal", "Document", "Literal", "Schema", "Self",
    "Sequence", "SerializationError", "ServiceError", "ShapeDeserializer", "ShapeID",
    "ShapeSerializer", "ShapeType", "StrEnum", "Trait", "UnknownApiError",
];

/// A package the generated code depends on, for pyproject.toml
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PythonDependency {
    pub package: String,
    pub version: String,
}

impl PythonDependency {
    pub fn new(package: &str, version: &str) -> Self {
        PythonDependency { package: package.to_string(), version: version.to_string() }
    }
}

/// Python identity of a shape or helper.
/// A symbol with an empty namespace is a builtin and is never imported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    name: String,
    namespace: String,
    alias: Option<String>,
    definition_file: Option<String>,
    properties: BTreeMap<String, Symbol>,
    references: Vec<Symbol>,
    dependencies: Vec<PythonDependency>,
}

impl Symbol {
    pub fn new(name: &str, namespace: &str) -> Self {
        Symbol {
            name: name.to_string(),
            namespace: namespace.to_string(),
            alias: None,
            definition_file: None,
            properties: BTreeMap::new(),
            references: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn builtin(name: &str) -> Self {
        Symbol::new(name, "")
    }

    /// name the symbol is imported as, outside its own namespace
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn with_definition_file(mut self, path: &str) -> Self {
        self.definition_file = Some(path.to_string());
        self
    }

    pub fn with_property(mut self, key: &str, value: Symbol) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn with_reference(mut self, symbol: Symbol) -> Self {
        self.references.push(symbol);
        self
    }

    pub fn with_dependency(mut self, dependency: PythonDependency) -> Self {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// name used to refer to the symbol from another namespace
    pub fn imported_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// path of the file declaring the symbol, relative to the output dir.
    /// None for builtins and runtime symbols.
    pub fn definition_file(&self) -> Option<&str> {
        self.definition_file.as_deref()
    }

    pub fn property(&self, key: &str) -> Option<&Symbol> {
        self.properties.get(key)
    }

    pub fn expect_property(&self, key: &str) -> Result<&Symbol> {
        self.properties
            .get(key)
            .ok_or_else(|| Error::Other(format!("symbol {} has no '{}' property", self, key)))
    }

    pub fn properties(&self) -> &BTreeMap<String, Symbol> {
        &self.properties
    }

    pub fn references(&self) -> &[Symbol] {
        &self.references
    }

    pub fn dependencies(&self) -> &[PythonDependency] {
        &self.dependencies
    }

    pub fn is_builtin(&self) -> bool {
        self.namespace.is_empty()
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Maps shapes to symbols.
///
/// `symbols` is the complete, cached provider chain. Implementations that need
/// the symbol of another shape (a list's element, for example) must ask it,
/// not themselves, so decorators apply to the nested symbol as well.
pub trait SymbolProvider: Send + Sync {
    /// Returns the symbol of a shape, or of a union member
    fn to_symbol(
        &self,
        model: &Model,
        id: &ShapeId,
        symbols: &CachingSymbolProvider,
    ) -> Result<Symbol>;

    /// Returns the python attribute name for a member
    fn member_name(&self, member: &Member) -> String {
        escape_member_name(member.name())
    }
}

pub fn escape_member_name(name: &str) -> String {
    let mut snake = to_snake_case(name);
    if PYTHON_KEYWORDS.contains(&snake.as_str()) || snake == "self" {
        snake.push('_');
    }
    snake
}

pub fn escape_class_name(name: &str) -> String {
    let mut pascal = to_pascal_case(name);
    if PYTHON_KEYWORDS.contains(&pascal.as_str()) || RESERVED_CLASS_NAMES.contains(&pascal.as_str()) {
        pascal.push('_');
    }
    pascal
}

/// Default python symbols. Declared shapes go to `{module}.models`,
/// schemas to `{module}._private.schemas`, operations and the service to `{module}.client`.
pub struct PythonSymbolProvider {
    module: String,
}

impl PythonSymbolProvider {
    pub fn new(module: &str) -> Self {
        PythonSymbolProvider { module: module.to_string() }
    }

    fn declared(&self, name: &str, submodule: &str) -> Symbol {
        Symbol::new(name, &format!("{}.{}", self.module, submodule))
            .with_definition_file(&format!("{}/{}.py", self.module, submodule.replace('.', "/")))
    }

    fn model_class(&self, name: &str) -> Symbol {
        self.declared(name, "models")
    }

    fn schema_symbol(&self, id: &ShapeId) -> Symbol {
        let constant = to_screaming_snake_case(id.shape_name());
        if id.is_prelude() {
            runtime::prelude_schema(&constant)
        } else {
            self.declared(&constant, "_private.schemas")
                .with_alias(&format!("_SCHEMA_{}", constant))
                .with_dependency(runtime::dependency(runtime::SMITHY_CORE))
        }
    }

    fn collection_symbol(
        &self,
        model: &Model,
        id: &ShapeId,
        name: String,
        element: Symbol,
        value_target: &ShapeId,
    ) -> Result<Symbol> {
        let mut symbol = Symbol::builtin(&name)
            .with_reference(element)
            .with_property(SCHEMA, self.schema_symbol(id));
        if needs_conversion(model, value_target, &mut Vec::new())? {
            let snake = to_snake_case(id.shape_name());
            symbol = symbol
                .with_property(SERIALIZER, self.model_class(&format!("_serialize_{}", snake)))
                .with_property(DESERIALIZER, self.model_class(&format!("_deserialize_{}", snake)));
        }
        Ok(symbol)
    }
}

fn scalar_symbol(kind: ScalarKind) -> Symbol {
    match kind {
        ScalarKind::String => Symbol::builtin("str"),
        ScalarKind::Blob => Symbol::builtin("bytes"),
        ScalarKind::Boolean => Symbol::builtin("bool"),
        ScalarKind::Byte
        | ScalarKind::Short
        | ScalarKind::Integer
        | ScalarKind::Long
        | ScalarKind::BigInteger => Symbol::builtin("int"),
        ScalarKind::Float | ScalarKind::Double => Symbol::builtin("float"),
        ScalarKind::BigDecimal => runtime::decimal(),
        ScalarKind::Timestamp => runtime::datetime(),
        ScalarKind::Document => runtime::document(),
    }
}

/// true if values of the target need converting to and from plain python values,
/// looking through nested collections
pub fn needs_conversion(model: &Model, target: &ShapeId, seen: &mut Vec<ShapeId>) -> Result<bool> {
    if seen.contains(target) {
        return Err(Error::InvalidModel(format!(
            "collection {} contains itself without an intervening structure",
            target
        )));
    }
    let shape = model.expect_shape(target)?;
    Ok(match &shape.kind {
        ShapeKind::Structure(_) | ShapeKind::Union(_) | ShapeKind::Enum(_) => true,
        ShapeKind::List(l) | ShapeKind::Set(l) => {
            seen.push(target.clone());
            needs_conversion(model, &l.member.target, seen)?
        }
        ShapeKind::Map(m) => {
            seen.push(target.clone());
            needs_conversion(model, &m.value.target, seen)?
        }
        _ => false,
    })
}

impl SymbolProvider for PythonSymbolProvider {
    fn to_symbol(
        &self,
        model: &Model,
        id: &ShapeId,
        symbols: &CachingSymbolProvider,
    ) -> Result<Symbol> {
        let shape = model.expect_shape(id)?;
        if let Some(member_name) = id.member_name() {
            // only union members have symbols of their own
            return match &shape.kind {
                ShapeKind::Union(_) if shape.member(member_name).is_some() => {
                    let union_name = escape_class_name(shape.id.shape_name());
                    Ok(self.model_class(&format!("{}{}", union_name, to_pascal_case(member_name))))
                }
                _ => Err(Error::ShapeNotFound(id.to_string())),
            };
        }

        let symbol = match &shape.kind {
            ShapeKind::Structure(_) | ShapeKind::Enum(_) => self
                .model_class(&escape_class_name(id.shape_name()))
                .with_property(SCHEMA, self.schema_symbol(id)),
            ShapeKind::Union(_) => {
                let name = escape_class_name(id.shape_name());
                self.model_class(&name)
                    .with_property(SCHEMA, self.schema_symbol(id))
                    .with_property(DESERIALIZER, self.model_class(&format!("_{}Deserializer", name)))
                    .with_property(UNKNOWN, self.model_class(&format!("{}Unknown", name)))
            }
            ShapeKind::List(l) | ShapeKind::Set(l) => {
                let element = symbols.symbol(model, &l.member.target)?;
                let container = if matches!(shape.kind, ShapeKind::Set(_)) { "set" } else { "list" };
                let name = format!("{}[{}]", container, element.name());
                self.collection_symbol(model, id, name, element, &l.member.target)?
            }
            ShapeKind::Map(m) => {
                let value = symbols.symbol(model, &m.value.target)?;
                let name = format!("dict[str, {}]", value.name());
                self.collection_symbol(model, id, name, value, &m.value.target)?
            }
            ShapeKind::Scalar(kind) => {
                scalar_symbol(*kind).with_property(SCHEMA, self.schema_symbol(id))
            }
            ShapeKind::Operation(_) => self.declared(&to_snake_case(id.shape_name()), "client"),
            ShapeKind::Service(_) => {
                self.declared(&format!("{}Client", escape_class_name(id.shape_name())), "client")
            }
        };
        Ok(symbol)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Memoizing top of the provider chain
pub struct CachingSymbolProvider {
    provider: Box<dyn SymbolProvider>,
    cache: Mutex<FxHashMap<ShapeId, Symbol>>,
    declared: Mutex<FxHashMap<(String, String), ShapeId>>,
    resolving: Mutex<Vec<ShapeId>>,
}

impl CachingSymbolProvider {
    pub fn new(provider: Box<dyn SymbolProvider>) -> Self {
        CachingSymbolProvider {
            provider,
            cache: Mutex::new(FxHashMap::default()),
            declared: Mutex::new(FxHashMap::default()),
            resolving: Mutex::new(Vec::new()),
        }
    }

    /// Returns the symbol for a shape id. The first lookup computes and caches
    /// it; later lookups return an identical symbol.
    /// Members of structures and collections resolve to their target's symbol.
    pub fn symbol(&self, model: &Model, id: &ShapeId) -> Result<Symbol> {
        if let Some(symbol) = lock(&self.cache).get(id) {
            return Ok(symbol.clone());
        }
        if let Some(member) = model.get_member(id) {
            if !matches!(model.expect_shape(id)?.kind, ShapeKind::Union(_)) {
                let symbol = self.symbol(model, &member.target)?;
                return Ok(lock(&self.cache).entry(id.clone()).or_insert(symbol).clone());
            }
        }

        {
            let mut resolving = lock(&self.resolving);
            if resolving.contains(id) {
                return Err(Error::InvalidModel(format!(
                    "symbol for {} depends on itself",
                    id
                )));
            }
            resolving.push(id.clone());
        }
        let result = self.provider.to_symbol(model, id, self);
        lock(&self.resolving).retain(|r| r != id);
        let symbol = result?;

        self.check_collision(id, &symbol)?;
        trace!(%id, symbol = %symbol, "resolved symbol");
        Ok(lock(&self.cache).entry(id.clone()).or_insert(symbol).clone())
    }

    pub fn member_name(&self, member: &Member) -> String {
        self.provider.member_name(member)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers the symbol and every declared helper it carries.
    /// Builtin symbols (collections, scalars) still declare schema constants.
    fn check_collision(&self, id: &ShapeId, symbol: &Symbol) -> Result<()> {
        let mut declared = lock(&self.declared);
        let candidates = std::iter::once(symbol).chain(symbol.properties().values());
        for candidate in candidates.filter(|s| s.definition_file().is_some()) {
            let key = (candidate.namespace().to_string(), candidate.name().to_string());
            match declared.get(&key) {
                Some(first) if first != id => {
                    return Err(Error::NamingCollision {
                        first: first.to_string(),
                        second: id.to_string(),
                        namespace: key.0,
                        name: key.1,
                    })
                }
                Some(_) => {}
                None => {
                    declared.insert(key, id.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ListOrSet, MapShape, Shape, StructureOrUnion};
    use proptest::prelude::*;
    use test_case::test_case;

    fn id(s: &str) -> ShapeId {
        format!("ex#{}", s).parse().unwrap()
    }

    fn string() -> ShapeId {
        "smithy.api#String".parse().unwrap()
    }

    fn sample_model() -> Model {
        let mut model = Model::new();
        let order = id("Order");
        model
            .add_shape(Shape::new(
                order.clone(),
                ShapeKind::Structure(StructureOrUnion {
                    members: vec![
                        Member::new(order.with_member("id"), string()),
                        Member::new(order.with_member("total"), "smithy.api#BigDecimal".parse().unwrap()),
                    ],
                }),
            ))
            .unwrap();
        let list = id("OrderList");
        model
            .add_shape(Shape::new(
                list.clone(),
                ShapeKind::List(ListOrSet { member: Member::new(list.with_member("member"), order) }),
            ))
            .unwrap();
        let tags = id("Tags");
        model
            .add_shape(Shape::new(
                tags.clone(),
                ShapeKind::Map(MapShape {
                    key: Member::new(tags.with_member("key"), string()),
                    value: Member::new(tags.with_member("value"), string()),
                }),
            ))
            .unwrap();
        let payment = id("Payment");
        model
            .add_shape(Shape::new(
                payment.clone(),
                ShapeKind::Union(StructureOrUnion {
                    members: vec![
                        Member::new(payment.with_member("card"), string()),
                        Member::new(payment.with_member("order"), id("Order")),
                    ],
                }),
            ))
            .unwrap();
        model
    }

    fn provider() -> CachingSymbolProvider {
        CachingSymbolProvider::new(Box::new(PythonSymbolProvider::new("shop")))
    }

    #[test]
    fn structure_symbol() {
        let model = sample_model();
        let symbols = provider();
        let order = symbols.symbol(&model, &id("Order")).unwrap();
        assert_eq!(order.full_name(), "shop.models.Order");
        assert_eq!(order.definition_file(), Some("shop/models.py"));
        let schema = order.expect_property(SCHEMA).unwrap();
        assert_eq!(schema.full_name(), "shop._private.schemas.ORDER");
        assert_eq!(schema.imported_name(), "_SCHEMA_ORDER");
    }

    #[test]
    fn member_resolves_to_target() {
        let model = sample_model();
        let symbols = provider();
        let via_member = symbols.symbol(&model, &id("OrderList").with_member("member")).unwrap();
        let direct = symbols.symbol(&model, &id("Order")).unwrap();
        assert_eq!(via_member, direct);
    }

    #[test]
    fn collections_get_helpers_only_when_needed() {
        let model = sample_model();
        let symbols = provider();
        let list = symbols.symbol(&model, &id("OrderList")).unwrap();
        assert_eq!(list.name(), "list[Order]");
        assert!(list.is_builtin());
        assert_eq!(list.references()[0].name(), "Order");
        assert_eq!(list.expect_property(SERIALIZER).unwrap().name(), "_serialize_order_list");
        assert_eq!(list.expect_property(DESERIALIZER).unwrap().name(), "_deserialize_order_list");

        let tags = symbols.symbol(&model, &id("Tags")).unwrap();
        assert_eq!(tags.name(), "dict[str, str]");
        assert!(tags.property(SERIALIZER).is_none());
        assert!(tags.property(SCHEMA).is_some());
    }

    #[test]
    fn union_symbols() {
        let model = sample_model();
        let symbols = provider();
        let payment = symbols.symbol(&model, &id("Payment")).unwrap();
        assert_eq!(payment.expect_property(UNKNOWN).unwrap().name(), "PaymentUnknown");
        assert_eq!(
            payment.expect_property(DESERIALIZER).unwrap().name(),
            "_PaymentDeserializer"
        );
        let card = symbols.symbol(&model, &id("Payment").with_member("card")).unwrap();
        assert_eq!(card.full_name(), "shop.models.PaymentCard");
    }

    #[test]
    fn unknown_member_is_not_found() {
        let model = sample_model();
        let symbols = provider();
        let err = symbols.symbol(&model, &id("Payment").with_member("cash"));
        assert!(matches!(err, Err(Error::ShapeNotFound(_))));
    }

    #[test_case("total" => "total")]
    #[test_case("totalPrice" => "total_price")]
    #[test_case("class" => "class_")]
    #[test_case("self" => "self_")]
    fn member_names(name: &str) -> String {
        escape_member_name(name)
    }

    #[test_case("Order" => "Order")]
    #[test_case("Schema" => "Schema_")]
    #[test_case("None" => "None_")]
    fn class_names(name: &str) -> String {
        escape_class_name(name)
    }

    /// maps every declared shape to the same name
    struct SameName {
        inner: Box<dyn SymbolProvider>,
    }

    impl SymbolProvider for SameName {
        fn to_symbol(
            &self,
            model: &Model,
            id: &ShapeId,
            symbols: &CachingSymbolProvider,
        ) -> Result<Symbol> {
            let symbol = self.inner.to_symbol(model, id, symbols)?;
            Ok(match symbol.definition_file() {
                Some(file) => Symbol::new("Thing", symbol.namespace()).with_definition_file(file),
                None => symbol,
            })
        }
    }

    #[test]
    fn decorated_collision_is_fatal() {
        let model = sample_model();
        let symbols = CachingSymbolProvider::new(Box::new(SameName {
            inner: Box::new(PythonSymbolProvider::new("shop")),
        }));
        symbols.symbol(&model, &id("Order")).unwrap();
        // same id again is not a collision
        symbols.symbol(&model, &id("Order")).unwrap();
        let err = symbols.symbol(&model, &id("Payment")).unwrap_err();
        match err {
            Error::NamingCollision { first, second, name, .. } => {
                assert_eq!(first, "ex#Order");
                assert_eq!(second, "ex#Payment");
                assert_eq!(name, "Thing");
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn builtins_never_collide() {
        let model = sample_model();
        let symbols = provider();
        // both resolve to `str`
        symbols.symbol(&model, &string()).unwrap();
        symbols.symbol(&model, &"smithy.api#String".parse().unwrap()).unwrap();
        symbols.symbol(&model, &id("Tags")).unwrap();
    }

    #[test]
    fn union_helpers_collide_with_structures() {
        let mut model = sample_model();
        model
            .add_shape(Shape::new(
                id("PaymentUnknown"),
                ShapeKind::Structure(StructureOrUnion { members: Vec::new() }),
            ))
            .unwrap();
        let symbols = provider();
        symbols.symbol(&model, &id("Payment")).unwrap();
        let err = symbols.symbol(&model, &id("PaymentUnknown")).unwrap_err();
        assert!(
            matches!(&err, Error::NamingCollision { name, .. } if name == "PaymentUnknown"),
            "{}",
            err
        );
    }

    #[test]
    fn collection_helpers_collide_across_namespaces() {
        let mut model = sample_model();
        let list: ShapeId = "other#OrderList".parse().unwrap();
        model
            .add_shape(Shape::new(
                list.clone(),
                ShapeKind::List(ListOrSet {
                    member: Member::new(list.with_member("member"), id("Order")),
                }),
            ))
            .unwrap();
        let symbols = provider();
        symbols.symbol(&model, &id("OrderList")).unwrap();
        let err = symbols.symbol(&model, &"other#OrderList".parse().unwrap()).unwrap_err();
        match err {
            Error::NamingCollision { first, second, .. } => {
                assert_eq!(first, "ex#OrderList");
                assert_eq!(second, "other#OrderList");
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn scalar_schema_constants_collide() {
        let mut model = sample_model();
        for ns in ["ex", "other"] {
            let name: ShapeId = format!("{}#Name", ns).parse().unwrap();
            model.add_shape(Shape::new(name, ShapeKind::Scalar(ScalarKind::String))).unwrap();
        }
        let symbols = provider();
        symbols.symbol(&model, &id("Name")).unwrap();
        let err = symbols.symbol(&model, &"other#Name".parse().unwrap()).unwrap_err();
        assert!(matches!(err, Error::NamingCollision { .. }), "{}", err);
    }

    proptest! {
        #[test]
        fn repeated_lookups_are_identical(order in proptest::collection::vec(0usize..6, 1..20)) {
            let model = sample_model();
            let ids = [
                id("Order"),
                id("OrderList"),
                id("Tags"),
                id("Payment"),
                id("Payment").with_member("order"),
                id("Order").with_member("total"),
            ];
            let fresh = provider();
            let expected = ids
                .iter()
                .map(|i| fresh.symbol(&model, i).unwrap())
                .collect::<Vec<_>>();
            let symbols = provider();
            for ix in order {
                let first = symbols.symbol(&model, &ids[ix]).unwrap();
                let second = symbols.symbol(&model, &ids[ix]).unwrap();
                prop_assert_eq!(&first, &second);
                prop_assert_eq!(&first, &expected[ix]);
            }
        }
    }
}
