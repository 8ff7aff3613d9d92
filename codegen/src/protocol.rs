//! Protocol selection
//!
//! A service declares its protocols as traits. The first declared protocol
//! with a registered generator wins, unless settings pin one. When nothing
//! matches, the client is generated without serializers and sends requests
//! through whatever protocol is set on its config at runtime.

use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    gen::CodegenContext,
    integration::ProtocolGenerator,
    model::{protocol_definition_trait, Model, Shape, ShapeId},
    strings::to_snake_case,
    symbols::Symbol,
    writer::WriterDelegator,
};

pub const SERIALIZE_MODULE: &str = "_private.serialize";
pub const DESERIALIZE_MODULE: &str = "_private.deserialize";

lazy_static! {
    static ref KNOWN_PROTOCOLS: Vec<ShapeId> = [
        "aws.protocols#restJson1",
        "aws.protocols#awsJson1_0",
        "aws.protocols#awsJson1_1",
        "aws.protocols#restXml",
        "aws.protocols#awsQuery",
        "aws.protocols#ec2Query",
        "smithy.protocols#rpcv2Cbor",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect();
}

fn is_protocol_trait(model: &Model, trait_id: &ShapeId, registered: &[ShapeId]) -> bool {
    registered.contains(trait_id)
        || KNOWN_PROTOCOLS.contains(trait_id)
        || model.get(trait_id).map(|t| t.traits.has(protocol_definition_trait())).unwrap_or(false)
}

/// Protocols the service supports, in trait declaration order
pub fn declared_protocols(model: &Model, service: &Shape, registered: &[ShapeId]) -> Vec<ShapeId> {
    service
        .traits
        .ids()
        .filter(|id| is_protocol_trait(model, id, registered))
        .cloned()
        .collect()
}

/// Picks the protocol generator for the service.
///
/// Returns `Ok(None)` when no declared protocol has a generator. A pinned
/// protocol that the service doesn't declare, or that has no generator, is a
/// configuration error.
pub fn resolve_protocol(
    model: &Model,
    service: &Shape,
    pinned: Option<&ShapeId>,
    generators: &[Arc<dyn ProtocolGenerator>],
) -> Result<Option<Arc<dyn ProtocolGenerator>>> {
    let registered = generators.iter().map(|g| g.protocol()).collect::<Vec<_>>();
    let declared = declared_protocols(model, service, &registered);
    debug!(service = %service.id, ?declared, ?registered, "resolving protocol");

    if let Some(pinned) = pinned {
        if !declared.contains(pinned) {
            return Err(Error::Config(format!(
                "protocol {} is not supported by service {}",
                pinned, service.id
            )));
        }
        return generators
            .iter()
            .find(|g| &g.protocol() == pinned)
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::Config(format!("no generator is registered for protocol {}", pinned)));
    }

    for id in declared.iter() {
        if let Some(generator) = generators.iter().find(|g| &g.protocol() == id) {
            info!(protocol = %id, "selected protocol");
            return Ok(Some(generator.clone()));
        }
    }
    warn!(
        service = %service.id,
        ?declared,
        "no protocol generator matches the service; the client will use the protocol set on its config"
    );
    Ok(None)
}

/// `_serialize_{operation}` in `{module}._private.serialize`
pub fn serializer_symbol(module: &str, operation: &ShapeId) -> Symbol {
    private_function(module, SERIALIZE_MODULE, "serialize", operation)
}

/// `_deserialize_{operation}` in `{module}._private.deserialize`
pub fn deserializer_symbol(module: &str, operation: &ShapeId) -> Symbol {
    private_function(module, DESERIALIZE_MODULE, "deserialize", operation)
}

fn private_function(module: &str, submodule: &str, verb: &str, operation: &ShapeId) -> Symbol {
    Symbol::new(
        &format!("_{}_{}", verb, to_snake_case(operation.shape_name())),
        &format!("{}.{}", module, submodule),
    )
    .with_definition_file(&format!("{}/{}.py", module, submodule.replace('.', "/")))
}

/// Writes the serialize and deserialize modules with the selected generator.
/// Nothing is written in bare mode.
pub(crate) fn generate_protocol(cx: &CodegenContext<'_>, writers: &mut WriterDelegator) -> Result<()> {
    let generator = match &cx.protocol {
        Some(g) => g.clone(),
        None => return Ok(()),
    };
    let module = &cx.settings.module;
    let path = |sub: &str| format!("{}/{}.py", module, sub.replace('.', "/"));
    let namespace = |sub: &str| format!("{}.{}", module, sub);

    writers.use_file_writer(&path(SERIALIZE_MODULE), &namespace(SERIALIZE_MODULE), |w| {
        for dep in generator.dependencies() {
            w.add_dependency(dep);
        }
        generator.generate_request_serializers(cx, w)
    })?;
    writers.use_file_writer(&path(DESERIALIZE_MODULE), &namespace(DESERIALIZE_MODULE), |w| {
        for dep in generator.dependencies() {
            w.add_dependency(dep);
        }
        generator.generate_response_deserializers(cx, w)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{loader::load_json_str, writer::CodeWriter};

    struct Fake(&'static str);

    impl ProtocolGenerator for Fake {
        fn protocol(&self) -> ShapeId {
            self.0.parse().unwrap()
        }

        fn generate_request_serializers(&self, _cx: &CodegenContext<'_>, _w: &mut CodeWriter) -> Result<()> {
            Ok(())
        }

        fn generate_response_deserializers(
            &self,
            _cx: &CodegenContext<'_>,
            _w: &mut CodeWriter,
        ) -> Result<()> {
            Ok(())
        }
    }

    const MODEL: &str = r##"{ "smithy": "2.0", "shapes": {
        "ex#Svc": {
            "type": "service",
            "traits": {
                "smithy.api#documentation": "svc",
                "ex#p1": {},
                "aws.protocols#restJson1": {}
            }
        },
        "ex#p1": {
            "type": "structure",
            "traits": { "smithy.api#trait": {}, "smithy.api#protocolDefinition": {} }
        }
    } }"##;

    fn setup() -> Model {
        load_json_str(MODEL).unwrap()
    }

    fn gens(ids: &[&'static str]) -> Vec<Arc<dyn ProtocolGenerator>> {
        ids.iter().map(|id| Arc::new(Fake(id)) as Arc<dyn ProtocolGenerator>).collect()
    }

    #[test]
    fn declared_in_trait_order() {
        let model = setup();
        let svc = model.expect_shape(&"ex#Svc".parse().unwrap()).unwrap();
        let declared = declared_protocols(&model, svc, &[]);
        assert_eq!(
            declared,
            vec!["ex#p1".parse::<ShapeId>().unwrap(), "aws.protocols#restJson1".parse().unwrap()]
        );
    }

    #[test]
    fn first_registered_declared_protocol_wins() {
        let model = setup();
        let svc = model.expect_shape(&"ex#Svc".parse().unwrap()).unwrap();
        let selected = resolve_protocol(&model, svc, None, &gens(&["aws.protocols#restJson1"]))
            .unwrap()
            .unwrap();
        assert_eq!(selected.protocol().to_string(), "aws.protocols#restJson1");

        let selected =
            resolve_protocol(&model, svc, None, &gens(&["aws.protocols#restJson1", "ex#p1"]))
                .unwrap()
                .unwrap();
        assert_eq!(selected.protocol().to_string(), "ex#p1");
    }

    #[test]
    fn no_match_is_bare_mode() {
        let model = setup();
        let svc = model.expect_shape(&"ex#Svc".parse().unwrap()).unwrap();
        let selected = resolve_protocol(&model, svc, None, &gens(&["smithy.protocols#rpcv2Cbor"])).unwrap();
        assert!(selected.is_none());
    }

    #[test]
    fn pinned_protocol_must_be_declared_and_registered() {
        let model = setup();
        let svc = model.expect_shape(&"ex#Svc".parse().unwrap()).unwrap();
        let rest: ShapeId = "aws.protocols#restJson1".parse().unwrap();
        let cbor: ShapeId = "smithy.protocols#rpcv2Cbor".parse().unwrap();
        let all = gens(&["ex#p1", "aws.protocols#restJson1", "smithy.protocols#rpcv2Cbor"]);

        let selected = resolve_protocol(&model, svc, Some(&rest), &all).unwrap().unwrap();
        assert_eq!(selected.protocol(), rest);
        assert!(matches!(resolve_protocol(&model, svc, Some(&cbor), &all), Err(Error::Config(_))));
        assert!(matches!(resolve_protocol(&model, svc, Some(&rest), &gens(&["ex#p1"])), Err(Error::Config(_))));
    }

    #[test]
    fn function_symbols() {
        let op: ShapeId = "ex#GetCity".parse().unwrap();
        let s = serializer_symbol("weather", &op);
        assert_eq!(s.full_name(), "weather._private.serialize._serialize_get_city");
        assert_eq!(s.definition_file(), Some("weather/_private/serialize.py"));
        assert_eq!(deserializer_symbol("weather", &op).name(), "_deserialize_get_city");
    }
}
