//! Auth scheme resolution
//!
//! The service's effective schemes come from its `@auth` trait, or, without
//! one, from every auth-definition trait applied to it, sorted by id.
//! Operations with their own `@auth` trait get that list instead, limited to
//! schemes the service applies. Both lists are then filtered to schemes with
//! a registered `AuthScheme`, keeping their order.
//!
//! The generated `HTTPAuthSchemeResolver` calls each candidate's factory in
//! order and returns every option produced; the caller uses the first.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::{
    args,
    error::{Error, Result},
    gen::CodegenContext,
    integration::AuthScheme,
    model::{auth_definition_trait, auth_trait, Model, Shape, ShapeId},
    runtime,
    symbols::Symbol,
    writer::{Section, WriterDelegator},
};

pub const AUTH_MODULE: &str = "auth";
const RESOLVER_NAME: &str = "HTTPAuthSchemeResolver";

lazy_static! {
    static ref KNOWN_AUTH_TRAITS: Vec<ShapeId> = [
        "smithy.api#httpBasicAuth",
        "smithy.api#httpDigestAuth",
        "smithy.api#httpBearerAuth",
        "smithy.api#httpApiKeyAuth",
        "aws.auth#sigv4",
        "aws.auth#sigv4a",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect();
}

/// true if the trait defines an auth scheme
pub fn is_auth_definition(model: &Model, trait_id: &ShapeId) -> bool {
    KNOWN_AUTH_TRAITS.contains(trait_id)
        || model
            .get(trait_id)
            .map(|shape| shape.traits.has(auth_definition_trait()))
            .unwrap_or(false)
}

/// Auth-definition traits applied to the shape, sorted by id
pub fn applied_auth_traits(model: &Model, shape: &Shape) -> Vec<ShapeId> {
    let mut applied = shape
        .traits
        .ids()
        .filter(|id| is_auth_definition(model, id))
        .cloned()
        .collect::<Vec<_>>();
    applied.sort();
    applied
}

/// Parses the value of an `@auth` trait, if the shape has one
fn auth_trait_list(shape: &Shape) -> Result<Option<Vec<ShapeId>>> {
    let names: Option<Vec<String>> = shape.traits.get_as(auth_trait())?;
    names
        .map(|names| names.iter().map(|n| ShapeId::parse_relative(n)).collect::<Result<Vec<_>>>())
        .transpose()
}

/// Effective auth schemes of the service, in priority order
pub fn service_auth_schemes(model: &Model, service: &Shape) -> Result<Vec<ShapeId>> {
    let applied = applied_auth_traits(model, service);
    match auth_trait_list(service)? {
        Some(listed) => {
            for id in listed.iter() {
                if !applied.contains(id) {
                    return Err(Error::InvalidModel(format!(
                        "service {} lists auth scheme {} that it does not apply",
                        service.id, id
                    )));
                }
            }
            Ok(listed)
        }
        None => Ok(applied),
    }
}

/// Auth schemes an operation overrides with its own `@auth` trait,
/// limited to those the service applies. None if the operation has no override.
pub fn operation_auth_schemes(
    model: &Model,
    service: &Shape,
    operation: &Shape,
) -> Result<Option<Vec<ShapeId>>> {
    let applied = applied_auth_traits(model, service);
    Ok(auth_trait_list(operation)?.map(|listed| {
        listed
            .into_iter()
            .filter(|id| {
                let keep = applied.contains(id);
                if !keep {
                    warn!(operation = %operation.id, scheme = %id, "ignoring auth scheme the service does not apply");
                }
                keep
            })
            .collect()
    }))
}

/// Ordered auth scheme ids for the service and for each operation that overrides them,
/// restricted to registered schemes
#[derive(Debug, Default, PartialEq)]
pub struct AuthResolution {
    pub service: Vec<ShapeId>,
    pub operations: BTreeMap<ShapeId, Vec<ShapeId>>,
}

impl AuthResolution {
    pub fn resolve(
        model: &Model,
        service: &Shape,
        operations: &[&Shape],
        registered: &[ShapeId],
    ) -> Result<AuthResolution> {
        let keep_registered = |ids: Vec<ShapeId>| {
            ids.into_iter().filter(|id| registered.contains(id)).collect::<Vec<_>>()
        };
        let service_schemes = keep_registered(service_auth_schemes(model, service)?);
        let mut overrides = BTreeMap::new();
        for operation in operations {
            if let Some(schemes) = operation_auth_schemes(model, service, operation)? {
                // the resolver matches on the bare operation name
                let name = operation.id.shape_name();
                if let Some(other) =
                    operations.iter().find(|o| o.id != operation.id && o.id.shape_name() == name)
                {
                    return Err(Error::InvalidModel(format!(
                        "auth override of {} is ambiguous: {} has the same name {}",
                        operation.id, other.id, name
                    )));
                }
                overrides.insert(operation.id.clone(), keep_registered(schemes));
            }
        }
        debug!(service = ?service_schemes, overrides = overrides.len(), "resolved auth schemes");
        Ok(AuthResolution { service: service_schemes, operations: overrides })
    }

    /// schemes for the operation: its override, or the service list
    pub fn for_operation(&self, operation: &ShapeId) -> &[ShapeId] {
        self.operations.get(operation).unwrap_or(&self.service)
    }

    /// every scheme used anywhere, in order of first use
    pub fn all_schemes(&self) -> Vec<&ShapeId> {
        let mut all: Vec<&ShapeId> = Vec::new();
        for id in self.service.iter().chain(self.operations.values().flatten()) {
            if !all.contains(&id) {
                all.push(id);
            }
        }
        all
    }
}

pub fn resolver_symbol(package: &str) -> Symbol {
    Symbol::new(RESOLVER_NAME, &format!("{}.{}", package, AUTH_MODULE))
        .with_definition_file(&format!("{}/{}.py", package, AUTH_MODULE))
}

/// Auth schemes from client plugins that apply to the service, keyed by trait.
/// The first registration of a trait wins.
pub fn registered_schemes(cx: &CodegenContext<'_>) -> HashMap<ShapeId, Arc<dyn AuthScheme>> {
    let mut schemes: HashMap<ShapeId, Arc<dyn AuthScheme>> = HashMap::new();
    for plugin in cx.plugins.iter() {
        if let Some(scheme) = plugin.auth_scheme() {
            schemes.entry(scheme.auth_trait()).or_insert_with(|| scheme.clone());
        }
    }
    schemes
}

/// Writes `{package}/auth.py`: one option factory per scheme in use,
/// then the resolver
pub fn generate_auth(
    cx: &CodegenContext<'_>,
    resolution: &AuthResolution,
    schemes: &HashMap<ShapeId, Arc<dyn AuthScheme>>,
    writers: &mut WriterDelegator,
) -> Result<()> {
    let resolver = resolver_symbol(&cx.settings.module);
    writers.use_shape_writer(&resolver, |w| {
        for id in resolution.all_schemes() {
            let scheme = schemes
                .get(id)
                .ok_or_else(|| Error::Other(format!("auth scheme {} is not registered", id)))?;
            scheme.write_option_factory(cx, cx.service, w)?;
            w.newline();
            w.newline();
        }

        let factory_list = |ids: &[ShapeId]| -> Result<String> {
            let names = ids
                .iter()
                .map(|id| {
                    schemes
                        .get(id)
                        .map(|s| s.factory_name())
                        .ok_or_else(|| Error::Other(format!("auth scheme {} is not registered", id)))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("[{}]", names.join(", ")))
        };
        let service_list = factory_list(&resolution.service)?;
        let mut overrides = Vec::new();
        for (op, ids) in resolution.operations.iter() {
            overrides.push((op.shape_name().to_string(), factory_list(ids)?));
        }

        let params = runtime::auth_params();
        let option = runtime::auth_option();
        w.with_state(Some(Section::AuthResolver(cx.service.id.clone())), |w| {
            w.open_block("class $L:", args![RESOLVER_NAME], |w| {
                w.write_docs(&format!(
                    "Resolves the auth options for a {} operation, most preferred first.",
                    cx.service.id.shape_name()
                ));
                w.newline();
                w.open_block(
                    "def resolve_auth_scheme(self, auth_parameters: $T) -> list[$T]:",
                    args![&params, &option],
                    |w| {
                        w.write(
                            "candidates: list[$T[[$T], $T | None]]",
                            args![&runtime::callable(), &params, &option],
                        )?;
                        if overrides.is_empty() {
                            w.write("candidates = $L", args![&service_list])?;
                        } else {
                            w.open_block("match auth_parameters.operation:", args![], |w| {
                                for (name, list) in overrides.iter() {
                                    w.open_block("case $S:", args![name], |w| {
                                        w.write("candidates = $L", args![list])
                                    })?;
                                }
                                w.open_block("case _:", args![], |w| {
                                    w.write("candidates = $L", args![&service_list])
                                })
                            })?;
                        }
                        w.newline();
                        w.write("auth_options: list[$T] = []", args![&option])?;
                        w.open_block("for factory in candidates:", args![], |w| {
                            w.open_block(
                                "if (option := factory(auth_parameters)) is not None:",
                                args![],
                                |w| w.write("auth_options.append(option)", args![]),
                            )
                        })?;
                        w.write("return auth_options", args![])
                    },
                )
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{loader::load_json_str, model::ShapeKind};

    const MODEL: &str = r##"{ "smithy": "2.0", "shapes": {
        "ex#Svc": {
            "type": "service",
            "operations": [ { "target": "ex#Op" }, { "target": "ex#Other" }, { "target": "ex#Open" } ],
            "traits": {
                "smithy.api#httpBearerAuth": {},
                "smithy.api#httpApiKeyAuth": { "name": "X-Api-Key", "in": "header" },
                "ex#customAuth": {},
                "smithy.api#auth": [ "smithy.api#httpApiKeyAuth", "smithy.api#httpBearerAuth" ]
            }
        },
        "ex#customAuth": {
            "type": "structure",
            "traits": { "smithy.api#trait": {}, "smithy.api#authDefinition": {} }
        },
        "ex#Op": { "type": "operation", "traits": { "smithy.api#auth": [ "smithy.api#httpBearerAuth" ] } },
        "ex#Other": { "type": "operation" },
        "ex#Open": { "type": "operation", "traits": { "smithy.api#auth": [] } }
    } }"##;

    fn id(s: &str) -> ShapeId {
        s.parse().unwrap()
    }

    fn ops(model: &Model) -> Vec<&Shape> {
        model.shapes().filter(|s| matches!(s.kind, ShapeKind::Operation(_))).collect()
    }

    #[test]
    fn applied_traits_sorted_and_custom_definitions_found() {
        let model = load_json_str(MODEL).unwrap();
        let svc = model.expect_shape(&id("ex#Svc")).unwrap();
        assert_eq!(
            applied_auth_traits(&model, svc),
            vec![id("ex#customAuth"), id("smithy.api#httpApiKeyAuth"), id("smithy.api#httpBearerAuth")]
        );
    }

    #[test]
    fn operation_override_restricts_list() {
        let model = load_json_str(MODEL).unwrap();
        let svc = model.expect_shape(&id("ex#Svc")).unwrap();
        let registered = [id("smithy.api#httpApiKeyAuth"), id("smithy.api#httpBearerAuth")];
        let resolution = AuthResolution::resolve(&model, svc, &ops(&model), &registered).unwrap();
        assert_eq!(resolution.service, registered.to_vec());
        assert_eq!(resolution.for_operation(&id("ex#Op")), &[id("smithy.api#httpBearerAuth")]);
        assert_eq!(resolution.for_operation(&id("ex#Other")), &registered[..]);
        assert!(resolution.for_operation(&id("ex#Open")).is_empty());
    }

    #[test]
    fn override_with_shared_operation_name_is_invalid() {
        let text = MODEL.replace(
            r#""ex#Other": { "type": "operation" },"#,
            r#""ex#Other": { "type": "operation" }, "other#Op": { "type": "operation" },"#,
        );
        let model = load_json_str(&text).unwrap();
        let svc = model.expect_shape(&id("ex#Svc")).unwrap();
        let registered = [id("smithy.api#httpBearerAuth")];
        let result = AuthResolution::resolve(&model, svc, &ops(&model), &registered);
        assert!(matches!(result, Err(Error::InvalidModel(_))), "{:?}", result);
    }

    #[test]
    fn unregistered_schemes_are_dropped() {
        let model = load_json_str(MODEL).unwrap();
        let svc = model.expect_shape(&id("ex#Svc")).unwrap();
        let registered = [id("smithy.api#httpBearerAuth")];
        let resolution = AuthResolution::resolve(&model, svc, &ops(&model), &registered).unwrap();
        assert_eq!(resolution.service, vec![id("smithy.api#httpBearerAuth")]);
        assert_eq!(resolution.all_schemes(), vec![&id("smithy.api#httpBearerAuth")]);
    }

    #[test]
    fn without_auth_trait_all_applied_in_id_order() {
        let text = MODEL.replace(
            r#""smithy.api#auth": [ "smithy.api#httpApiKeyAuth", "smithy.api#httpBearerAuth" ]"#,
            r#""smithy.api#documentation": "svc""#,
        );
        let model = load_json_str(&text).unwrap();
        let svc = model.expect_shape(&id("ex#Svc")).unwrap();
        assert_eq!(
            service_auth_schemes(&model, svc).unwrap(),
            vec![id("ex#customAuth"), id("smithy.api#httpApiKeyAuth"), id("smithy.api#httpBearerAuth")]
        );
    }

    #[test]
    fn listing_unapplied_scheme_is_invalid() {
        let text = MODEL.replace(r#""ex#customAuth": {},"#, "").replace(
            r#"[ "smithy.api#httpApiKeyAuth", "smithy.api#httpBearerAuth" ]"#,
            r#"[ "aws.auth#sigv4" ]"#,
        );
        let model = load_json_str(&text).unwrap();
        let svc = model.expect_shape(&id("ex#Svc")).unwrap();
        assert!(matches!(service_auth_schemes(&model, svc), Err(Error::InvalidModel(_))));
    }
}
