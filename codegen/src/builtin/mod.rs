//! Integrations that ship with the generator, selected by name in codegen.toml.
//!
//! `http-auth` is always applied. The others are opt-in:
//!
//! ```toml
//! [python]
//! integrations = [ "rest-json", "sigv4" ]
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::{
    config::PythonSettings,
    error::{Error, Result},
    integration::{ConfigProperty, Integration, ProtocolGenerator, RuntimeClientPlugin},
    symbols::Symbol,
};

mod auth_schemes;
mod http_protocol;

pub use auth_schemes::{ApiKeyAuth, BearerAuth, SigV4Auth};
pub use http_protocol::HttpProtocolGenerator;

/// integrations applied to every run
const DEFAULT_INTEGRATIONS: &[&str] = &["http-auth"];

pub struct HttpAuthIntegration;

impl Integration for HttpAuthIntegration {
    fn name(&self) -> &str {
        "http-auth"
    }

    fn client_plugins(&self) -> Vec<RuntimeClientPlugin> {
        vec![
            RuntimeClientPlugin::new().with_auth_scheme(Arc::new(ApiKeyAuth)),
            RuntimeClientPlugin::new().with_auth_scheme(Arc::new(BearerAuth)),
        ]
    }
}

pub struct RestJsonIntegration;

impl Integration for RestJsonIntegration {
    fn name(&self) -> &str {
        "rest-json"
    }

    fn protocol_generators(&self) -> Vec<Arc<dyn ProtocolGenerator>> {
        vec![Arc::new(HttpProtocolGenerator::rest_json())]
    }
}

pub struct RpcV2CborIntegration;

impl Integration for RpcV2CborIntegration {
    fn name(&self) -> &str {
        "rpcv2-cbor"
    }

    fn protocol_generators(&self) -> Vec<Arc<dyn ProtocolGenerator>> {
        vec![Arc::new(HttpProtocolGenerator::rpcv2_cbor())]
    }
}

pub struct SigV4Integration;

impl Integration for SigV4Integration {
    fn name(&self) -> &str {
        "sigv4"
    }

    fn client_plugins(&self) -> Vec<RuntimeClientPlugin> {
        vec![RuntimeClientPlugin::new()
            .with_auth_scheme(Arc::new(SigV4Auth))
            .with_config_property(ConfigProperty::new(
                "region",
                Symbol::builtin("str"),
                "The AWS region to connect to. Requests are not signed with SigV4 without one.",
            ))
            .applies_when(|_, service| service.traits.has(&SigV4Auth::trait_id()))]
    }
}

/// Returns a builtin integration by name
pub fn builtin_integration(name: &str) -> Option<Box<dyn Integration>> {
    Some(match name {
        "http-auth" => Box::new(HttpAuthIntegration),
        "rest-json" => Box::new(RestJsonIntegration),
        "rpcv2-cbor" => Box::new(RpcV2CborIntegration),
        "sigv4" => Box::new(SigV4Integration),
        _ => return None,
    })
}

/// The default integrations plus those named in settings, sorted by priority.
/// An unknown name is a configuration error.
pub fn integrations_for(settings: &PythonSettings) -> Result<Vec<Box<dyn Integration>>> {
    let mut names: Vec<&str> = DEFAULT_INTEGRATIONS.to_vec();
    for name in settings.integrations.iter() {
        if !names.contains(&name.as_str()) {
            names.push(name);
        }
    }
    let mut integrations = names
        .into_iter()
        .map(|name| {
            builtin_integration(name).ok_or_else(|| Error::Config(format!("unknown integration '{}'", name)))
        })
        .collect::<Result<Vec<_>>>()?;
    integrations.sort_by_key(|i| std::cmp::Reverse(i.priority()));
    debug!(
        integrations = ?integrations.iter().map(|i| i.name()).collect::<Vec<_>>(),
        "enabled integrations"
    );
    Ok(integrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ShapeId;
    use std::path::PathBuf;

    fn settings(names: &[&str]) -> PythonSettings {
        let mut s = PythonSettings::new("ex#Svc".parse::<ShapeId>().unwrap(), "svc", PathBuf::from("out"));
        s.integrations = names.iter().map(|n| n.to_string()).collect();
        s
    }

    #[test]
    fn defaults_are_always_on() {
        let list = integrations_for(&settings(&["rest-json", "http-auth"])).unwrap();
        let names = list.iter().map(|i| i.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["http-auth", "rest-json"]);
    }

    #[test]
    fn unknown_integration_is_config_error() {
        assert!(matches!(integrations_for(&settings(&["soap"])), Err(Error::Config(_))));
    }

    #[test]
    fn protocol_generators_registered() {
        let rest = RestJsonIntegration.protocol_generators();
        assert_eq!(rest[0].protocol().to_string(), "aws.protocols#restJson1");
        let cbor = RpcV2CborIntegration.protocol_generators();
        assert_eq!(cbor[0].protocol().to_string(), "smithy.protocols#rpcv2Cbor");
    }
}
