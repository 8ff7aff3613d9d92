//! Auth schemes for `@httpApiKeyAuth`, `@httpBearerAuth` and `@aws.auth#sigv4`

use serde::Deserialize;

use crate::{
    args,
    error::{Error, Result},
    gen::CodegenContext,
    integration::AuthScheme,
    model::{Shape, ShapeId, PRELUDE_NAMESPACE},
    runtime,
    symbols::Symbol,
    writer::{python_string, CodeWriter},
};

fn write_factory(
    w: &mut CodeWriter,
    name: &str,
    scheme_id: &ShapeId,
    body: impl FnOnce(&mut CodeWriter) -> Result<()>,
    signer_properties: &str,
) -> Result<()> {
    let option = runtime::auth_option();
    w.open_block(
        "def $L(auth_params: $T) -> $T | None:",
        args![name, &runtime::auth_params(), &option],
        |w| {
            body(w)?;
            w.open_block("return $T(", args![&option], |w| {
                w.write("scheme_id=$S,", args![scheme_id.to_string()])?;
                w.write("identity_properties={},", args![])?;
                w.write("signer_properties=$L,", args![signer_properties])
            })?;
            w.write(")", args![])
        },
    )
}

fn trait_value<T: serde::de::DeserializeOwned>(service: &Shape, id: &ShapeId) -> Result<T> {
    service
        .traits
        .get_as::<T>(id)?
        .ok_or_else(|| Error::InvalidModel(format!("service {} has no trait {}", service.id, id)))
}

pub struct ApiKeyAuth;

#[derive(Deserialize)]
struct ApiKeyTrait {
    name: String,
    #[serde(rename = "in")]
    location: String,
    #[serde(default)]
    scheme: Option<String>,
}

impl AuthScheme for ApiKeyAuth {
    fn auth_trait(&self) -> ShapeId {
        ShapeId::new_unchecked(PRELUDE_NAMESPACE, "httpApiKeyAuth", None)
    }

    fn factory_name(&self) -> String {
        "_create_http_api_key_auth_option".to_string()
    }

    fn write_option_factory(
        &self,
        _cx: &CodegenContext<'_>,
        service: &Shape,
        writer: &mut CodeWriter,
    ) -> Result<()> {
        let config: ApiKeyTrait = trait_value(service, &self.auth_trait())?;
        let scheme = config.scheme.as_deref().map(python_string).unwrap_or_else(|| "None".to_string());
        let properties = format!(
            "{{\"name\": {}, \"location\": {}, \"scheme\": {}}}",
            python_string(&config.name),
            python_string(&config.location),
            scheme
        );
        write_factory(writer, &self.factory_name(), &self.auth_trait(), |_| Ok(()), &properties)
    }

    fn scheme_symbol(&self) -> Option<Symbol> {
        Some(
            Symbol::new("ApiKeyAuthScheme", "smithy_http.aio.auth.apikey")
                .with_dependency(runtime::dependency(runtime::SMITHY_HTTP)),
        )
    }
}

pub struct BearerAuth;

impl AuthScheme for BearerAuth {
    fn auth_trait(&self) -> ShapeId {
        ShapeId::new_unchecked(PRELUDE_NAMESPACE, "httpBearerAuth", None)
    }

    fn factory_name(&self) -> String {
        "_create_http_bearer_auth_option".to_string()
    }

    fn write_option_factory(
        &self,
        _cx: &CodegenContext<'_>,
        _service: &Shape,
        writer: &mut CodeWriter,
    ) -> Result<()> {
        write_factory(writer, &self.factory_name(), &self.auth_trait(), |_| Ok(()), "{}")
    }

    fn scheme_symbol(&self) -> Option<Symbol> {
        Some(
            Symbol::new("BearerAuthScheme", "smithy_http.aio.auth.bearer")
                .with_dependency(runtime::dependency(runtime::SMITHY_HTTP)),
        )
    }
}

pub struct SigV4Auth;

#[derive(Deserialize)]
struct SigV4Trait {
    name: String,
}

impl SigV4Auth {
    pub fn trait_id() -> ShapeId {
        ShapeId::new_unchecked("aws.auth", "sigv4", None)
    }
}

impl AuthScheme for SigV4Auth {
    fn auth_trait(&self) -> ShapeId {
        SigV4Auth::trait_id()
    }

    fn factory_name(&self) -> String {
        "_create_sigv4_auth_option".to_string()
    }

    /// The option needs a region; without one configured the factory returns None
    fn write_option_factory(
        &self,
        _cx: &CodegenContext<'_>,
        service: &Shape,
        writer: &mut CodeWriter,
    ) -> Result<()> {
        let config: SigV4Trait = trait_value(service, &self.auth_trait())?;
        let properties = format!("{{\"service\": {}, \"region\": region}}", python_string(&config.name));
        write_factory(
            writer,
            &self.factory_name(),
            &self.auth_trait(),
            |w| {
                w.write("region = getattr(auth_params.config, \"region\", None)", args![])?;
                w.open_block("if region is None:", args![], |w| w.write("return None", args![]))
            },
            &properties,
        )
    }

    fn scheme_symbol(&self) -> Option<Symbol> {
        Some(
            Symbol::new("SigV4AuthScheme", "smithy_aws_core.auth.sigv4")
                .with_dependency(runtime::dependency(runtime::SMITHY_AWS_CORE)),
        )
    }
}
