//! Pipeline wiring (Axum router + stage layers).
//!
//! - [`Pipeline`]: the shared collaborators every stage needs
//! - [`Pipeline::protect`]: authentication → authorization → audit → usage around a router
//! - [`Pipeline::wrap`]: correlation around everything, protected or not
//! - `routes`: demo handlers used by the binary and the black-box tests

use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get};
use thiserror::Error;
use tower::ServiceBuilder;
use uuid::Uuid;

use warden_auth::{RequiredEntitlements, RsaTokenVerifier, TokenError, TokenVerifier};
use warden_events::{EventEmitter, EventProducer};
use warden_infra::cache::EntitlementCache;
use warden_infra::{EntitlementResolver, HttpEntitlementSource, SourceError, WardenConfig};

use crate::middleware::{self, AuditState, AuthnState, AuthzState, UsageState};

pub mod routes;

/// Process-resource fields reported on every usage record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSettings {
    pub product_id: Uuid,
    pub memory_mb: u32,
    pub service_name: String,
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    EntitlementSource(#[from] SourceError),
}

#[derive(Clone)]
pub struct Pipeline {
    verifier: Arc<dyn TokenVerifier>,
    resolver: Arc<EntitlementResolver>,
    emitter: EventEmitter,
    audit_body_limit: usize,
    usage: UsageSettings,
}

impl Pipeline {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        resolver: Arc<EntitlementResolver>,
        emitter: EventEmitter,
        usage: UsageSettings,
    ) -> Self {
        Self {
            verifier,
            resolver,
            emitter,
            audit_body_limit: middleware::audit::DEFAULT_BODY_LIMIT,
            usage,
        }
    }

    pub fn with_audit_body_limit(mut self, limit: usize) -> Self {
        self.audit_body_limit = limit;
        self
    }

    /// Wire the production collaborators from configuration.
    ///
    /// `public_key_pem` is the already-loaded RSA verification key.
    pub fn from_config(
        config: &WardenConfig,
        public_key_pem: &[u8],
        producer: Arc<dyn EventProducer>,
        cache: Arc<dyn EntitlementCache>,
    ) -> Result<Self, SetupError> {
        let verifier = RsaTokenVerifier::from_rsa_pem(public_key_pem, config.claims_policy())?;
        let source =
            HttpEntitlementSource::new(config.entitlement_url.clone(), config.entitlement_timeout)?;
        let resolver = EntitlementResolver::new(cache, Arc::new(source))
            .with_negative_grace(config.negative_grace);
        let emitter = EventEmitter::new(producer, config.event_topic.clone(), &config.service)
            .with_send_timeout(config.event_send_timeout);

        Ok(Self::new(
            Arc::new(verifier),
            Arc::new(resolver),
            emitter,
            UsageSettings {
                product_id: config.product_id,
                memory_mb: config.memory_limit_mb,
                service_name: config.service.name.clone(),
            },
        )
        .with_audit_body_limit(config.audit_body_limit))
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Require authentication and one of `required` for every route in `routes`.
    pub fn protect(&self, routes: Router, required: RequiredEntitlements) -> Router {
        let authn = AuthnState {
            verifier: self.verifier.clone(),
            emitter: self.emitter.clone(),
        };
        let authz = AuthzState {
            resolver: self.resolver.clone(),
            emitter: self.emitter.clone(),
            required: Arc::new(required),
        };
        let audit = AuditState {
            emitter: self.emitter.clone(),
            body_limit: self.audit_body_limit,
        };
        let usage = UsageState {
            emitter: self.emitter.clone(),
            settings: self.usage.clone(),
        };

        // ServiceBuilder: first layer is outermost.
        routes.layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    authn,
                    middleware::authentication_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    authz,
                    middleware::authorization_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    audit,
                    middleware::audit_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    usage,
                    middleware::usage_middleware,
                )),
        )
    }

    /// Outermost stage: correlation IDs for every request.
    pub fn wrap(&self, router: Router) -> Router {
        router.layer(axum::middleware::from_fn(middleware::correlation_middleware))
    }
}

/// Build the demo HTTP router (used by `main.rs` and the black-box tests).
pub fn build_app(pipeline: &Pipeline, required: RequiredEntitlements) -> Router {
    let protected = pipeline.protect(
        Router::new()
            .route("/whoami", get(routes::whoami))
            .route("/echo", any(routes::echo))
            .route("/fail", any(routes::fail)),
        required,
    );

    pipeline.wrap(
        Router::new()
            .route("/health", get(routes::health))
            .merge(protected),
    )
}
