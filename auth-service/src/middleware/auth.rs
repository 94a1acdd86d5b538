use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use crate::audit::{AuditLogger, EventType, SecurityEvent};
use crate::error::AuthError;
use crate::security::jwt::{AccessClaims, JwtService};

/// Request metadata captured before the service call for audit events.
#[derive(Debug, Clone)]
pub(crate) struct RequestMeta {
    pub source_ip: String,
    pub user_agent: Option<String>,
    pub path: String,
    pub method: String,
}

impl RequestMeta {
    pub fn capture(req: &ServiceRequest) -> Self {
        Self {
            source_ip: req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string(),
            user_agent: req
                .headers()
                .get("User-Agent")
                .and_then(|h| h.to_str().ok())
                .map(String::from),
            path: req.path().to_string(),
            method: req.method().to_string(),
        }
    }

    pub fn apply(&self, event: SecurityEvent) -> SecurityEvent {
        let event = event
            .source_ip(self.source_ip.clone())
            .path(self.path.clone())
            .method(self.method.clone());
        match &self.user_agent {
            Some(agent) => event.user_agent(agent.clone()),
            None => event,
        }
    }
}

/// Pull the bearer token out of the Authorization header.
fn bearer_token(req: &ServiceRequest) -> Result<String, AuthError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .map(String::from)
        .ok_or(AuthError::MalformedCredentials)
}

async fn verify_request(
    req: &ServiceRequest,
    jwt: &JwtService,
) -> Result<AccessClaims, AuthError> {
    let token = bearer_token(req)?;
    jwt.verify_access_token(&token).await
}

async fn audit_failure(audit: &AuditLogger, meta: &RequestMeta, err: &AuthError) {
    let event = meta.apply(
        SecurityEvent::new(EventType::AuthenticationFailed).reason(err.audit_reason()),
    );
    audit.log_security_event(event).await;
}

/// Authentication middleware. Rejects with a fixed 401 body unless the
/// request carries a verifiable bearer token; each rejection produces exactly
/// one AUTHENTICATION_FAILED audit event carrying the detailed reason.
pub struct Authenticate {
    jwt: Arc<JwtService>,
    audit: Arc<AuditLogger>,
}

impl Authenticate {
    pub fn new(jwt: Arc<JwtService>, audit: Arc<AuditLogger>) -> Self {
        Self { jwt, audit }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authenticate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthenticateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticateService {
            service: Rc::new(service),
            jwt: self.jwt.clone(),
            audit: self.audit.clone(),
        }))
    }
}

pub struct AuthenticateService<S> {
    service: Rc<S>,
    jwt: Arc<JwtService>,
    audit: Arc<AuditLogger>,
}

impl<S, B> Service<ServiceRequest> for AuthenticateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt = self.jwt.clone();
        let audit = self.audit.clone();

        Box::pin(async move {
            let meta = RequestMeta::capture(&req);

            match verify_request(&req, &jwt).await {
                Ok(claims) => {
                    req.extensions_mut().insert(claims);
                    service.call(req).await
                }
                Err(err) => {
                    tracing::warn!(path = %meta.path, reason = %err.audit_reason(), "authentication failed");
                    audit_failure(&audit, &meta, &err).await;
                    Err(err.into())
                }
            }
        })
    }
}

/// Like `Authenticate`, but a failed or absent credential lets the request
/// through anonymously. Verification failures are still audited; a bad token
/// never silently passes unnoticed.
pub struct OptionalAuthenticate {
    jwt: Arc<JwtService>,
    audit: Arc<AuditLogger>,
}

impl OptionalAuthenticate {
    pub fn new(jwt: Arc<JwtService>, audit: Arc<AuditLogger>) -> Self {
        Self { jwt, audit }
    }
}

impl<S, B> Transform<S, ServiceRequest> for OptionalAuthenticate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = OptionalAuthenticateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(OptionalAuthenticateService {
            service: Rc::new(service),
            jwt: self.jwt.clone(),
            audit: self.audit.clone(),
        }))
    }
}

pub struct OptionalAuthenticateService<S> {
    service: Rc<S>,
    jwt: Arc<JwtService>,
    audit: Arc<AuditLogger>,
}

impl<S, B> Service<ServiceRequest> for OptionalAuthenticateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt = self.jwt.clone();
        let audit = self.audit.clone();

        Box::pin(async move {
            // Absent credentials are the normal anonymous case, not a failure.
            if req.headers().get("Authorization").is_some() {
                let meta = RequestMeta::capture(&req);
                match verify_request(&req, &jwt).await {
                    Ok(claims) => {
                        req.extensions_mut().insert(claims);
                    }
                    Err(err) => {
                        tracing::debug!(path = %meta.path, "optional auth failed, continuing anonymously");
                        audit_failure(&audit, &meta, &err).await;
                    }
                }
            }

            service.call(req).await
        })
    }
}

/// Verified identity recovered from request extensions. Only populated by
/// `Authenticate` / `OptionalAuthenticate`.
#[derive(Debug, Clone)]
pub struct AuthedUser(pub AccessClaims);

impl actix_web::FromRequest for AuthedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<AccessClaims>() {
            Some(claims) => ready(Ok(AuthedUser(claims.clone()))),
            None => ready(Err(AuthError::MissingCredentials.into())),
        }
    }
}
