use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, Ready};
use serde_json::json;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use crate::audit::{AuditLogger, EventType, SecurityEvent};
use crate::error::AuthError;
use crate::middleware::auth::RequestMeta;
use crate::security::jwt::AccessClaims;
use crate::security::roles::RoleProvider;

/// Role-based authorization. Composes after `Authenticate`; a request with no
/// verified claims in its extensions is rejected as unauthenticated rather
/// than forbidden.
pub struct Authorize {
    required_roles: HashSet<String>,
    roles: Arc<dyn RoleProvider>,
    audit: Arc<AuditLogger>,
}

impl Authorize {
    pub fn new(
        required_roles: &[&str],
        roles: Arc<dyn RoleProvider>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            required_roles: required_roles.iter().map(|r| r.to_string()).collect(),
            roles,
            audit,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authorize
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthorizeService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthorizeService {
            service: Rc::new(service),
            required_roles: self.required_roles.clone(),
            roles: self.roles.clone(),
            audit: self.audit.clone(),
        }))
    }
}

pub struct AuthorizeService<S> {
    service: Rc<S>,
    required_roles: HashSet<String>,
    roles: Arc<dyn RoleProvider>,
    audit: Arc<AuditLogger>,
}

impl<S, B> Service<ServiceRequest> for AuthorizeService<S>
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
        let required = self.required_roles.clone();
        let roles = self.roles.clone();
        let audit = self.audit.clone();

        Box::pin(async move {
            // Claims are cloned out so the extensions borrow ends before
            // the downstream call.
            let claims = req.extensions().get::<AccessClaims>().cloned();
            let claims = match claims {
                Some(c) => c,
                None => return Err(AuthError::MissingCredentials.into()),
            };

            let granted = roles.get_roles(&claims.sub).await.map_err(Error::from)?;

            if required.is_disjoint(&granted) {
                let meta = RequestMeta::capture(&req);
                let event = meta.apply(
                    SecurityEvent::new(EventType::AuthorizationFailed)
                        .user_id(claims.sub.clone())
                        .reason("required role not granted")
                        .metadata(json!({
                            "requiredRoles": required.iter().collect::<Vec<_>>(),
                        })),
                );
                audit.log_security_event(event).await;

                tracing::warn!(user_id = %claims.sub, "authorization failed");
                return Err(AuthError::Forbidden.into());
            }

            service.call(req).await
        })
    }
}
