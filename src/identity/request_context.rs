use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Extensions;

use super::Principal;

/// Per-request identity, inserted into request extensions by the authenticator and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal, request_id: uuid::Uuid::new_v4().to_string() }
    }

    /// Panics when the authenticator did not run for this request; that is a routing bug,
    /// not a client error.
    pub fn from_extensions(ext: &Extensions) -> &RequestContext {
        match ext.get::<RequestContext>() {
            Some(ctx) => ctx,
            None => panic!("missing request context: authenticate middleware must wrap this route"),
        }
    }
}

/// Handler extractor for the resolved principal.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for CurrentPrincipal {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentPrincipal(RequestContext::from_extensions(&parts.extensions).principal.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_roundtrips_through_extensions() {
        let mut ext = Extensions::new();
        ext.insert(RequestContext::new(Principal::Anonymous));
        let ctx = RequestContext::from_extensions(&ext);
        assert!(ctx.principal.is_anonymous());
        assert_eq!(ctx.request_id.len(), 36);
    }

    #[test]
    #[should_panic(expected = "missing request context")]
    fn missing_context_is_fatal() {
        let ext = Extensions::new();
        let _ = RequestContext::from_extensions(&ext);
    }
}
