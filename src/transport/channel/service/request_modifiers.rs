use crate::transport::channel::RawRequest;
use http::header::{HeaderValue, USER_AGENT};
use http::uri::{Parts, Scheme, Uri};
use std::future::{ready, Ready};

/// Rewrites every outgoing request's URI to carry the connection's actual
/// scheme and authority, leaving the path/query set by the caller (the gRPC
/// method path) untouched.
///
/// `Endpoint::origin` lets a caller connect to one address (say, a sidecar
/// proxy) while presenting a different `:authority` to the server — this is
/// what applies that override on every request, not just the one used to
/// establish the connection.
#[derive(Debug, Clone)]
pub(crate) struct AddOrigin {
    scheme: Scheme,
    authority: http::uri::Authority,
}

impl AddOrigin {
    pub(crate) fn new(origin: Uri) -> Result<Self, crate::BoxError> {
        let parts = origin.into_parts();
        let scheme = parts.scheme.ok_or("origin URI is missing a scheme")?;
        let authority = parts.authority.ok_or("origin URI is missing an authority")?;
        Ok(Self { scheme, authority })
    }

    pub(crate) fn to_request_fn(
        &self,
    ) -> impl FnOnce(RawRequest<crate::body::Body>) -> Ready<RawRequest<crate::body::Body>> + Clone
    {
        let scheme = self.scheme.clone();
        let authority = self.authority.clone();
        move |mut req| {
            let mut parts = Parts::default();
            parts.scheme = Some(scheme);
            parts.authority = Some(authority);
            parts.path_and_query = req.uri().path_and_query().cloned();
            *req.uri_mut() = Uri::from_parts(parts).expect("scheme+authority+path_and_query is a valid URI");
            ready(req)
        }
    }
}

/// Sets the `user-agent` header on outgoing requests, if one wasn't already
/// set by the caller.
#[derive(Debug, Clone)]
pub(crate) struct UserAgent {
    value: Option<HeaderValue>,
}

impl UserAgent {
    pub(crate) fn new(value: Option<HeaderValue>) -> Self {
        Self { value }
    }

    pub(crate) fn to_request_fn(
        &self,
    ) -> impl FnOnce(RawRequest<crate::body::Body>) -> Ready<RawRequest<crate::body::Body>> + Clone
    {
        let value = self
            .value
            .clone()
            .unwrap_or_else(|| HeaderValue::from_static(crate::DEFAULT_USER_AGENT));
        move |mut req| {
            req.headers_mut().entry(USER_AGENT).or_insert(value);
            ready(req)
        }
    }
}
