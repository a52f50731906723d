use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{HeaderValue, Method, Request as HttpRequest, Response as HttpResponse, StatusCode};
use tower::util::BoxCloneService;
use tower_service::Service;

use crate::body::Body;
use crate::status::Status;

use super::{NamedService, Server};

type Route = BoxCloneService<HttpRequest<Body>, HttpResponse<Body>, Infallible>;

/// A path-dispatching `tower::Service`, built by [`Server::add_service`] /
/// [`Router::add_service`].
///
/// Dispatch is by gRPC service name only (the first `/`-delimited segment
/// of `:path`) — each registered handler is expected to be a generated
/// `{Service}Server`-style wrapper that itself matches on the full path to
/// pick a method and drives it through [`crate::server::Grpc`]. Everything
/// that happens *before* a handler is reached — the non-POST / malformed
/// path rejections, and the "no such service" case — is handled here.
#[derive(Clone)]
pub struct Router {
    server: Server,
    routes: Arc<HashMap<&'static str, Route>>,
}

impl Router {
    pub(super) fn new(server: Server) -> Self {
        Self {
            server,
            routes: Arc::new(HashMap::new()),
        }
    }

    /// Registers a gRPC service, keyed by [`NamedService::NAME`].
    #[must_use]
    pub fn add_service<S>(mut self, svc: S) -> Self
    where
        S: NamedService
            + Service<HttpRequest<Body>, Response = HttpResponse<Body>, Error = Infallible>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        Arc::make_mut(&mut self.routes).insert(S::NAME, BoxCloneService::new(svc));
        self
    }

    /// Binds `addr` and serves registered services until the process is
    /// killed. See [`Router::serve_with_shutdown`] for the graceful variant.
    pub async fn serve(self, addr: std::net::SocketAddr) -> Result<(), crate::BoxError> {
        super::transport::serve(self, addr, std::future::pending()).await
    }

    /// Like [`Router::serve`], but stops accepting new connections (and,
    /// once in-flight calls drain, returns) when `signal` resolves.
    pub async fn serve_with_shutdown<F>(
        self,
        addr: std::net::SocketAddr,
        signal: F,
    ) -> Result<(), crate::BoxError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        super::transport::serve(self, addr, signal).await
    }

    pub(super) fn server(&self) -> &Server {
        &self.server
    }
}

impl Service<HttpRequest<Body>> for Router {
    type Response = HttpResponse<Body>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HttpRequest<Body>) -> Self::Future {
        if req.method() != Method::POST {
            let mut response = HttpResponse::new(Body::empty());
            *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
            response
                .headers_mut()
                .insert(http::header::ALLOW, HeaderValue::from_static("POST"));
            return Box::pin(std::future::ready(Ok(response)));
        }

        let Some(service_name) = parse_service_name(req.uri().path()) else {
            let mut response = HttpResponse::new(Body::empty());
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Box::pin(std::future::ready(Ok(response)));
        };

        let Some(route) = self.routes.get(service_name).cloned() else {
            let response = Status::unimplemented(format!(
                "no gRPC service found for name `{service_name}`"
            ))
            .to_http_response();
            return Box::pin(std::future::ready(Ok(response)));
        };

        let mut route = route;
        Box::pin(async move {
            match route.call(req).await {
                Ok(response) => Ok(response),
                Err(never) => match never {},
            }
        })
    }
}

/// Splits `/{service}/{method}` into its service-name segment, rejecting
/// anything that doesn't have exactly that shape (an invalid path gets a
/// plain HTTP 400, ahead of any gRPC-status machinery).
fn parse_service_name(path: &str) -> Option<&str> {
    let mut segments = path.strip_prefix('/')?.splitn(2, '/');
    let service = segments.next().filter(|s| !s.is_empty())?;
    let method = segments.next().filter(|s| !s.is_empty())?;
    let _ = method;
    Some(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_path() {
        assert_eq!(parse_service_name("/pkg.Greeter/SayHello"), Some("pkg.Greeter"));
    }

    #[test]
    fn rejects_missing_method() {
        assert_eq!(parse_service_name("/pkg.Greeter"), None);
        assert_eq!(parse_service_name("/pkg.Greeter/"), None);
    }

    #[test]
    fn rejects_missing_leading_slash() {
        assert_eq!(parse_service_name("pkg.Greeter/SayHello"), None);
    }
}
