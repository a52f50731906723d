use super::io::BoxedIo;
use crate::transport::channel::BoxFuture;
use http::Uri;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower_service::Service;

/// The default connector: dials a plaintext TCP connection to the URI's
/// `host:port`.
///
/// gRPC-core treats TLS as handled by whatever sits below the HTTP/2 layer
/// (TLS is assumed handled by the HTTP/2 layer): this connector
/// never establishes one itself. A caller that needs `https://` should
/// supply their own `Service<Uri, Response: hyper::rt::Read + hyper::rt::Write>`
/// (e.g. one built on `tokio-rustls`) to the lower-level
/// [`Connection`](super::Connection) constructors directly, rather than
/// going through [`Connector`].
#[derive(Debug, Clone, Default)]
pub(crate) struct Connector {
    _priv: (),
}

impl Connector {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Service<Uri> for Connector {
    type Response = TokioIo<BoxedIo>;
    type Error = crate::BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        Box::pin(async move {
            if uri.scheme_str() == Some("https") {
                return Err(
                    "grpc-core's default Connector only dials plaintext http:// URIs; \
                     pass a custom connector for TLS"
                        .into(),
                );
            }

            let host = uri
                .host()
                .ok_or("URI is missing a host")?
                .trim_start_matches('[')
                .trim_end_matches(']');
            let port = uri.port_u16().unwrap_or(80);

            let stream = TcpStream::connect((host, port)).await?;
            stream.set_nodelay(true)?;

            Ok(TokioIo::new(BoxedIo::new(stream)))
        })
    }
}
