use super::AsyncService;
use crate::status::Status;
use crate::transport::channel::BoxFuture;
use crate::{body::Body, BoxError};
use http::{Request, Response, Uri};
use rand::Rng;
use std::future::{poll_fn, Future};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tower_service::Service;

/// Base delay (`n = 0`) for the reconnect backoff.
const BACKOFF_BASE: Duration = Duration::from_millis(50);
/// Maximum delay the backoff ever reaches.
const BACKOFF_CAP: Duration = Duration::from_secs(10);
/// Growth factor applied to the delay after each failed attempt.
const BACKOFF_FACTOR: f64 = 1.5;

struct Shared<M>
where
    M: Service<Uri>,
{
    maker: M,
    target: Uri,
    current: Option<M::Response>,
    attempt: u32,
    next_attempt_after: Option<Instant>,
}

/// A [`Service<Request<Body>>`] that lazily connects through `M` on first
/// use, reconnecting with exponential backoff whenever the
/// underlying connection fails, and failing in-flight requests observed at
/// the moment of disconnect with [`Code::Unavailable`](crate::status::Code::Unavailable).
///
/// Connecting (and reconnecting) is serialized through an internal async
/// mutex, but once a connection is established, the connected service is
/// *cloned* out from under the lock before being used — `M::Response`
/// (concretely, a cheaply-clonable handle onto the shared HTTP/2
/// connection) is what actually serializes concurrent stream writes, not
/// this type. This keeps concurrent calls on one connection running
/// concurrently over the same shared HTTP/2 transport.
pub(crate) struct Reconnect<M>
where
    M: Service<Uri>,
{
    shared: Arc<AsyncMutex<Shared<M>>>,
}

impl<M> Reconnect<M>
where
    M: Service<Uri> + Send + 'static,
    M::Error: Into<BoxError> + Send,
    M::Future: Send,
    M::Response: Send,
{
    pub(crate) fn new(maker: M, target: Uri, is_lazy: bool) -> Self {
        // `is_lazy` only governs whether the caller awaits readiness at
        // construction time (`Connection::connect` vs `Connection::lazy`);
        // this type always connects on first use either way.
        let _ = is_lazy;
        Self {
            shared: Arc::new(AsyncMutex::new(Shared {
                maker,
                target,
                current: None,
                attempt: 0,
                next_attempt_after: None,
            })),
        }
    }
}

async fn ensure_connected<M>(shared: &mut Shared<M>) -> Result<(), BoxError>
where
    M: Service<Uri> + Send,
    M::Error: Into<BoxError> + Send,
    M::Future: Send,
{
    if shared.current.is_some() {
        return Ok(());
    }

    if let Some(not_before) = shared.next_attempt_after {
        if Instant::now() < not_before {
            return Err(Box::new(Status::unavailable(
                "connection unavailable, backing off before reconnect attempt",
            )));
        }
    }

    poll_fn(|cx: &mut Context<'_>| shared.maker.poll_ready(cx))
        .await
        .map_err(Into::into)?;

    match shared.maker.call(shared.target.clone()).await {
        Ok(connected) => {
            shared.current = Some(connected);
            shared.attempt = 0;
            shared.next_attempt_after = None;
            Ok(())
        }
        Err(err) => {
            let backoff = backoff_delay(shared.attempt);
            shared.attempt = shared.attempt.saturating_add(1);
            shared.next_attempt_after = Some(Instant::now() + backoff);
            Err(err.into())
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponential = BACKOFF_BASE.as_secs_f64() * BACKOFF_FACTOR.powi(attempt as i32);
    let capped = exponential.min(BACKOFF_CAP.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(1.0f64..2.0f64);
    Duration::from_secs_f64(capped * jitter)
}

async fn get_connected<M>(shared: &Arc<AsyncMutex<Shared<M>>>) -> Result<M::Response, BoxError>
where
    M: Service<Uri> + Send,
    M::Error: Into<BoxError> + Send,
    M::Future: Send,
    M::Response: Clone,
{
    let mut guard = shared.lock().await;
    ensure_connected(&mut guard).await?;
    Ok(guard.current.clone().expect("connected by ensure_connected"))
}

impl<M> Service<Request<Body>> for Reconnect<M>
where
    M: Service<Uri> + Send + 'static,
    M::Error: Into<BoxError> + Send,
    M::Future: Send,
    M::Response: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    <M::Response as Service<Request<Body>>>::Error: Into<BoxError> + Send,
    <M::Response as Service<Request<Body>>>::Future: Send,
{
    type Response = Response<Body>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Connecting/reconnecting happens lazily inside the returned future;
        // backpressure for an unavailable connection surfaces as an `Err`
        // from that future instead, rather than never resolving `poll_ready`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let shared = self.shared.clone();
        Box::pin(async move {
            let mut svc = get_connected(&shared).await?;
            match svc.call(req).await {
                Ok(resp) => {
                    shared.lock().await.attempt = 0;
                    Ok(resp)
                }
                Err(err) => {
                    shared.lock().await.current = None;
                    Err(disconnect_error(err.into()))
                }
            }
        })
    }
}

impl<M> AsyncService<Request<Body>> for Reconnect<M>
where
    M: Service<Uri> + Send + 'static,
    M::Error: Into<BoxError> + Send,
    M::Future: Send,
    M::Response: AsyncService<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    <M::Response as Service<Request<Body>>>::Error: Into<BoxError> + Send,
    <M::Response as Service<Request<Body>>>::Future: Send,
{
    fn async_call(
        &mut self,
        input: impl Future<Output = Request<Body>> + Send + 'static,
    ) -> Self::Future {
        let shared = self.shared.clone();
        Box::pin(async move {
            let mut svc = get_connected(&shared).await?;
            match svc.async_call(input).await {
                Ok(resp) => {
                    shared.lock().await.attempt = 0;
                    Ok(resp)
                }
                Err(err) => {
                    shared.lock().await.current = None;
                    Err(disconnect_error(err.into()))
                }
            }
        })
    }
}

fn disconnect_error(err: BoxError) -> BoxError {
    Box::new(Status::unavailable(format!("connection lost: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped_and_nondecreasing_in_expectation() {
        let d0 = backoff_delay(0);
        let d10 = backoff_delay(10);
        assert!(d0 >= BACKOFF_BASE);
        assert!(d0 < BACKOFF_BASE * 2);
        assert!(d10 <= BACKOFF_CAP * 2);
    }
}
