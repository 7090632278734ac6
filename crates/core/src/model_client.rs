use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use toolchat_model::{
    ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent,
};
use tracing::Instrument;

type BoxedProviderError = Box<dyn ModelProviderError>;
type NextEventResult = Result<Option<ModelResponseEvent>, BoxedProviderError>;
type SendRequestResult = Result<ModelStream, BoxedProviderError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules.
///
/// Cloning the client is cheap, and clones share the same provider. This
/// is how several agents talk to one model endpoint.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    /// Wraps a model provider.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    match fut.await {
                        Ok(resp) => Ok(ModelStream::new(resp)),
                        Err(err) => {
                            error!("got an error: {err:?}");
                            Err(Box::new(err) as BoxedProviderError)
                        }
                    }
                }
                .instrument(trace_span!("model client req")),
            ) as BoxedSendRequestFuture
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the stream of response events.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
    ) -> Result<ModelStream, Box<dyn ModelProviderError>> {
        (self.handler_fn)(req).await
    }
}

/// The events of one model response, in arrival order.
///
/// Dropping the stream closes the underlying response.
pub struct ModelStream {
    inner: Pin<Box<dyn ResponseObject>>,
}

impl ModelStream {
    fn new<R: ModelResponse>(resp: R) -> Self {
        Self {
            inner: Box::pin(resp),
        }
    }

    /// Waits for the next event. `Ok(None)` marks the end of the response.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. Dropping the returned future leaves the
    /// stream untouched, the event will be returned by the next call.
    pub async fn next_event(&mut self) -> NextEventResult {
        let event = poll_fn(|cx| self.inner.as_mut().poll_event(cx)).await;
        if let Ok(Some(event)) = &event {
            trace!("got an event: {event:?}");
        }
        event
    }
}

trait ResponseObject: Send {
    fn poll_event(self: Pin<&mut Self>, cx: &mut Context<'_>)
    -> Poll<NextEventResult>;
}

impl<R: ModelResponse> ResponseObject for R {
    #[inline]
    fn poll_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<NextEventResult> {
        self.poll_next_event(cx)
            .map_err(|err| Box::new(err) as BoxedProviderError)
    }
}
