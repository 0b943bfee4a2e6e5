//! Tower middleware wrapping a transport in the resilience pipeline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::config::{ClientConfig, ConfigError};
use crate::http::request::RequestDescriptor;
use crate::http::response::UpstreamResponse;
use crate::resilience::pipeline::ResiliencePipeline;
use crate::resilience::types::{ResilienceError, TransportError};

/// Layer producing a [`ResilienceService`] around any transport.
#[derive(Debug, Clone)]
pub struct ResilienceLayer {
    config: Arc<ClientConfig>,
}

impl ResilienceLayer {
    /// Validates eagerly so `layer` itself cannot fail.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        crate::config::validation::validate_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
        })
    }
}

impl<T> Layer<T> for ResilienceLayer
where
    T: Service<RequestDescriptor, Response = UpstreamResponse, Error = TransportError> + Clone + Send + Sync + 'static,
    T::Future: Send,
{
    type Service = ResilienceService<T>;

    fn layer(&self, transport: T) -> Self::Service {
        ResilienceService::new(Arc::new(ResiliencePipeline::from_validated(&self.config, transport)))
    }
}

/// Service sharing one pipeline (and so one breaker registry) across clones.
pub struct ResilienceService<T> {
    pipeline: Arc<ResiliencePipeline<T>>,
}

impl<T> ResilienceService<T> {
    pub fn new(pipeline: Arc<ResiliencePipeline<T>>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<ResiliencePipeline<T>> {
        &self.pipeline
    }
}

impl<T> Clone for ResilienceService<T> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<T> Service<RequestDescriptor> for ResilienceService<T>
where
    T: Service<RequestDescriptor, Response = UpstreamResponse, Error = TransportError> + Clone + Send + Sync + 'static,
    T::Future: Send,
{
    type Response = UpstreamResponse;
    type Error = ResilienceError;
    type Future = Pin<Box<dyn Future<Output = Result<UpstreamResponse, ResilienceError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RequestDescriptor) -> Self::Future {
        let pipeline = self.pipeline.clone();
        Box::pin(async move { pipeline.execute(request).await })
    }
}
