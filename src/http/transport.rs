//! Hyper-based HTTP transport.
//!
//! # Responsibilities
//! - Send one attempt over a pooled hyper-util client
//! - Collect the full body and trailers before returning
//! - Map hyper errors onto `TransportError`, marking connect failures as unprocessed
//!
//! # Design Decisions
//! - Implements `tower::Service` so any other transport can be swapped in
//! - Connect timeout is enforced by the connector and surfaces as a connect error
//! - The per-attempt deadline is applied by the pipeline, not here

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::Service;

use crate::config::TimeoutConfig;
use crate::http::request::RequestDescriptor;
use crate::http::response::UpstreamResponse;
use crate::resilience::types::TransportError;

/// Pooled HTTP/1.1 + HTTP/2 transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpTransport {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeouts.connect()));
        connector.set_nodelay(true);

        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
        }
    }

    async fn send(
        client: Client<HttpConnector, Full<Bytes>>,
        request: RequestDescriptor,
    ) -> Result<UpstreamResponse, TransportError> {
        let mut outbound = Request::new(Full::new(request.body));
        *outbound.method_mut() = request.method;
        *outbound.uri_mut() = request.uri;
        *outbound.headers_mut() = request.headers;

        let response = client.request(outbound).await.map_err(|e| {
            if e.is_connect() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Request(e.to_string())
            }
        })?;

        let (parts, body) = response.into_parts();
        let collected = body
            .collect()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        let trailers = collected.trailers().cloned();

        Ok(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            trailers,
            body: collected.to_bytes(),
        })
    }
}

impl Service<RequestDescriptor> for HttpTransport {
    type Response = UpstreamResponse;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<UpstreamResponse, TransportError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RequestDescriptor) -> Self::Future {
        Box::pin(Self::send(self.client.clone(), request))
    }
}
