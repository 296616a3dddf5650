//! HTTP transport terminating a Slicknode auth link chain
//!
//! [`HttpForward`] posts each operation to a Slicknode endpoint as JSON,
//! carrying along any headers placed on the operation context by links
//! earlier in the chain, such as the `Authorization` header attached by an
//! [`AuthLink`](slicknode_auth::AuthLink).
//!
//! ```
//! use std::sync::Arc;
//!
//! use slicknode_auth::{operation::Forward, AuthLink};
//! use slicknode_reqwest::HttpForward;
//!
//! let forward: Arc<dyn Forward> = Arc::new(HttpForward::from_client(
//!     reqwest::Client::default(),
//!     "https://example.slicknode.com/".parse().unwrap(),
//! ));
//!
//! let link = AuthLink::in_memory();
//! # let _ = (link, forward);
//! ```
//!
//! Since the transport is built over a
//! [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware), any
//! other `reqwest-middleware` layers may be included as well.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use futures::{stream, StreamExt};
use reqwest::{header, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Serialize;
use serde_json::{Map, Value};
use slicknode_auth::{
    operation::{Forward, Operation, Response, ResponseStream},
    Error,
};
use thiserror::Error;

/// An error encountered while exchanging an operation over HTTP
#[derive(Debug, Error)]
pub enum HttpForwardError {
    /// The request body could not be encoded
    #[error("unable to encode request body")]
    Encode(#[source] serde_json::Error),
    /// The request could not be sent
    #[error("error sending request")]
    Request(#[from] reqwest_middleware::Error),
    /// The response body could not be read
    #[error("error reading response body")]
    Body(#[source] reqwest::Error),
    /// A successful response did not carry a valid result
    #[error("response body is not a valid result")]
    Decode(#[source] serde_json::Error),
    /// An unsuccessful response did not carry a valid result
    #[error("endpoint responded with {status}")]
    Status {
        /// The response status
        status: StatusCode,
        /// The reason the body could not be read as a result
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
    variables: &'a Map<String, Value>,
}

/// Sends operations to a Slicknode endpoint
#[derive(Clone, Debug)]
pub struct HttpForward {
    client: ClientWithMiddleware,
    endpoint: Url,
}

impl HttpForward {
    /// Constructs a transport over a middleware-enabled client
    pub fn new(client: ClientWithMiddleware, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    /// Constructs a transport over a plain client
    pub fn from_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self::new(ClientBuilder::new(client).build(), endpoint)
    }

    /// Sends a single operation and decodes its result
    #[tracing::instrument(
        skip_all,
        fields(endpoint = %self.endpoint, operation = ?operation.operation_name)
    )]
    pub async fn send(&self, operation: Operation) -> Result<Response, HttpForwardError> {
        let body = serde_json::to_vec(&RequestBody {
            query: operation.query.to_string(),
            operation_name: operation.operation_name.as_deref(),
            variables: &operation.variables,
        })
        .map_err(HttpForwardError::Encode)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(operation.context.headers)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(HttpForwardError::Body)?;

        match serde_json::from_slice::<Response>(&bytes) {
            Ok(result) => {
                tracing::debug!(
                    %status,
                    errors = result.errors.len(),
                    "received result"
                );
                Ok(result)
            }
            Err(source) if status.is_success() => Err(HttpForwardError::Decode(source)),
            Err(source) => Err(HttpForwardError::Status { status, source }),
        }
    }
}

impl Forward for HttpForward {
    fn forward(&self, operation: Operation) -> ResponseStream {
        let this = self.clone();
        stream::once(async move {
            this.send(operation).await.map_err(|error| {
                tracing::warn!(
                    error = (&error as &dyn std::error::Error),
                    "operation could not be exchanged"
                );
                Error::transport(error)
            })
        })
        .boxed()
    }
}
