//! Requests, responses, and the downstream handler seam

use futures::stream::BoxStream;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{document::Document, error::Error};

/// A request travelling down the chain
#[derive(Clone, Debug, Default)]
pub struct Operation {
    /// The request document
    pub query: Document,
    /// The name of the operation to execute, if the document defines several
    pub operation_name: Option<String>,
    /// Variable values
    pub variables: Map<String, Value>,
    /// Per-request context shared with downstream handlers
    pub context: Context,
}

impl Operation {
    /// Constructs an operation with no variables and an empty context
    pub fn new(query: impl Into<Document>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Sets the operation name
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Sets a variable value
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// Per-request context
#[derive(Clone, Debug, Default)]
pub struct Context {
    /// Headers that the terminating handler sends along with the request
    pub headers: HeaderMap,
}

/// A response as delivered by the API
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The result data, absent if execution failed before producing any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Errors reported by the API
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
    /// Protocol extensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl Response {
    /// A response carrying only data
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// Looks up a top-level member of the result data
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(key))
    }
}

/// The stream of results produced for a single request
pub type ResponseStream = BoxStream<'static, Result<Response, Error>>;

/// The next handler in the request chain
pub trait Forward: Send + Sync {
    /// Sends an operation onward, returning its stream of results
    fn forward(&self, operation: Operation) -> ResponseStream;
}

impl<F> Forward for F
where
    F: Fn(Operation) -> ResponseStream + Send + Sync,
{
    fn forward(&self, operation: Operation) -> ResponseStream {
        self(operation)
    }
}
