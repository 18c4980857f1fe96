//! Transport seam between the convergence core and the remote API.
//!
//! The core only needs four verbs over JSON bodies. [`HttpTransport`] talks
//! to the real service; `FakeService` (feature `test-utils`) is an in-memory
//! stand-in owned by the test that creates it.

pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{ApiError, Result};
#[cfg(any(test, feature = "test-utils"))]
pub use fake::{FakeService, RecordedRequest};
pub use http::HttpTransport;

/// JSON-over-HTTP access to the remote API.
///
/// Paths are relative to the API root, e.g. `/deviceManagement/roleScopeTags/1`.
/// Implementations must be usable from concurrent operations without
/// external locking.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value>;

    /// Returns the response body, if the service sent one.
    async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>>;

    async fn patch(&self, path: &str, body: &Value) -> Result<Option<Value>>;

    async fn delete(&self, path: &str) -> Result<()>;
}

/// Entries of a collection listing (`{ "value": [...] }`). Only the first
/// page is read.
pub fn listing_items<'a>(listing: &'a Value, what: &str) -> Result<&'a [Value]> {
    listing
        .get("value")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| ApiError::Decode(format!("{} listing has no value array", what)))
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get(&self, path: &str) -> Result<Value> {
        (**self).get(path).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        (**self).post(path, body).await
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        (**self).patch(path, body).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        (**self).delete(path).await
    }
}
