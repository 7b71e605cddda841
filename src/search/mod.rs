//! Downstream search collaborator.
//!
//! The admission core guards a search endpoint but does not own it; the
//! actual mention-search client sits behind [`SearchBackend`]. The bundled
//! implementation returns a canned payload so the service runs end to end
//! without external credentials.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

/// External search collaborator invoked after admission succeeds.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, keyword: &str) -> Result<Value>;
}

/// Canned backend for demos and tests.
pub struct StaticSearchBackend;

#[async_trait]
impl SearchBackend for StaticSearchBackend {
    async fn search(&self, keyword: &str) -> Result<Value> {
        Ok(json!({
            "keyword": keyword,
            "mentions": [],
            "note": "static backend: connect a live search client in production",
        }))
    }
}
