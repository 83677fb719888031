mod cache;

pub use cache::{IconCache, IconState, IconSubscription};

use std::future::Future;

use anyhow::Result;

/// Where icon bytes come from. Returns a base64 encoded PNG.
pub trait IconSource: Send + Sync + 'static {
    fn fetch_icon(&self, app_id: &str) -> impl Future<Output = Result<String>> + Send;
}
