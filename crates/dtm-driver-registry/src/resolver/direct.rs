//! `direct:///host1:port1,host2:port2` resolver

use async_trait::async_trait;
use url::Url;

use super::{ResolverBuilder, target_path};
use crate::error::Result;

/// Resolves the comma-separated address list carried in the target path
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectResolver;

#[async_trait]
impl ResolverBuilder for DirectResolver {
    fn scheme(&self) -> &str {
        "direct"
    }

    async fn resolve(&self, target: &Url) -> Result<Vec<String>> {
        Ok(target_path(target)
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect())
    }
}
