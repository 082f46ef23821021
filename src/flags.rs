use async_trait::async_trait;
use std::collections::BTreeMap;

/// Feature flag lookup
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn is_enabled(&self, name: &str) -> bool;
}

/// Flags fixed at startup from configuration; unknown flags are off
#[derive(Clone, Debug, Default)]
pub struct StaticFlags {
    flags: BTreeMap<String, bool>,
}

impl StaticFlags {
    pub fn new(flags: BTreeMap<String, bool>) -> Self {
        Self { flags }
    }

    pub fn enabled(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| (n.to_string(), true)).collect())
    }
}

#[async_trait]
impl FeatureFlags for StaticFlags {
    async fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}
