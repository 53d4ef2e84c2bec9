//! Bridge configuration
//!
//! Options are plain data. They deserialize from JSON so an embedding
//! application can keep them next to its generated class descriptions;
//! every field falls back to the constant in [`crate::defaults`].

use crate::defaults::{
    DEFAULT_CLEAR_ORPHAN_PARENT_LINKS, DEFAULT_FINALIZE_ON_DISPOSE, DEFAULT_PROXY_CAPACITY,
};
use ferrule_sdk::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Proxy slots reserved at startup
    pub proxy_capacity: usize,
    /// Run finalizers for every live proxy on `dispose`
    pub finalize_on_dispose: bool,
    /// When `forget_ptr` orphans children, also drop their parent link
    pub clear_orphan_parent_links: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            proxy_capacity: DEFAULT_PROXY_CAPACITY,
            finalize_on_dispose: DEFAULT_FINALIZE_ON_DISPOSE,
            clear_orphan_parent_links: DEFAULT_CLEAR_ORPHAN_PARENT_LINKS,
        }
    }
}

impl BridgeOptions {
    /// Parse options from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> BridgeResult<Self> {
        serde_json::from_str(text).map_err(|e| BridgeError::InvalidDescription(e.to_string()))
    }

    /// Set the initial proxy capacity
    pub fn with_proxy_capacity(mut self, capacity: usize) -> Self {
        self.proxy_capacity = capacity;
        self
    }

    /// Choose whether `dispose` finalizes live proxies
    pub fn with_finalize_on_dispose(mut self, enabled: bool) -> Self {
        self.finalize_on_dispose = enabled;
        self
    }

    /// Choose whether orphaned children keep a link to their dead parent
    pub fn with_clear_orphan_parent_links(mut self, enabled: bool) -> Self {
        self.clear_orphan_parent_links = enabled;
        self
    }
}
