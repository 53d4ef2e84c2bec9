//! Default constants for bridge configuration.
//!
//! Centralizes the numbers shared by `BridgeOptions`, the proxy arena and
//! the refcount table.

/// Default number of proxy slots reserved up front.
pub const DEFAULT_PROXY_CAPACITY: usize = 256;

/// Finalize every live proxy when the bridge is disposed.
pub const DEFAULT_FINALIZE_ON_DISPOSE: bool = true;

/// Clear a child's parent link when its parent's native object goes away.
pub const DEFAULT_CLEAR_ORPHAN_PARENT_LINKS: bool = true;

/// First handle token handed out by the refcount table.
/// Zero is never used so a null `void*` can't alias a live handle.
pub const FIRST_HANDLE_TOKEN: usize = 1;

/// Exception class used when native code raises an unregistered name.
pub const FALLBACK_EXCEPTION: &str = "Exception";
