//! Proxy collection
//!
//! Proxies are reclaimed by an explicit mark-sweep pass over the proxy
//! arena. Marking starts from:
//! - proxies with outstanding host references
//! - the root set (native-side references, values kept forever)
//! - objects held by the refcount table
//!
//! and follows parent→first-child, sibling→next-sibling and keep-alive
//! edges. Everything unmarked is finalized parent before child.

mod collector;
mod roots;

pub use collector::CollectStats;
pub use roots::RootSet;
