//! Reference implementation of the update/reactivity protocol the compiled
//! component programs depend on, over an in-memory document tree so the
//! protocol is executable and testable without a browser.

pub mod dom;
pub mod element;
pub mod reactive;
pub mod registry;
pub mod scheduler;

pub use dom::{Node, NodeHandle, NodeKind};
pub use element::{PropValue, RwcElement};
pub use reactive::Reactive;
pub use registry::{UpdateEntry, UpdateRegistry};
pub use scheduler::FrameScheduler;
