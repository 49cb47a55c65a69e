//! Late-bound kernel collaborator interfaces.
//!
//! The support library cannot depend on the scheduler or platform crates
//! directly (they sit above it in the build graph), so each collaborator
//! exposes a struct of function pointers that the kernel registers during
//! boot.  Consumers call the module-level wrapper functions, which degrade
//! gracefully before registration.

mod service;

pub mod platform;
pub mod scheduler;

pub use service::ServiceCell;
