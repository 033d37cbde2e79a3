//! Per-agent workspaces for Switchyard.
//!
//! Every agent owns a directory tree under a shared base directory. Tools
//! reach it only through the [`Sandbox`](switchyard_core::Sandbox) trait,
//! and every path they hand in is confined to that tree by
//! [`resolve_in_workspace`].

pub mod local;
pub mod path;

pub use local::LocalSandbox;
pub use path::resolve_in_workspace;
