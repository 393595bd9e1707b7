//! Group tooling for Microsoft 365 and Active Directory
//!
//! - [`walker`] flattens nested group membership
//! - [`scope`] converts security group scope behind a conflict gate
//! - [`compare`] checks which identities exist in two directories
//!
//! All of them work against any [`directory::DirectoryProvider`].

pub mod audit;
pub mod compare;
pub mod config;
pub mod directory;
pub mod error;
pub mod graph;
pub mod input;
pub mod logging;
pub mod report;
pub mod scope;
pub mod walker;

pub use error::{DirctlError, Result};
