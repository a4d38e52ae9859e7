#![warn(missing_docs)]
//! A virtual module tree with an on-demand resolver.
//!
//! Fragments of a path-like tree are merged into an [installer::Installer].
//! Units in the tree are resolved with Node-style rules (extension fallback,
//! `package.json` main fields, `node_modules` lookup, aliases), evaluated at
//! most once, and can be deferred until their dependencies arrive or fetched
//! in batches when they are missing.
pub mod config;
pub mod error;
pub mod evaluate;
pub mod installer;
pub mod prefetch;
mod readiness;
pub mod resolver;
pub mod scheduler;
pub mod tree;
pub(crate) mod utils;
pub mod value;

pub use config::{Config, Fallback, Options};
pub use error::{Abandoned, ModuleError, ModuleErrorObj, ModuleResult, NotFound, Thrown};
pub use evaluate::{Module, Require};
pub use installer::Installer;
pub use prefetch::{Fetch, FetchRequest};
pub use resolver::absolute_id;
pub use scheduler::Defer;
pub use tree::{Fragment, Part};
pub use value::Value;
