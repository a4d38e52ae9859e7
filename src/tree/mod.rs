//! The node tree that modules live in, the fragments it is grown from, and the
//! merge operation between them.
//!
//! Nodes are never removed. A node may claim a parent without being listed in
//! it; this is how anonymous entry points get a namespace for relative
//! identifiers without showing up in directory listings.
mod fragment;
mod merge;
pub(crate) mod node;

pub use fragment::{Factory, FactoryFn, Fragment, Part};
pub(crate) use merge::merge;
