//! Syntax tree data model for the sift analyzer.
//!
//! Parsing raw text is the job of an external front end; this crate defines
//! the tree that front end produces and the analyzer consumes: an arena of
//! nodes addressed by `NodeId`, each carrying a source range and a typed
//! payload. `AstBuilder` constructs trees programmatically — it is the
//! production entry point for tree producers and the backbone of every test
//! in the downstream crates.

pub mod arena;
pub mod ast;
pub mod builder;

pub use arena::{Node, NodeArena, NodeId};
pub use ast::*;
pub use builder::AstBuilder;
