// ABOUTME: Tree access for the engine: the DocumentTree adapter trait and its scraper-backed implementation.
// ABOUTME: Also hosts the selector cache, text helpers and tree-distance utilities.

//! DOM access layer.
//!
//! Everything above this module queries documents only through
//! [`tree::DocumentTree`], so detection runs the same against a parsed HTML
//! page, a test fixture, or any other tree representation.

pub mod compiled;
pub mod distance;
pub mod html;
pub mod text;
pub mod tree;

pub use html::HtmlTree;
pub use tree::DocumentTree;
