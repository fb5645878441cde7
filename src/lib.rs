//! # class-token-replacer
//!
//! Rewrites literal tokens such as `${VERSION}` inside the string constants of
//! compiled Java classes, either in place or into a shadow output directory.
//!
//! ## Architecture
//!
//! - **classfile**: Class file decoding into a tree and patch-based re-encoding
//! - **tokens**: Ordered token map and sequential substitution
//! - **visit**: Traversal of every rewritable string constant in a class
//! - **scan**: `.class` file discovery under input directories
//! - **process**: Per-file pipeline, output routing and the run report
//! - **config**: Run configuration and token file loading
//! - **cli**: Command-line definition

pub mod classfile;
pub mod cli;
pub mod config;
pub mod process;
pub mod scan;
pub mod tokens;
pub mod visit;
