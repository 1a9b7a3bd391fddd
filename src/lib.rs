//! tradecanvas: trading strategy programs built as typed node trees.
//!
//! Hexagonal architecture: the node tree, its compiler and its runtime in
//! [`domain`], port traits in [`ports`], concrete implementations in
//! [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
