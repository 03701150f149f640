//! Access list resolution and matching
//!
//! Handles:
//! - Merging group and direct grants into one ordered access list
//! - Matching a requested system URI against that list (exact or wildcard)

mod matcher;
mod resolver;

pub use matcher::{covers, match_system, SystemPath};
pub use resolver::{overlay, AccessResolver};
