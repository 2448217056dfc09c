//! URL handling module for urlscope
//!
//! This module provides scheme normalization, host comparison and the
//! structural breakdown of a resolved URL into its components.

mod components;
mod domain;
mod normalize;

// Re-export main functions
pub use components::{QueryParam, UrlComponents};
pub use domain::{extract_domain, host_of, hosts_match, split_domains, strip_www};
pub use normalize::{ensure_scheme, has_scheme, parse_absolute};
