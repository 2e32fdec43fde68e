// ABOUTME: Content location strategies for vehicle detail pages.
// ABOUTME: Includes site profiles, search path application, candidate location and path discovery.

//! Content location module.
//!
//! Submodules:
//! - `profile`: Site profiles and the per-domain registry.
//! - `loader`: Built-in profiles embedded as JSON.
//! - `compiled`: Shared CSS selector cache.
//! - `select`: Search path application.
//! - `locate`: Candidate location with profile precedence.
//! - `discovery`: Exploratory scoring and search path proposals.

pub mod compiled;
pub mod discovery;
pub mod loader;
pub mod locate;
pub mod profile;
pub mod select;
