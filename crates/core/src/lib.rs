//! Core business logic for quill.
//!
//! Services sit between the HTTP layer and the repositories: they run the
//! authorization guards, validate input, assemble feeds and keep the
//! timeline cache coherent with post changes.

pub mod cache;
pub mod guard;
pub mod services;

#[cfg(test)]
mod fixtures;

pub use cache::{MemoryTimelineCache, RedisTimelineCache, TimelineCache};
pub use guard::{ensure_author, require_actor};
pub use services::*;
