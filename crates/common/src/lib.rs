//! Common utilities and shared types for quill.
//!
//! This crate provides foundational components used across all quill crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Pagination**: Page-number arithmetic with clamping via [`PageRequest`]
//! - **Storage**: File storage backends for post images
//!
//! # Example
//!
//! ```no_run
//! use quill_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {} (page size {})", id, config.feed.page_size);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod pagination;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use pagination::{Page, PageInfo, PageRequest};
pub use storage::{LocalStorage, StorageBackend, StoredFile, generate_storage_key};
