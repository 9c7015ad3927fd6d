//! # Repository Module
//!
//! SQL for the SQLite backend, kept behind small repository types.
//!
//! ## Available Repositories
//!
//! - [`DocumentRepository`](document::DocumentRepository) - the single
//!   document row and its corrupt-body archive

pub mod document;
