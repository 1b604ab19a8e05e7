//! VFS layer
//!
//! Responsibilities:
//! - Build the virtual tree from catalog entries (`index`) and serve it
//!   read-only from an inode-addressed arena (`tree`).
//! - Track open physical files for read requests (`handles`).
//! - Expose a single facade (`fs::MuseFs`) to the FUSE adapter and the CLI.
//!
//! Submodules:
//! - `config`: TTLs and mount-level settings
//! - `error`: `VfsError` and its errno mapping
//! - `fs`: `MuseFs` facade
//! - `handles`: open-file handle table
//! - `index`: view indexer
//! - `name`: path segment sanitising and leaf naming
//! - `tree`: node graph
pub mod config;
pub mod error;
pub mod fs;
pub mod handles;
pub mod index;
pub mod name;
pub mod tree;
