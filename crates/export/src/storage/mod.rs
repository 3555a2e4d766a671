//! Durable storage for export sessions
//!
//! This module defines the storage seams the sync engine writes through:
//! checkpoints, exported collections and the final archive. Each has an
//! on-disk implementation and an in-memory one for tests.

mod archive;
mod checkpoint;
mod export_file;
mod memory;
mod traits;

pub use archive::ZipArchiver;
pub use checkpoint::FileCheckpointStore;
pub use export_file::JsonExportWriter;
pub use memory::{InMemoryArchiver, InMemoryCheckpointStore, InMemoryExportWriter};
pub use traits::{Archiver, CheckpointStore, ExportWriter};
