//! Package artifacts: resolution, download, metadata and storage

pub mod axml;
pub mod download;
pub mod metadata;
pub mod registry;
pub mod resolver;

pub use metadata::ArtifactMetadata;
pub use registry::{ArtifactRecord, ArtifactRegistry};
pub use resolver::{ArtifactResolver, ArtifactSource, ResolvedArtifact};
