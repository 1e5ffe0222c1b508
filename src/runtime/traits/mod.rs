// ABOUTME: Composable capability traits for container runtimes.
// ABOUTME: Defines ImageOps, ContainerOps, NetworkOps, ExecOps, ArchiveOps, RuntimeInfo.

mod archive;
mod container;
mod exec;
mod image;
mod network;
mod runtime_info;
pub(crate) mod sealed;
mod shared_types;

pub use archive::{ArchiveError, ArchiveOps};
pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary, labels};
pub use exec::{ExecError, ExecOps};
pub use image::{ImageError, ImageOps};
pub use network::{NetworkError, NetworkOps};
pub use runtime_info::{RuntimeInfo, RuntimeInfoError};
pub use shared_types::*;

/// Everything the orchestrator needs from a container runtime.
pub trait Runtime: ContainerOps + ImageOps + ExecOps + ArchiveOps + NetworkOps + RuntimeInfo {}

impl<T> Runtime for T where T: ContainerOps + ImageOps + ExecOps + ArchiveOps + NetworkOps + RuntimeInfo
{}
