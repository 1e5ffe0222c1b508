// ABOUTME: Container runtime access for Docker and Podman.
// ABOUTME: Detects the local socket, connects with bollard and exposes capability traits.

mod bollard;
mod detection;
mod error;
#[cfg(test)]
pub(crate) mod fake;
mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use traits::*;
pub use types::{DetectedRuntime, RuntimeConfig, RuntimeType};

/// Detect the local runtime and connect to it.
pub fn connect_local(config: Option<&RuntimeConfig>) -> Result<BollardRuntime, RuntimeError> {
    let info = detect_local(config)?;
    tracing::debug!(
        runtime = %info.runtime_type,
        socket = %info.socket_path,
        "detected container runtime"
    );
    Ok(BollardRuntime::connect(&info)?)
}
