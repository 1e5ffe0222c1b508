// ABOUTME: Rollout mode selection based on the declared replica count.
// ABOUTME: One replica is replaced in place; several are replaced one at a time.

use crate::config::Manifest;

/// How the primary service is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutMode {
    /// Stop, remove and restart the whole service as one unit.
    /// Accepts a brief outage.
    SingleShot,

    /// Replace replicas sequentially so at least N-1 keep serving.
    Rolling { replicas: u32 },
}

impl RolloutMode {
    /// Pick the mode for a manifest, with the reason when it is not rolling.
    pub fn for_manifest(manifest: &Manifest) -> (Self, Option<&'static str>) {
        match manifest.primary.replicas {
            0 | 1 => (
                RolloutMode::SingleShot,
                Some("a single replica is replaced in place with a brief outage"),
            ),
            replicas => (RolloutMode::Rolling { replicas }, None),
        }
    }

    pub fn replicas(self) -> u32 {
        match self {
            RolloutMode::SingleShot => 1,
            RolloutMode::Rolling { replicas } => replicas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(replicas: u32) -> Manifest {
        let yaml = format!(
            r#"
stack: shop
primary:
  name: api
  image: ghcr.io/acme/api
  replicas: {replicas}
health:
  endpoint: http://localhost:8000/health
"#
        );
        Manifest::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn single_replica_is_single_shot() {
        let (mode, reason) = RolloutMode::for_manifest(&manifest(1));
        assert_eq!(mode, RolloutMode::SingleShot);
        assert!(reason.unwrap().contains("outage"));
        assert_eq!(mode.replicas(), 1);
    }

    #[test]
    fn zero_replicas_still_runs_one() {
        let (mode, _) = RolloutMode::for_manifest(&manifest(0));
        assert_eq!(mode, RolloutMode::SingleShot);
        assert_eq!(mode.replicas(), 1);
    }

    #[test]
    fn several_replicas_roll() {
        let (mode, reason) = RolloutMode::for_manifest(&manifest(3));
        assert_eq!(mode, RolloutMode::Rolling { replicas: 3 });
        assert!(reason.is_none());
    }
}
