//! The target environment conditionals are evaluated against.

use serde::Serialize;

/// The (version tuple, platform string) pair that `if sys.version_info ...`
/// and `if sys.platform ...` blocks are resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetEnv {
    /// Target runtime version, e.g. `[2, 7, 6]`.
    pub python_version: Vec<u32>,
    /// Target platform string, e.g. `"linux"`.
    pub platform: String,
}

impl TargetEnv {
    pub fn new(python_version: Vec<u32>, platform: impl Into<String>) -> Self {
        Self {
            python_version,
            platform: platform.into(),
        }
    }
}

impl Default for TargetEnv {
    fn default() -> Self {
        Self::new(vec![2, 7, 6], "linux")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target() {
        let target = TargetEnv::default();
        assert_eq!(target.python_version, vec![2, 7, 6]);
        assert_eq!(target.platform, "linux");
    }
}
