//! Pipeline configuration.

use crate::transforms::simplify_cfg::SimplifyOptions;

/// Which passes run and how. The CLI builds one of these from its flags;
/// library users fill it in directly.
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Run the CFG simplifier.
    pub simplify_cfg: bool,
    /// Rerun the whole pipeline until a full round changes nothing.
    pub fixpoint: bool,
    pub simplify: SimplifyOptions,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            simplify_cfg: true,
            fixpoint: true,
            simplify: SimplifyOptions::default(),
        }
    }
}

impl PassConfig {
    /// Default configuration with the named passes disabled. Unknown
    /// names are ignored so stale scripts keep working.
    pub fn from_skip_list(skip: &[String]) -> Self {
        let mut config = Self::default();
        for name in skip {
            if name == "simplify-cfg" {
                config.simplify_cfg = false;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_list_disables_named_pass() {
        let config = PassConfig::from_skip_list(&["simplify-cfg".to_string()]);
        assert!(!config.simplify_cfg);
    }

    #[test]
    fn unknown_names_are_ignored() {
        let config = PassConfig::from_skip_list(&["not-a-pass".to_string()]);
        assert!(config.simplify_cfg);
    }
}
