use std::env;
use std::path::PathBuf;

/// Runtime configuration.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Compile Lambdas lazily on first application
    pub jit: bool,
    /// Compiled calls nested deeper than this on the host stack run in the
    /// heap interpreter instead
    pub native_depth_limit: usize,
    /// Attempt compilation of every bootstrap procedure at start-up
    pub compile_bootstrap: bool,
    /// Directory `fetch-text` names are resolved against
    pub fetch_root: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            jit: true,
            native_depth_limit: 64,
            compile_bootstrap: true,
            fetch_root: PathBuf::from("."),
        }
    }
}

fn flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"))
}

impl RuntimeConfig {
    /// Defaults overridden by `LECTERN_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = RuntimeConfig::default();
        if let Some(jit) = flag("LECTERN_JIT") {
            config.jit = jit;
        }
        if let Some(limit) = env::var("LECTERN_NATIVE_DEPTH")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            config.native_depth_limit = limit;
        }
        if let Some(eager) = flag("LECTERN_COMPILE_BOOTSTRAP") {
            config.compile_bootstrap = eager;
        }
        if let Ok(root) = env::var("LECTERN_FETCH_ROOT") {
            config.fetch_root = PathBuf::from(root);
        }
        config
    }

    /// Interpreter only.
    pub fn interpreted() -> Self {
        RuntimeConfig {
            jit: false,
            compile_bootstrap: false,
            ..RuntimeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.jit);
        assert_eq!(config.native_depth_limit, 64);
        assert!(!RuntimeConfig::interpreted().jit);
    }
}
