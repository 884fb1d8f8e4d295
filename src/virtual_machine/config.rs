use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1 << 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Directories searched, in order, for `a/b/C.class`.
    pub classpath: Vec<PathBuf>,
    pub max_call_depth: usize,
    /// Longest array `newarray` and `anewarray` will allocate; longer requests fault with
    /// `OutOfMemory`.
    pub max_array_length: usize,
    /// Log every dispatched instruction at `trace` level.
    pub trace_instructions: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            classpath: vec![PathBuf::from(".")],
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
            trace_instructions: false,
        }
    }
}

impl VmConfig {
    /// Defaults overridden by `KETTLE_CLASSPATH` (or else `CLASSPATH`), `KETTLE_MAX_CALL_DEPTH`,
    /// `KETTLE_MAX_ARRAY_LENGTH` and `KETTLE_TRACE`. Unparseable numbers are ignored.
    pub fn from_env() -> Self {
        VmConfig::from_vars(|key| env::var_os(key))
    }

    pub(crate) fn from_vars<F: Fn(&str) -> Option<OsString>>(var: F) -> Self {
        let mut config = VmConfig::default();
        if let Some(paths) = var("KETTLE_CLASSPATH").or_else(|| var("CLASSPATH")) {
            let classpath: Vec<PathBuf> = env::split_paths(&paths)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
            if !classpath.is_empty() {
                config.classpath = classpath;
            }
        }
        if let Some(depth) = var("KETTLE_MAX_CALL_DEPTH")
            .and_then(|v| v.into_string().ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            config.max_call_depth = depth;
        }
        if let Some(length) = var("KETTLE_MAX_ARRAY_LENGTH")
            .and_then(|v| v.into_string().ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            config.max_array_length = length;
        }
        if let Some(trace) = var("KETTLE_TRACE").and_then(|v| v.into_string().ok()) {
            config.trace_instructions = matches!(trace.trim(), "1" | "true" | "yes" | "on");
        }
        config
    }

    /// Replace the class path, as an explicit `--classpath` does.
    pub fn with_classpath(mut self, classpath: Vec<PathBuf>) -> Self {
        self.classpath = classpath;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_array_length(mut self, length: usize) -> Self {
        self.max_array_length = length;
        self
    }

    pub fn with_tracing(mut self, trace: bool) -> Self {
        self.trace_instructions = trace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> VmConfig {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(*v)))
            .collect();
        VmConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]);
        assert_eq!(config, VmConfig::default());
        assert_eq!(config.classpath, vec![PathBuf::from(".")]);
        assert_eq!(config.max_call_depth, 1024);
        assert_eq!(config.max_array_length, DEFAULT_MAX_ARRAY_LENGTH);
        assert!(!config.trace_instructions);
    }

    #[test]
    fn kettle_classpath_wins_over_classpath() {
        let config = config_from(&[("KETTLE_CLASSPATH", "first"), ("CLASSPATH", "second")]);
        assert_eq!(config.classpath, vec![PathBuf::from("first")]);

        let config = config_from(&[("CLASSPATH", "second")]);
        assert_eq!(config.classpath, vec![PathBuf::from("second")]);

        let explicit = config.with_classpath(vec![PathBuf::from("third")]);
        assert_eq!(explicit.classpath, vec![PathBuf::from("third")]);
    }

    #[test]
    fn depth_and_trace() {
        let config = config_from(&[("KETTLE_MAX_CALL_DEPTH", "16"), ("KETTLE_TRACE", "1")]);
        assert_eq!(config.max_call_depth, 16);
        assert!(config.trace_instructions);

        let config = config_from(&[("KETTLE_MAX_CALL_DEPTH", "lots")]);
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);

        let config = config_from(&[("KETTLE_MAX_ARRAY_LENGTH", " 64 ")]);
        assert_eq!(config.max_array_length, 64);
    }
}
