//! Invocation options read from `FNRUN_*` environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use fnrun_types::DebugContext;

/// Event file; the event is read from stdin when unset.
pub const FNRUN_EVENT: &str = "FNRUN_EVENT";
pub const FNRUN_DEBUG_PORT: &str = "FNRUN_DEBUG_PORT";
pub const FNRUN_DEBUG_ARGS: &str = "FNRUN_DEBUG_ARGS";
pub const FNRUN_INSTALL: &str = "FNRUN_INSTALL";
/// JSON file of per-function environment overrides.
pub const FNRUN_ENV_VARS: &str = "FNRUN_ENV_VARS";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RequestEnv {
    pub event_file: Option<PathBuf>,
    pub debug: Option<DebugContext>,
    pub install: bool,
    pub env_vars_file: Option<PathBuf>,
}

impl RequestEnv {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let debug_args = non_empty(FNRUN_DEBUG_ARGS).unwrap_or_default();
        let debug = match non_empty(FNRUN_DEBUG_PORT) {
            Some(port) => {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("{FNRUN_DEBUG_PORT} must be a port number"))?;
                Some(DebugContext::new(port, debug_args))
            }
            None => {
                if !debug_args.is_empty() {
                    tracing::warn!(
                        env_var = FNRUN_DEBUG_ARGS,
                        "Debug arguments ignored without {FNRUN_DEBUG_PORT}"
                    );
                }
                None
            }
        };

        Ok(Self {
            event_file: non_empty(FNRUN_EVENT).map(PathBuf::from),
            debug,
            install: non_empty(FNRUN_INSTALL).is_some_and(|raw| is_truthy(&raw)),
            env_vars_file: non_empty(FNRUN_ENV_VARS).map(PathBuf::from),
        })
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use fnrun_types::DebugContext;

    use super::{RequestEnv, is_truthy};

    fn parse(vars: &[(&str, &str)]) -> anyhow::Result<RequestEnv> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RequestEnv::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_is_a_plain_run() {
        assert_eq!(parse(&[]).unwrap(), RequestEnv::default());
    }

    #[test]
    fn debug_port_and_args() {
        let request = parse(&[
            ("FNRUN_DEBUG_PORT", "5858"),
            ("FNRUN_DEBUG_ARGS", "--inspect --nolazy"),
        ])
        .unwrap();
        assert_eq!(
            request.debug,
            Some(DebugContext::new(5858, "--inspect --nolazy"))
        );
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(parse(&[("FNRUN_DEBUG_PORT", "not-a-port")]).is_err());
        assert!(parse(&[("FNRUN_DEBUG_PORT", "70000")]).is_err());
    }

    #[test]
    fn debug_args_without_port_are_ignored() {
        let request = parse(&[("FNRUN_DEBUG_ARGS", "--inspect")]).unwrap();
        assert_eq!(request.debug, None);
    }

    #[test]
    fn files_and_install_flag() {
        let request = parse(&[
            ("FNRUN_EVENT", "events/put.json"),
            ("FNRUN_ENV_VARS", "env.json"),
            ("FNRUN_INSTALL", "yes"),
        ])
        .unwrap();
        assert_eq!(request.event_file, Some(PathBuf::from("events/put.json")));
        assert_eq!(request.env_vars_file, Some(PathBuf::from("env.json")));
        assert!(request.install);
    }

    #[test]
    fn truthy_values() {
        for raw in ["1", "true", "TRUE", " yes "] {
            assert!(is_truthy(raw), "{raw} should be truthy");
        }
        for raw in ["0", "false", "no", "on"] {
            assert!(!is_truthy(raw), "{raw} should be falsy");
        }
    }
}
