//! Configuration management for imageplan
//!
//! Settings are loaded from environment variables with defaults; command line
//! flags override them.
//!
//! # Environment Variables
//!
//! - `IMAGEPLAN_LOG_LEVEL`: Logging level - default: "info"
//! - `IMAGEPLAN_LOG_JSON`: JSON log output (true|false) - default: "false"
//! - `IMAGEPLAN_ROOTFS_DIR`: Directory holding per-build root filesystems -
//!   default: user cache dir (or system temp dir) + "imageplan/rootfs"
//! - `IMAGEPLAN_COMMAND_TIMEOUT`: Per-command timeout in seconds, 0 disables - default: "0"
//! - `IMAGEPLAN_SHELL`: Shell for shell-form RUN/ENTRYPOINT - default: "/bin/sh"
//!
//! # Example
//!
//! ```no_run
//! use imageplan::ImageplanConfig;
//!
//! let config = ImageplanConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("{}", config.rootfs_for("build-1").display());
//! ```

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SHELL: &str = "/bin/sh";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 0;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Runtime configuration for builds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageplanConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit logs as JSON
    pub log_json: bool,

    /// Parent directory of per-build root filesystems
    pub rootfs_dir: PathBuf,

    /// Per-command timeout in seconds, 0 for none
    pub command_timeout_secs: u64,

    /// Shell wrapping shell-form commands
    pub shell: String,
}

impl Default for ImageplanConfig {
    /// Loads IMAGEPLAN_* environment variables, falling back to defaults
    fn default() -> Self {
        let log_level = env::var("IMAGEPLAN_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        let log_json = env::var("IMAGEPLAN_LOG_JSON")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let rootfs_dir = env::var("IMAGEPLAN_ROOTFS_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_rootfs_dir);

        let command_timeout_secs = env::var("IMAGEPLAN_COMMAND_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);

        let shell = env::var("IMAGEPLAN_SHELL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SHELL.to_string());

        Self {
            log_level,
            log_json,
            rootfs_dir,
            command_timeout_secs,
            shell,
        }
    }
}

fn default_rootfs_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("imageplan")
        .join("rootfs")
}

impl ImageplanConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unknown log level or an empty shell
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if self.shell.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Shell cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        match self.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Fresh root filesystem location for a build
    pub fn rootfs_for(&self, build_id: &str) -> PathBuf {
        self.rootfs_dir.join(build_id)
    }
}

impl fmt::Display for ImageplanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Imageplan Configuration:")?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  Log JSON: {}", self.log_json)?;
        writeln!(f, "  Rootfs Dir: {}", self.rootfs_dir.display())?;
        match self.command_timeout() {
            Some(timeout) => writeln!(f, "  Command Timeout: {}s", timeout.as_secs())?,
            None => writeln!(f, "  Command Timeout: none")?,
        }
        writeln!(f, "  Shell: {}", self.shell)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn sample() -> ImageplanConfig {
        ImageplanConfig {
            log_level: "info".to_string(),
            log_json: false,
            rootfs_dir: PathBuf::from("/tmp/imageplan"),
            command_timeout_secs: 0,
            shell: "/bin/sh".to_string(),
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::unset("IMAGEPLAN_LOG_LEVEL"),
            EnvGuard::unset("IMAGEPLAN_LOG_JSON"),
            EnvGuard::unset("IMAGEPLAN_ROOTFS_DIR"),
            EnvGuard::unset("IMAGEPLAN_COMMAND_TIMEOUT"),
            EnvGuard::unset("IMAGEPLAN_SHELL"),
        ];

        let config = ImageplanConfig::default();

        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(!config.log_json);
        assert!(config.rootfs_dir.ends_with("imageplan/rootfs"));
        assert_eq!(config.command_timeout(), None);
        assert_eq!(config.shell, DEFAULT_SHELL);
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("IMAGEPLAN_LOG_LEVEL", "DEBUG"),
            EnvGuard::set("IMAGEPLAN_LOG_JSON", "true"),
            EnvGuard::set("IMAGEPLAN_ROOTFS_DIR", "/var/lib/imageplan"),
            EnvGuard::set("IMAGEPLAN_COMMAND_TIMEOUT", "90"),
            EnvGuard::set("IMAGEPLAN_SHELL", "/bin/bash"),
        ];

        let config = ImageplanConfig::default();

        assert_eq!(config.log_level, "debug");
        assert!(config.log_json);
        assert_eq!(config.rootfs_dir, PathBuf::from("/var/lib/imageplan"));
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.shell, "/bin/bash");
    }

    #[test]
    #[serial]
    fn test_unparseable_timeout_falls_back() {
        let _guard = EnvGuard::set("IMAGEPLAN_COMMAND_TIMEOUT", "soon");
        let config = ImageplanConfig::default();
        assert_eq!(config.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS);
    }

    #[test]
    fn test_validation() {
        assert!(sample().validate().is_ok());

        let mut config = sample();
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.shell = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rootfs_for() {
        assert_eq!(
            sample().rootfs_for("abc"),
            PathBuf::from("/tmp/imageplan/abc")
        );
    }

    #[test]
    fn test_config_display() {
        let display = sample().to_string();
        assert!(display.contains("Imageplan Configuration:"));
        assert!(display.contains("Command Timeout: none"));
    }
}
