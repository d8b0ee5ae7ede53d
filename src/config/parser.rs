//! Configuration parser for loading and merging configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, StackPlanError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::{CacheBackendKind, PlannerConfig};

/// Configuration parser for loading planner configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// Relative paths inside the file are resolved against the file's
    /// directory, or the base path when one is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<PlannerConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(StackPlanError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StackPlanError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut config = self.parse_yaml(&content, Some(path))?;
        let base = self
            .base_path
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf));
        if let Some(base) = base {
            Self::resolve_paths(&mut config, &base);
        }
        Ok(config)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<PlannerConfig> {
        debug!("Parsing YAML configuration");

        // An empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(PlannerConfig::default());
        }

        let config: PlannerConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StackPlanError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration with {} global parameters",
            config.planner.global_parameters.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Environment variables are checked in the format:
    /// `STACKPLAN_<SECTION>_<KEY>` (e.g., `STACKPLAN_STACKS_REGION`)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an
    /// override holds an invalid value.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<PlannerConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    fn resolve_paths(config: &mut PlannerConfig, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut config.stacks.path);
        if let Some(path) = config.cache.path.as_mut() {
            resolve(path);
        }
        config.schema.paths.iter_mut().for_each(resolve);
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or enum override cannot be parsed.
    pub fn apply_env_overrides(config: &mut PlannerConfig) -> Result<()> {
        // Stack source overrides
        if let Ok(path) = std::env::var("STACKPLAN_STACKS_PATH") {
            debug!("Overriding stacks.path from environment");
            config.stacks.path = PathBuf::from(path);
        }

        if let Ok(region) = std::env::var("STACKPLAN_STACKS_REGION") {
            debug!("Overriding stacks.region from environment");
            config.stacks.region = region;
        }

        if let Ok(account_id) = std::env::var("STACKPLAN_STACKS_ACCOUNT_ID") {
            debug!("Overriding stacks.account_id from environment");
            config.stacks.account_id = Some(account_id);
        }

        // Cache overrides
        if let Ok(backend) = std::env::var("STACKPLAN_CACHE_BACKEND") {
            debug!("Overriding cache.backend from environment");
            config.cache.backend = match backend.to_lowercase().as_str() {
                "local" => CacheBackendKind::Local,
                "file" => CacheBackendKind::File,
                other => {
                    return Err(ConfigError::validation(
                        format!("Unknown cache backend '{other}'"),
                        "STACKPLAN_CACHE_BACKEND",
                    )
                    .into());
                }
            };
        }

        if let Ok(path) = std::env::var("STACKPLAN_CACHE_PATH") {
            debug!("Overriding cache.path from environment");
            config.cache.path = Some(PathBuf::from(path));
        }

        if let Ok(secs) = std::env::var("STACKPLAN_CACHE_LOCK_TIMEOUT_SECS") {
            debug!("Overriding cache.lock_timeout_secs from environment");
            config.cache.lock_timeout_secs = parse_env_number(&secs, "STACKPLAN_CACHE_LOCK_TIMEOUT_SECS")?;
        }

        // Planner overrides
        if let Ok(max) = std::env::var("STACKPLAN_PLANNER_MAX_ITERATIONS") {
            debug!("Overriding planner.max_iterations from environment");
            config.planner.max_iterations =
                Some(parse_env_number(&max, "STACKPLAN_PLANNER_MAX_ITERATIONS")?);
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StackPlanError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn parse_env_number<T: std::str::FromStr>(value: &str, var: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::validation(format!("'{value}' is not a valid number"), var).into()
    })
}

/// Parses `KEY=VALUE` parameter overrides.
///
/// # Errors
///
/// Returns an error if an entry has no `=` or an empty key.
pub fn parse_parameter_overrides<S: AsRef<str>>(specs: &[S]) -> Result<Vec<(String, String)>> {
    specs
        .iter()
        .map(|spec| {
            let spec = spec.as_ref();
            match spec.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_string(), value.to_string()))
                }
                _ => Err(StackPlanError::from(ConfigError::InvalidParameter {
                    spec: spec.to_string(),
                })),
            }
        })
        .collect()
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["stackplan.yaml", "stackplan.yml", "planner.yaml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StackPlanError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let parser = ConfigParser::new();
        let config = parser.parse_yaml("", None).expect("empty config");
        assert_eq!(config, PlannerConfig::default());

        let config = parser
            .parse_yaml("planner:\n  max_iterations: 4\n", None)
            .expect("partial config");
        assert_eq!(config.planner.max_iterations, Some(4));
        assert_eq!(config.cache.lock_timeout_secs, 10);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
planner:
  max_iterations: 6
  global_parameters:
    Environment: prod
  init_replacement_types:
    - "AWS::EC2::Instance"
  stack_types:
    - "AWS::CloudFormation::Stack"
    - "Custom::Stack"

cache:
  backend: file
  path: /var/cache/stackplan
  lock_timeout_secs: 30
  ttl:
    stack: 5
    account: 600

schema:
  paths:
    - /etc/stackplan/extra.yaml

stacks:
  path: /srv/stacks
  region: eu-west-1
  account_id: "123456789012"
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("config");

        assert_eq!(config.planner.global_parameters["Environment"], "prod");
        assert_eq!(config.planner.stack_types.len(), 2);
        assert_eq!(config.cache.backend, CacheBackendKind::File);
        assert_eq!(config.cache.ttl.stack, 5);
        assert_eq!(config.schema.paths.len(), 1);
        assert_eq!(config.stacks.account_id.as_deref(), Some("123456789012"));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ConfigParser::new()
            .parse_yaml("cache:\n  backend: s3\n", None)
            .expect_err("unknown backend");
        assert!(matches!(
            err,
            StackPlanError::Config(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_relative_paths_resolved() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("stackplan.yaml");
        std::fs::write(&path, "stacks:\n  path: snapshots\nschema:\n  paths: [extra.yaml]\n")
            .expect("write");

        let config = ConfigParser::new().load_file(&path).expect("load");
        assert_eq!(config.stacks.path, temp.path().join("snapshots"));
        assert_eq!(config.schema.paths[0], temp.path().join("extra.yaml"));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().expect("temp dir");
        std::fs::write(temp.path().join("planner.yaml"), "").expect("write");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");

        let found = find_config_file(&nested).expect("found");
        assert_eq!(found, temp.path().join("planner.yaml"));
    }

    #[test]
    fn test_parameter_overrides() {
        let parsed = parse_parameter_overrides(&["Env=prod", "Url=a=b"]).expect("parse");
        assert_eq!(parsed[0], (String::from("Env"), String::from("prod")));
        assert_eq!(parsed[1].1, "a=b");

        let err = parse_parameter_overrides(&["=x"]).expect_err("empty key");
        assert!(matches!(
            err,
            StackPlanError::Config(ConfigError::InvalidParameter { .. })
        ));
        assert!(parse_parameter_overrides(&["novalue"]).is_err());
    }
}
