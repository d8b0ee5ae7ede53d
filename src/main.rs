//! Stackplan CLI entrypoint.
//!
//! This is the main entrypoint for the stackplan command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use stackplan::cache::{CacheBackend, StackCache};
use stackplan::cli::{Cli, Commands, OutputFormatter};
use stackplan::config::{
    CacheBackendKind, ConfigParser, ConfigValidator, PlannerConfig, find_config_file,
    parse_parameter_overrides,
};
use stackplan::error::{ConfigError, Result, StackPlanError};
use stackplan::planner::Planner;
use stackplan::schema::{EffectClassifier, ResourceSchemaProvider, SchemaRegistry};
use stackplan::stack::{CachedClient, LocalStackSource, OrchestrationClient};
use stackplan::template::{ParameterSet, load_template};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Plan {
            stack,
            template,
            parameters,
        } => cmd_plan(cli.config.as_ref(), &stack, &template, &parameters, &formatter).await,
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings),
        Commands::Schema { resource_type } => {
            cmd_schema(cli.config.as_ref(), &resource_type, &formatter)
        }
    }
}

/// Plan a stack update.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    stack_name: &str,
    template_path: &Path,
    parameters: &[String],
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let overrides = parse_parameter_overrides(parameters)?;
    let template = load_template(template_path)?;

    let registry = load_registry(&config)?;
    let classifier = EffectClassifier::new(Arc::new(registry))
        .with_init_replacement_types(config.planner.init_replacement_types.clone());

    let client = create_client(&config);
    let stack = client.fetch_stack(stack_name).await?;
    info!("Planning against live stack {} ({})", stack.name, stack.id);

    let planner = Planner::new(client, classifier).with_options(config.planner.to_options());
    let plan = planner
        .generate_plan(&stack, &template, &ParameterSet::from_strings(overrides))
        .await?;

    write_stdout(&formatter.format_plan(&plan)?)
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let result = ConfigValidator::new().validate(&config)?;

    // Schema files are part of the configuration surface
    let registry = load_registry(&config)?;

    eprintln!("Configuration is valid!");
    if show_warnings && !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &result.warnings {
            eprintln!("  - {warning}");
        }
    }

    eprintln!("\nConfiguration summary:");
    eprintln!("  Stacks: {}", config.stacks.path.display());
    eprintln!("  Region: {}", config.stacks.region);
    eprintln!("  Cache: {:?}", config.cache.backend);
    eprintln!("  Resource schemas: {}", registry.len());
    match config.planner.max_iterations {
        Some(max) => eprintln!("  Max iterations: {max}"),
        None => eprintln!("  Max iterations: derived per stack"),
    }

    Ok(())
}

/// Show the known update behaviour of a resource type.
fn cmd_schema(
    config_path: Option<&PathBuf>,
    resource_type: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = load_registry(&config)?;

    let schema = registry.lookup(resource_type)?.ok_or_else(|| {
        StackPlanError::Config(ConfigError::validation(
            format!("No schema registered for {resource_type}"),
            "resource_type",
        ))
    })?;

    write_stdout(&formatter.format_schema(schema)?)
}

fn write_stdout(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{output}")?;
    Ok(())
}

/// Loads configuration, falling back to defaults when no file is found.
fn load_config(config_path: Option<&PathBuf>) -> Result<PlannerConfig> {
    let config_file = match config_path {
        Some(path) => Some(path.clone()),
        None => match find_config_file(".") {
            Ok(path) => Some(path),
            Err(StackPlanError::Config(ConfigError::FileNotFound { .. })) => None,
            Err(e) => return Err(e),
        },
    };

    let config = if let Some(config_file) = config_file {
        debug!("Loading configuration from: {}", config_file.display());
        let parser = ConfigParser::new()
            .with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
        parser.load_dotenv()?;
        parser.load_with_env(&config_file)?
    } else {
        debug!("No configuration file found, using defaults");
        ConfigParser::new().load_dotenv()?;
        let mut config = PlannerConfig::default();
        ConfigParser::apply_env_overrides(&mut config)?;
        config
    };

    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

/// Builds the schema registry from the built-in table and configured files.
fn load_registry(config: &PlannerConfig) -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::builtin();
    for path in &config.schema.paths {
        let count = registry.load_file(path)?;
        debug!("Loaded {count} resource schemas from {}", path.display());
    }
    Ok(registry)
}

/// Creates the cached stack client.
fn create_client(config: &PlannerConfig) -> CachedClient<LocalStackSource> {
    let mut source = LocalStackSource::new(&config.stacks.path)
        .with_region(&config.stacks.region)
        .with_stack_types(config.planner.stack_types.clone());
    if let Some(account_id) = &config.stacks.account_id {
        source = source.with_account_id(account_id);
    }

    let backend = match (config.cache.backend, &config.cache.path) {
        (CacheBackendKind::File, Some(path)) => CacheBackend::File(path.clone()),
        _ => CacheBackend::Local,
    };
    let cache = StackCache::new(backend, config.cache.ttl.to_cache_ttl());

    CachedClient::new(source, Arc::new(cache)).with_lock_timeout(config.cache.lock_timeout())
}
