//! tfdiagram CLI entry point.
//!
//! This binary provides the command-line interface for tfdiagram.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tfdiagram::cli::{Cli, Commands, ConvertArgs, InitArgs, ValidateArgs};
use tfdiagram::diagram::{export_diagram, ComponentRegistry};
use tfdiagram::report::TextReporter;
use tfdiagram::{Config, Converter, MappingConfig, TfDiagramError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("Error: {e}");

            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            let code = e
                .downcast_ref::<TfDiagramError>()
                .map_or(1, TfDiagramError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // RUST_LOG wins over the verbose flag
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            EnvFilter::new(format!("warn,tfdiagram={base_level}"))
        })
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(&cli)?;
    tracing::debug!("Configuration loaded successfully");

    match cli.command {
        Commands::Convert(args) => {
            config.merge_cli_args(&args);
            convert(config, &args).await
        }

        Commands::Deps(args) => {
            let converter = converter(config.clone(), None)?;
            let resolved = converter.resolve(&args.root)?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&resolved.tree())?);
            } else {
                print!("{}", TextReporter::new(&config).module_tree(&resolved));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Resources(args) => {
            let converter = converter(config.clone(), args.mapping.as_deref())?;
            let (_, resources, _) = converter.extract(&args.root).await?;

            print!(
                "{}",
                TextReporter::new(&config).resources_table(&resources, converter.policy())
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Init(args) => init(&args),

        Commands::Validate(args) => validate(&args),
    }
}

async fn convert(config: Config, args: &ConvertArgs) -> anyhow::Result<ExitCode> {
    let pretty = config.output.pretty;
    let reporter = TextReporter::new(&config);
    let converter = converter(config, args.mapping.as_deref())?;

    let mut result = converter.convert_file(&args.root).await?;
    if let Some(name) = &args.name {
        result.diagram.set_name(name.as_str());
    }

    let rendered = export_diagram(&result.diagram, args.format, pretty)?;
    if let Some(output_path) = &args.output {
        std::fs::write(output_path, &rendered)?;
        tracing::info!(path = %output_path.display(), "Diagram written");
    } else {
        println!("{rendered}");
    }

    if args.summary {
        eprint!("{}", reporter.conversion_summary(&result));
    }

    Ok(ExitCode::SUCCESS)
}

fn converter(config: Config, mapping: Option<&Path>) -> anyhow::Result<Converter> {
    let document = match mapping {
        Some(path) => MappingConfig::load(path)?,
        None => MappingConfig::default_policy(),
    };
    Ok(Converter::new(config, document.compile(), ComponentRegistry::shared()))
}

fn init(args: &InitArgs) -> anyhow::Result<ExitCode> {
    let target = args.target();
    if target.exists() && !args.force {
        anyhow::bail!(
            "File already exists: {} (use --force to overwrite)",
            target.display()
        );
    }

    let content = if args.settings {
        Config::example_yaml()
    } else {
        MappingConfig::example_yaml()
    };
    std::fs::write(&target, content)?;
    println!("Created {}", target.display());
    Ok(ExitCode::SUCCESS)
}

fn validate(args: &ValidateArgs) -> anyhow::Result<ExitCode> {
    let document = match MappingConfig::load(&args.policy) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Policy error: {e}");
            return Ok(ExitCode::from(1));
        }
    };

    let policy = document.compile();
    let ignored: Vec<_> = document
        .resource_mappings
        .iter()
        .filter(|m| {
            policy
                .mapping_for(&m.source_kind)
                .is_none_or(|compiled| compiled.component_kind.as_str() != m.component_kind)
        })
        .collect();

    if ignored.is_empty() {
        println!(
            "Policy is valid: {} ({} mappings)",
            args.policy.display(),
            policy.len()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        for mapping in ignored {
            eprintln!(
                "Ignored mapping: {} -> {}",
                mapping.source_kind, mapping.component_kind
            );
        }
        Ok(ExitCode::from(1))
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if let Some(config_path) = &cli.config {
        tracing::debug!(path = %config_path.display(), "Loading configuration from explicit path");
        return Ok(Config::load(config_path)?);
    }

    let default_paths = ["tfdiagram.yaml", "tfdiagram.yml", ".tfdiagram.yaml"];
    for path in &default_paths {
        let path = Path::new(path);
        if path.exists() {
            tracing::debug!(path = %path.display(), "Found configuration file");
            return Ok(Config::load(path)?);
        }
    }

    tracing::debug!("No configuration file found, using default configuration");
    Ok(Config::default())
}
