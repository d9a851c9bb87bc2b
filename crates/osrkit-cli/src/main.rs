//! Command-line interface for inspecting and probing the plugin chain.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use osrkit_core::config::env_vars;
use osrkit_core::{elf, LoaderConfig, NameRedirector, PathResolver, PluginSession};

/// osrkit - locate, prime and probe the offline super-resolution plugin.
#[derive(Parser, Debug)]
#[command(name = "osrkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Loader configuration file (TOML).
    #[arg(short, long, global = true, env = env_vars::CONFIG)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Show the redirected name and every candidate location for a library.
    Candidates {
        /// Library name as requested.
        name: String,
        /// Use the application search paths instead of the system ones.
        #[arg(long)]
        app: bool,
    },
    /// Print the effective configuration.
    Config,
    /// List the DT_NEEDED dependencies of a shared object.
    Needed {
        /// Path to the shared object.
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Load the plugin chain, report what was acquired, then unload.
    Probe {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("osrkit_core={}", default_level)));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<LoaderConfig> {
    let config = match path {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => LoaderConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    tracing::debug!(
        "Using primary library {} with {} system and {} app search paths",
        config.primary_library,
        config.system_paths.len(),
        config.app_paths.len()
    );
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Candidates { name, app } => {
            let redirector = NameRedirector::builtin().with_entries(&config.extra_redirects);
            let resolved = redirector.redirect(&name);
            let paths = if app { &config.app_paths } else { &config.system_paths };
            if resolved != name {
                println!("{} -> {}", name, resolved);
            }
            for candidate in PathResolver::resolve(resolved, paths) {
                println!("{}", candidate);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Needed { path } => {
            let needed = elf::read_needed(&path)
                .with_context(|| format!("Failed to inspect {}", path.display()))?;
            let unprimed = elf::unprimed_dependencies(&needed, &config);
            for name in &needed {
                if unprimed.contains(name) {
                    println!("{}", name);
                } else {
                    println!("{} (primed)", name);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Probe { json } => probe(config, json),
    }
}

fn probe(config: LoaderConfig, json: bool) -> Result<ExitCode> {
    let mut session = PluginSession::new(config);
    let outcome = session.load();

    let report = session.load_report().clone();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for identity in &report.primed {
            println!("primed   {}", identity);
        }
        for name in &report.primed_misses {
            println!("missing  {}", name);
        }
        if let Some(primary) = &report.primary {
            println!("primary  {}", primary);
        }
        for symbol in &report.symbols {
            let mark = if symbol.present { "ok" } else { "absent" };
            println!("symbol   {} [{}]", symbol.name, mark);
        }
    }

    let code = match outcome {
        Ok(()) => {
            if !json {
                if let Ok(Some(dir)) = session.assets_dir() {
                    println!("assets   {}", dir);
                }
                println!("state    {}", session.state());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if !json {
                println!("state    {}", session.state());
            }
            eprintln!("Load failed: {}", e);
            ExitCode::FAILURE
        }
    };

    session.unload();
    Ok(code)
}
