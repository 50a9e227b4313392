//! `rag-facile` command line: template generation and workspace setup.

mod error;
mod generate;
mod init;
mod substitute;
mod template_config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::error::{CliResult, format_error_chain};
use crate::generate::AppType;
use crate::init::{DEFAULT_PYTHON_VERSION, InitOptions, TerminalPrompter};

#[derive(Parser)]
#[command(name = "rag-facile", about = "RAG Facile project tooling", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Say hello
    Hello {
        name: String,
    },

    /// Print the CLI version
    Version,

    /// Generate a moon template from one of the example chat apps
    Generate {
        /// The application template to generate
        #[arg(long = "app", value_enum)]
        app: AppType,

        /// Root of the rag-facile repository
        #[arg(long, env = "RAG_FACILE_REPO_ROOT", default_value = ".")]
        repo_root: PathBuf,
    },

    /// Initialize a new RAG Facile monorepo workspace
    Init {
        /// Directory to initialize the project in
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Project name (defaults to directory name)
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Python version to use (e.g., 3.13, 3.14)
        #[arg(long = "python", short = 'p', default_value = DEFAULT_PYTHON_VERSION)]
        python_version: String,

        /// Overwrite existing files without prompting
        #[arg(long, short = 'f')]
        force: bool,

        /// rag-facile repository providing the bundled templates
        #[arg(long, env = "RAG_FACILE_REPO_ROOT")]
        repo_root: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), format_error_chain(&e).red());
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> CliResult<()> {
    match command {
        Commands::Hello { name } => println!("Hello {name}"),
        Commands::Version => println!("rag-facile v{}", env!("CARGO_PKG_VERSION")),
        Commands::Generate { app, repo_root } => {
            tracing::debug!(app = app.as_str(), repo_root = %repo_root.display(), "Generating template");
            generate::generate(&repo_root, app)?;
        }
        Commands::Init {
            path,
            name,
            python_version,
            force,
            repo_root,
        } => {
            let options = InitOptions {
                path,
                name,
                python_version,
                force,
                templates_source: repo_root.map(|root| root.join(".moon").join("templates")),
            };
            init::init(&options, &mut TerminalPrompter)?;
        }
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    // Progress goes to stdout, logs to stderr
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rag_facile_cli=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
