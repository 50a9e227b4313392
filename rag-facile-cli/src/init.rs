//! Initialize a new RAG Facile monorepo workspace.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use colored::Colorize;
use dialoguer::Confirm;
use globset::GlobSet;
use serde::Serialize;
use tracing::debug;

use crate::error::{CliError, CliResult};
use crate::generate::copy_tree;

pub const DEFAULT_PYTHON_VERSION: &str = "3.13";

/// Yes/no questions asked while initializing
pub trait Prompter {
    fn confirm(&mut self, prompt: &str, default: bool) -> CliResult<bool>;
}

/// Interactive terminal prompts
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, prompt: &str, default: bool) -> CliResult<bool> {
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub path: PathBuf,
    pub name: Option<String>,
    pub python_version: String,
    pub force: bool,
    /// Directory holding the templates bundled into new workspaces
    pub templates_source: Option<PathBuf>,
}

/// Convert a name into a valid Python package name.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .replace([' ', '_'], "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    // Collapse runs of hyphens and strip them from both ends
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "my-project".to_string()
    } else {
        slug
    }
}

#[derive(Serialize)]
struct WorkspaceConfig {
    projects: Vec<&'static str>,
    vcs: VcsConfig,
    telemetry: bool,
    generator: GeneratorConfig,
}

#[derive(Serialize)]
struct VcsConfig {
    manager: &'static str,
    #[serde(rename = "defaultBranch")]
    default_branch: &'static str,
}

#[derive(Serialize)]
struct GeneratorConfig {
    templates: Vec<&'static str>,
}

#[derive(Serialize)]
struct ToolchainConfig<'a> {
    #[serde(rename = "$schema")]
    schema: &'static str,
    python: PythonToolchain<'a>,
}

#[derive(Serialize)]
struct PythonToolchain<'a> {
    version: &'a str,
    #[serde(rename = "packageManager")]
    package_manager: &'static str,
}

fn workspace_yml() -> CliResult<String> {
    let config = WorkspaceConfig {
        projects: vec!["apps/*", "packages/*"],
        vcs: VcsConfig {
            manager: "git",
            default_branch: "main",
        },
        telemetry: false,
        generator: GeneratorConfig {
            templates: vec![".moon/templates"],
        },
    };
    Ok(serde_yaml::to_string(&config)?)
}

fn toolchain_yml(python_version: &str) -> CliResult<String> {
    let config = ToolchainConfig {
        schema: "https://moonrepo.dev/schemas/toolchain.json",
        python: PythonToolchain {
            version: python_version,
            package_manager: "uv",
        },
    };
    Ok(serde_yaml::to_string(&config)?)
}

fn pyproject_toml(project_name: &str, python_version: &str) -> String {
    format!(
        r#"[project]
name = "{project_name}"
version = "0.1.0"
description = "RAG application built with RAG Facile"
readme = "README.md"
requires-python = ">={python_version}, <3.14"
dependencies = []

[dependency-groups]
dev = [
    "ruff>=0.14.14",
    "pre-commit>=4.0.1",
]

[tool.uv.workspace]
members = ["apps/*", "packages/*"]
"#
    )
}

fn readme(project_name: &str) -> String {
    format!(
        r#"# {project_name}

A RAG application built with [RAG Facile](https://github.com/etalab-ia/rag-facile).

## Getting Started

### Prerequisites

- [moon](https://moonrepo.dev/docs/install) - Repository management
- [uv](https://docs.astral.sh/uv/getting-started/installation/) - Python package manager

### Setup

1. Install dependencies:
   ```bash
   uv sync
   ```

2. Generate a chat application:
   ```bash
   moon generate chainlit-chat ./apps
   # or
   moon generate reflex-chat ./apps
   ```

3. Run your application (after generating):
   ```bash
   cd apps/<your-app-name>
   uv run chainlit run app.py  # for chainlit
   # or
   uv run reflex run  # for reflex
   ```

## Project Structure

```
{project_name}/
├── .moon/
│   ├── templates/       # Moon templates for generating apps
│   ├── toolchain.yml    # Python/tooling configuration
│   └── workspace.yml    # Workspace configuration
├── apps/                # Application projects
├── packages/            # Shared packages
└── pyproject.toml       # Root project configuration
```

## Available Templates

- **chainlit-chat**: A Chainlit-based chat application with OpenAI integration
- **reflex-chat**: A Reflex-based chat application

## License

MIT
"#
    )
}

const GITIGNORE: &str = "# Python
__pycache__/
*.py[cod]
*$py.class
*.so
.Python
*.egg-info/
*.egg
.eggs/

# Virtual environments
.venv/
venv/
ENV/

# Environment variables
.env
.env.local

# IDEs
.idea/
.vscode/
*.swp
*.swo

# OS
.DS_Store
Thumbs.db

# Moon
.moon/cache/

# Reflex
.web/
.states/

# Chainlit
.chainlit/
.files/

# Build artifacts
dist/
build/

# Testing
.pytest_cache/
.coverage
htmlcov/

# Logs
*.log
";

const RUFF_TOML: &str = r#"line-length = 88
target-version = "py313"

[lint]
select = ["E", "F", "I", "UP"]
ignore = []

[format]
quote-style = "double"
"#;

/// Resolve the directory being initialized without requiring it to exist.
fn resolve_target(path: &Path) -> CliResult<PathBuf> {
    if path.exists() {
        path.canonicalize().map_err(|e| CliError::io(path, e))
    } else {
        std::path::absolute(path).map_err(|e| CliError::io(path, e))
    }
}

/// Initialize a workspace according to `options`, returning the project name.
pub fn init(options: &InitOptions, prompter: &mut dyn Prompter) -> CliResult<String> {
    let display_path = std::path::absolute(&options.path)
        .map_err(|e| CliError::io(&options.path, e))?;
    let target = resolve_target(&options.path)?;

    let raw_name = options
        .name
        .clone()
        .or_else(|| {
            target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_default();
    let project_name = slugify(&raw_name);

    if !target.exists() {
        fs::create_dir_all(&target).map_err(|e| CliError::io(&target, e))?;
        println!("Created directory: {}", display_path.display());
    } else if !options.force && !is_empty_dir(&target)? {
        let prompt = format!(
            "Directory {} is not empty. Continue anyway?",
            display_path.display()
        );
        if !prompter.confirm(&prompt, false)? {
            return Err(CliError::Aborted);
        }
    }

    println!(
        "\n{}",
        format!("Initializing RAG Facile project: {project_name}")
            .blue()
            .bold()
    );
    if raw_name != project_name {
        println!("  {}", format!("(slugified from \"{raw_name}\")").dimmed());
    }
    println!();

    for dir in [".moon/templates", "apps", "packages"] {
        let dir_path = target.join(dir);
        fs::create_dir_all(&dir_path).map_err(|e| CliError::io(&dir_path, e))?;
        println!("  {} {dir}/", "Created:".dimmed());
    }

    let files = [
        (".moon/workspace.yml", workspace_yml()?),
        (".moon/toolchain.yml", toolchain_yml(&options.python_version)?),
        (
            "pyproject.toml",
            pyproject_toml(&project_name, &options.python_version),
        ),
        ("README.md", readme(&project_name)),
        (".gitignore", GITIGNORE.to_string()),
        ("ruff.toml", RUFF_TOML.to_string()),
    ];

    for (relative, content) in files {
        let full_path = target.join(relative);
        if full_path.exists()
            && !options.force
            && !prompter.confirm(&format!("Overwrite {relative}?"), false)?
        {
            println!("  {} {relative}", "Skipped:".yellow());
            continue;
        }
        fs::write(&full_path, content).map_err(|e| CliError::io(&full_path, e))?;
        println!("  {} {relative}", "Created:".green());
    }

    copy_templates(options, &target, prompter)?;
    init_git(&target);

    println!(
        "\n{} Project initialized at {}\n",
        "Success!".green().bold(),
        display_path.display()
    );
    println!("{}", "Next steps:".bold());
    println!("  1. cd {}", cd_hint(&display_path));
    println!("  2. uv sync");
    println!("  3. moon generate chainlit-chat ./apps");
    println!("     # or: moon generate reflex-chat ./apps");
    println!();

    Ok(project_name)
}

fn is_empty_dir(path: &Path) -> CliResult<bool> {
    let mut entries = fs::read_dir(path).map_err(|e| CliError::io(path, e))?;
    Ok(entries.next().is_none())
}

fn copy_templates(
    options: &InitOptions,
    target: &Path,
    prompter: &mut dyn Prompter,
) -> CliResult<()> {
    let templates_target = target.join(".moon").join("templates");

    let source = options
        .templates_source
        .as_deref()
        .filter(|source| source.is_dir());
    let Some(source) = source else {
        println!(
            "\n{} Could not find templates source. Templates will need to be added manually.",
            "Warning:".yellow()
        );
        return Ok(());
    };

    // Initializing the repository that ships the templates
    if let (Ok(a), Ok(b)) = (source.canonicalize(), templates_target.canonicalize())
        && a == b
    {
        debug!(source = %source.display(), "Templates source is the target, skipping copy");
        return Ok(());
    }

    let mut template_dirs: Vec<PathBuf> = fs::read_dir(source)
        .map_err(|e| CliError::io(source, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    template_dirs.sort();

    for template_dir in template_dirs {
        let Some(name) = template_dir.file_name() else {
            continue;
        };
        let name = name.to_string_lossy();
        let dest = templates_target.join(name.as_ref());

        if dest.exists() {
            let overwrite =
                options.force || prompter.confirm(&format!("Overwrite template {name}?"), true)?;
            if !overwrite {
                println!("  {} template {name}", "Skipped:".yellow());
                continue;
            }
            fs::remove_dir_all(&dest).map_err(|e| CliError::io(&dest, e))?;
        }

        copy_tree(&template_dir, &dest, &GlobSet::empty())?;
        println!("  {} template {name}", "Copied:".green());
    }
    Ok(())
}

fn init_git(target: &Path) {
    if target.join(".git").exists() {
        return;
    }

    match Command::new("git").arg("init").current_dir(target).output() {
        Ok(output) if output.status.success() => {
            println!("  {} git repository", "Initialized:".green());
        }
        Ok(output) => {
            debug!(stderr = %String::from_utf8_lossy(&output.stderr), "git init failed");
            println!(
                "  {} Could not initialize git repository",
                "Warning:".yellow()
            );
        }
        Err(e) => {
            debug!(error = %e, "git not available");
            println!(
                "  {} Could not initialize git repository",
                "Warning:".yellow()
            );
        }
    }
}

/// Path to suggest in the `cd` hint: relative to the working directory when possible.
fn cd_hint(display_path: &Path) -> String {
    let Ok(cwd) = std::env::current_dir() else {
        return display_path.display().to_string();
    };
    match display_path.strip_prefix(&cwd) {
        Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
        Ok(relative) => relative.display().to_string(),
        Err(_) => display_path.display().to_string(),
    }
}
