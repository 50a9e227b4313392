//! Turn an example chat application into a reusable moon template.
//!
//! The source tree under `apps/<app>` is copied to `.moon/templates/<app>`,
//! then known literals are rewritten into template placeholders and the
//! template metadata files are written alongside.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use colored::Colorize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{CliError, CliResult};
use crate::substitute::Substitution;
use crate::template_config::{
    CHAINLIT_SYSTEM_PROMPT, CHAINLIT_WELCOME, REFLEX_SYSTEM_PROMPT, TemplateConfig,
};

/// Keeps Python identifiers valid until the final placeholder pass
pub const SLUG_PLACEHOLDER: &str = "__PROJECT_SLUG_PLACEHOLDER__";
pub const SLUG_TAG: &str = "{{ project_name | replace(from='-', to='_') }}";

const CHAINLIT_DESCRIPTION: &str = "Chainlit Chat with OpenAI Functions Streaming";
const REFLEX_DESCRIPTION: &str = "Reflex Chat Application";

const COMMON_ARTIFACTS: &[&str] = &[
    "__pycache__",
    "*.egg-info",
    ".venv",
    ".env",
    ".git",
    ".DS_Store",
];

const ENV_TEMPLATE: &str = "OPENAI_API_KEY={{ openai_api_key }}\n\
                            OPENAI_BASE_URL={{ openai_base_url }}\n\
                            OPENAI_MODEL={{ openai_model }}\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppType {
    #[value(name = "chainlit-chat")]
    Chainlit,
    #[value(name = "reflex-chat")]
    Reflex,
}

impl AppType {
    pub fn as_str(self) -> &'static str {
        match self {
            AppType::Chainlit => "chainlit-chat",
            AppType::Reflex => "reflex-chat",
        }
    }

    /// Python module name of the app (`chainlit_chat`, `reflex_chat`)
    pub fn module_name(self) -> String {
        self.as_str().replace('-', "_")
    }

    fn artifacts(self) -> Vec<&'static str> {
        let mut artifacts = COMMON_ARTIFACTS.to_vec();
        match self {
            AppType::Reflex => artifacts.extend([".web", ".states"]),
            AppType::Chainlit => artifacts.push(".chainlit"),
        }
        artifacts
    }

    /// Ordered literal to placeholder mappings applied to Python sources
    fn python_mappings(self) -> Vec<(String, String)> {
        let mut mappings = vec![
            (self.as_str().to_string(), "{{ project_name }}".to_string()),
            (self.module_name(), SLUG_PLACEHOLDER.to_string()),
            (
                CHAINLIT_SYSTEM_PROMPT.to_string(),
                "{{ system_prompt }}".to_string(),
            ),
            (
                REFLEX_SYSTEM_PROMPT.to_string(),
                "{{ system_prompt }}".to_string(),
            ),
        ];
        match self {
            AppType::Chainlit => {
                mappings.push((
                    CHAINLIT_DESCRIPTION.to_string(),
                    "{{ description }}".to_string(),
                ));
                mappings.push((
                    CHAINLIT_WELCOME.to_string(),
                    "{{ welcome_message }}".to_string(),
                ));
            }
            AppType::Reflex => {
                mappings.push((
                    REFLEX_DESCRIPTION.to_string(),
                    "{{ description }}".to_string(),
                ));
            }
        }
        mappings
    }

    fn description_literal(self) -> &'static str {
        match self {
            AppType::Chainlit => CHAINLIT_DESCRIPTION,
            AppType::Reflex => REFLEX_DESCRIPTION,
        }
    }
}

/// Generate the template for `app` inside `repo_root`, returning the target directory.
pub fn generate(repo_root: &Path, app: AppType) -> CliResult<PathBuf> {
    let source = repo_root.join("apps").join(app.as_str());
    let target = repo_root.join(".moon").join("templates").join(app.as_str());

    if !source.is_dir() {
        return Err(CliError::SourceNotFound { path: source });
    }

    let ignore = ignore_set(&app.artifacts())?;

    println!("Recreating {}...", target.display());
    if target.exists() {
        fs::remove_dir_all(&target).map_err(|e| CliError::io(&target, e))?;
    }
    copy_tree(&source, &target, &ignore)?;

    let pdf_package = repo_root.join("packages").join("pdf-context");
    if pdf_package.is_dir() {
        copy_tree(
            &pdf_package,
            &target.join("packages").join("pdf-context"),
            &ignore,
        )?;
        println!("{} Bundled pdf-context package", "✔".green());
    }

    println!("Applying parameterization pipeline...");
    parameterize_python(&target, &Substitution::new(app.python_mappings())?)?;
    replace_slug_placeholder(&target)?;

    parameterize_pyproject(&target, app)?;

    println!("Generating parameterized .env.template...");
    write_file(&target.join(".env.template"), ENV_TEMPLATE)?;

    match app {
        AppType::Chainlit => parameterize_chainlit(&target)?,
        AppType::Reflex => parameterize_reflex(&target)?,
    }

    println!("Generating template.yml...");
    let template_yml = TemplateConfig::for_app(app).to_yaml()?;
    write_file(&target.join("template.yml"), &template_yml)?;

    println!(
        "{}",
        format!("Template generation complete for {}!", app.as_str()).green()
    );
    Ok(target)
}

fn ignore_set(patterns: &[&str]) -> CliResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Recursively copy `source` into `target`, skipping entries whose base name
/// matches `ignore`. Ignored directories are not descended into.
pub fn copy_tree(source: &Path, target: &Path, ignore: &GlobSet) -> CliResult<()> {
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !ignore.is_match(entry.file_name()));

    for entry in walker {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let dest = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| CliError::io(&dest, e))?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| CliError::io(parent, e))?;
            }
            fs::copy(entry.path(), &dest).map_err(|e| CliError::io(&dest, e))?;
        }
    }
    Ok(())
}

fn parameterize_python(target: &Path, substitution: &Substitution) -> CliResult<()> {
    for entry in WalkDir::new(target) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "py") {
            continue;
        }

        let Some(code) = read_text(path)? else {
            warn!(path = %path.display(), "Skipping non-UTF-8 Python file");
            continue;
        };
        let rewritten = substitution.apply(&code);
        if rewritten != code {
            write_file(path, &rewritten)?;
        }
        println!(
            "{} Parameterization applied to {}",
            "✔".green(),
            entry.file_name().to_string_lossy()
        );
    }
    Ok(())
}

/// Swap the identifier placeholder for the real slug tag in every text file.
fn replace_slug_placeholder(target: &Path) -> CliResult<()> {
    for entry in WalkDir::new(target) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_some_and(|ext| ext == "so") {
            continue;
        }

        let Some(content) = read_text(path)? else {
            continue;
        };
        if content.contains(SLUG_PLACEHOLDER) {
            write_file(path, &content.replace(SLUG_PLACEHOLDER, SLUG_TAG))?;
            println!(
                "{} Placeholder {} replaced in {}",
                "✔".green(),
                SLUG_PLACEHOLDER,
                entry.file_name().to_string_lossy()
            );
        }
    }
    Ok(())
}

fn parameterize_pyproject(target: &Path, app: AppType) -> CliResult<()> {
    let path = target.join("pyproject.toml");
    if !path.is_file() {
        return Ok(());
    }

    let Some(content) = read_text(&path)? else {
        return Ok(());
    };
    let mut content = content
        .replace(&format!("\"{}\"", app.as_str()), "\"{{ project_name }}\"")
        .replace(
            "pdf-context = { workspace = true }",
            "pdf-context = { path = \"packages/pdf-context\" }",
        )
        .replace(
            &format!("\"{}\"", app.description_literal()),
            "\"{{ description }}\"",
        );
    content.push_str("\n[tool.uv]\npackage = true\n");

    write_file(&path, &content)?;
    println!("{} pyproject.toml parameterized", "✔".green());
    Ok(())
}

fn parameterize_chainlit(target: &Path) -> CliResult<()> {
    let path = target.join("chainlit.md");
    if !path.is_file() {
        return Ok(());
    }
    let Some(content) = read_text(&path)? else {
        return Ok(());
    };
    let content = content.replace(
        &format!("# {CHAINLIT_WELCOME}"),
        "# {{ welcome_message }}",
    );
    write_file(&path, &content)?;
    println!("{} chainlit.md parameterized", "✔".green());
    Ok(())
}

fn parameterize_reflex(target: &Path) -> CliResult<()> {
    let module = AppType::Reflex.module_name();

    let rxconfig = target.join("rxconfig.py");
    if rxconfig.is_file()
        && let Some(content) = read_text(&rxconfig)?
    {
        let content = content.replace(
            &format!("app_name=\"{module}\""),
            &format!("app_name=\"{SLUG_TAG}\""),
        );
        write_file(&rxconfig, &content)?;
        println!("{} rxconfig.py parameterized", "✔".green());
    }

    let package_dir = target.join(&module);
    if package_dir.is_dir() {
        let main_app = package_dir.join(format!("{module}.py"));
        if main_app.is_file() {
            let renamed = package_dir.join("[project_name | replace(from='-', to='_')].py");
            fs::rename(&main_app, &renamed).map_err(|e| CliError::io(&main_app, e))?;
        }

        let renamed_dir = target.join("[project_name | replace(from='-', to='_')]");
        fs::rename(&package_dir, &renamed_dir).map_err(|e| CliError::io(&package_dir, e))?;
        println!("{} Reflex package structure parameterized", "✔".green());
    }
    Ok(())
}

/// Read a file as UTF-8, returning `None` for binary or unreadable content.
fn read_text(path: &Path) -> CliResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if matches!(e.kind(), ErrorKind::InvalidData | ErrorKind::PermissionDenied) => {
            debug!(path = %path.display(), error = %e, "Skipping file");
            Ok(None)
        }
        Err(e) => Err(CliError::io(path, e)),
    }
}

fn write_file(path: &Path, content: &str) -> CliResult<()> {
    fs::write(path, content).map_err(|e| CliError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(root: &Path, relative: &str) -> String {
        fs::read_to_string(root.join(relative)).unwrap()
    }

    fn chainlit_repo() -> TempDir {
        let repo = TempDir::new().unwrap();
        let root = repo.path();
        write(
            root,
            "apps/chainlit-chat/app.py",
            "import chainlit_chat.utils\n\
             SYSTEM = \"You are a helpful assistant.\"\n\
             TITLE = \"Chainlit Chat with OpenAI Functions Streaming\"\n\
             WELCOME = \"Welcome to Chainlit! 🚀🤖\"\n\
             NAME = \"chainlit-chat\"\n",
        );
        write(
            root,
            "apps/chainlit-chat/pyproject.toml",
            "[project]\nname = \"chainlit-chat\"\n\
             description = \"Chainlit Chat with OpenAI Functions Streaming\"\n\
             dependencies = [\n    \"chainlit\",\n]\n\n\
             [tool.uv.sources]\npdf-context = { workspace = true }\n",
        );
        write(
            root,
            "apps/chainlit-chat/chainlit.md",
            "# Welcome to Chainlit! 🚀🤖\n\nHello.\n",
        );
        write(root, "apps/chainlit-chat/moon.yml", "tasks: {}\n");
        write(root, "apps/chainlit-chat/.env", "OPENAI_API_KEY=secret\n");
        write(root, "apps/chainlit-chat/.chainlit/config.toml", "x = 1\n");
        write(root, "apps/chainlit-chat/__pycache__/app.cpython-313.pyc", "");
        write(root, "apps/chainlit-chat/chainlit_chat.egg-info/PKG-INFO", "");
        write(root, "apps/chainlit-chat/.env.example", "OPENAI_MODEL=x\n");
        write(
            root,
            "packages/pdf-context/src/pdf_context/__init__.py",
            "def extract():\n    pass\n",
        );
        write(root, "packages/pdf-context/.venv/bin/python", "");
        repo
    }

    #[test]
    fn test_generate_chainlit_template() {
        let repo = chainlit_repo();
        let target = generate(repo.path(), AppType::Chainlit).unwrap();

        assert_eq!(target, repo.path().join(".moon/templates/chainlit-chat"));

        let app = read(&target, "app.py");
        assert_eq!(
            app,
            "import {{ project_name | replace(from='-', to='_') }}.utils\n\
             SYSTEM = \"{{ system_prompt }}\"\n\
             TITLE = \"{{ description }}\"\n\
             WELCOME = \"{{ welcome_message }}\"\n\
             NAME = \"{{ project_name }}\"\n"
        );

        let pyproject = read(&target, "pyproject.toml");
        assert!(pyproject.contains("name = \"{{ project_name }}\""));
        assert!(pyproject.contains("description = \"{{ description }}\""));
        assert!(pyproject.contains("pdf-context = { path = \"packages/pdf-context\" }"));
        assert!(pyproject.ends_with("\n[tool.uv]\npackage = true\n"));

        assert_eq!(
            read(&target, "chainlit.md"),
            "# {{ welcome_message }}\n\nHello.\n"
        );
        assert_eq!(read(&target, ".env.template"), ENV_TEMPLATE);
        assert!(read(&target, "template.yml").starts_with("title: Chainlit Chat\n"));
        assert_eq!(read(&target, "moon.yml"), "tasks: {}\n");
    }

    #[test]
    fn test_generate_skips_artifacts() {
        let repo = chainlit_repo();
        let target = generate(repo.path(), AppType::Chainlit).unwrap();

        assert!(!target.join(".env").exists());
        assert!(!target.join(".chainlit").exists());
        assert!(!target.join("__pycache__").exists());
        assert!(!target.join("chainlit_chat.egg-info").exists());
        // Only exact base names are ignored
        assert!(target.join(".env.example").exists());

        assert!(
            target
                .join("packages/pdf-context/src/pdf_context/__init__.py")
                .exists()
        );
        assert!(!target.join("packages/pdf-context/.venv").exists());
    }

    #[test]
    fn test_generate_replaces_previous_output() {
        let repo = chainlit_repo();
        let stale = repo.path().join(".moon/templates/chainlit-chat/stale.txt");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        generate(repo.path(), AppType::Chainlit).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn test_generate_missing_source() {
        let repo = TempDir::new().unwrap();
        let err = generate(repo.path(), AppType::Reflex).unwrap_err();
        assert!(matches!(err, CliError::SourceNotFound { .. }));
        assert!(!repo.path().join(".moon").exists());
    }

    #[test]
    fn test_generate_reflex_template() {
        let repo = TempDir::new().unwrap();
        let root = repo.path();
        write(
            root,
            "apps/reflex-chat/rxconfig.py",
            "import reflex as rx\nconfig = rx.Config(app_name=\"reflex_chat\")\n",
        );
        write(
            root,
            "apps/reflex-chat/reflex_chat/reflex_chat.py",
            "from reflex_chat.state import State\n\
             PROMPT = \"You are a friendly chatbot named Reflex. Respond in markdown.\"\n\
             TITLE = \"Reflex Chat Application\"\n",
        );
        write(
            root,
            "apps/reflex-chat/reflex_chat/state.py",
            "class State:\n    pass\n",
        );
        write(
            root,
            "apps/reflex-chat/pyproject.toml",
            "[project]\nname = \"reflex-chat\"\ndescription = \"Reflex Chat Application\"\n",
        );
        write(root, "apps/reflex-chat/.web/index.html", "<html></html>");
        write(root, "apps/reflex-chat/.states/state", "");

        let target = generate(root, AppType::Reflex).unwrap();

        let package = target.join("[project_name | replace(from='-', to='_')]");
        assert!(package.is_dir());
        assert!(!target.join("reflex_chat").exists());

        let main_app = fs::read_to_string(
            package.join("[project_name | replace(from='-', to='_')].py"),
        )
        .unwrap();
        assert_eq!(
            main_app,
            "from {{ project_name | replace(from='-', to='_') }}.state import State\n\
             PROMPT = \"{{ system_prompt }}\"\n\
             TITLE = \"{{ description }}\"\n"
        );
        assert!(package.join("state.py").exists());

        assert_eq!(
            read(&target, "rxconfig.py"),
            "import reflex as rx\n\
             config = rx.Config(app_name=\"{{ project_name | replace(from='-', to='_') }}\")\n"
        );
        assert!(!target.join(".web").exists());
        assert!(!target.join(".states").exists());

        let template = read(&target, "template.yml");
        assert!(template.starts_with("title: Reflex Chat\n"));
        assert!(!template.contains("welcome_message"));
    }

    #[test]
    fn test_placeholder_replaced_outside_python() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "moon.yml", "command: __PROJECT_SLUG_PLACEHOLDER__\n");
        fs::write(dir.path().join("blob.bin"), b"\xff\xfe\x00").unwrap();

        replace_slug_placeholder(dir.path()).unwrap();
        assert_eq!(read(dir.path(), "moon.yml"), format!("command: {SLUG_TAG}\n"));
        assert_eq!(fs::read(dir.path().join("blob.bin")).unwrap(), b"\xff\xfe\x00");
    }
}
