//! Language toolchain registry
//!
//! Maps a language identifier to the pipeline of build/run steps that
//! executes it. The table is loaded from TOML once and is read-only after.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::harness::HarnessTemplate;

/// Placeholder replaced with the workspace path inside command arguments
pub const WORKSPACE_PLACEHOLDER: &str = "{workspace}";

const BUILTIN_LANGUAGES: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));

/// A fixed argument vector; the only substitution is the workspace path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn parse(command: &str) -> anyhow::Result<Self> {
        let args: Vec<String> = command.split_whitespace().map(|s| s.to_string()).collect();
        if args.is_empty() {
            bail!("Empty command");
        }
        Ok(Self { args })
    }

    /// Program name as written in the template
    pub fn program(&self) -> &str {
        &self.args[0]
    }

    /// Render into a concrete argument vector for the given workspace
    pub fn render(&self, workspace: &Path) -> Vec<String> {
        let dir = workspace.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(WORKSPACE_PLACEHOLDER, &dir))
            .collect()
    }
}

/// How a language gets from source file to running program
#[derive(Debug, Clone)]
pub enum Pipeline {
    /// Interpreter invoked on the source file
    Direct { run: CommandTemplate },
    /// Build steps must all exit zero before the run step starts
    CompileThenRun {
        build: Vec<CommandTemplate>,
        run: CommandTemplate,
    },
}

impl Pipeline {
    pub fn build_steps(&self) -> &[CommandTemplate] {
        match self {
            Pipeline::Direct { .. } => &[],
            Pipeline::CompileThenRun { build, .. } => build,
        }
    }

    pub fn run_step(&self) -> &CommandTemplate {
        match self {
            Pipeline::Direct { run } | Pipeline::CompileThenRun { run, .. } => run,
        }
    }
}

/// Everything needed to execute one language
#[derive(Debug, Clone)]
pub struct ToolchainSpec {
    /// Canonical language id (e.g., "python")
    pub language_id: String,
    /// File name the toolchain requires (e.g., "Solution.java")
    pub source_file: String,
    pub pipeline: Pipeline,
    /// Glue for harnessed execution, if the language supports it
    pub harness: Option<HarnessTemplate>,
    /// Extra environment variables (KEY=VALUE) for every step
    pub env: Vec<(String, String)>,
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLanguageConfig {
    source_file: String,
    #[serde(default)]
    build_commands: Vec<String>,
    run_command: String,
    #[serde(default)]
    aliases: Vec<String>,
    /// Name of a built-in harness template
    harness: Option<String>,
    /// Inline harness template
    harness_template: Option<String>,
    #[serde(default)]
    env: Vec<String>,
}

/// Read-only table of supported toolchains
#[derive(Debug, Clone)]
pub struct ToolchainRegistry {
    toolchains: HashMap<String, ToolchainSpec>,
    /// Lowercased id or alias -> canonical id
    names: HashMap<String, String>,
}

impl ToolchainRegistry {
    /// Registry built from the bundled `files/languages.toml`
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(BUILTIN_LANGUAGES).context("Invalid built-in language table")
    }

    /// Load from a TOML file on disk
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read language config {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid language config {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let raw_configs: HashMap<String, RawLanguageConfig> = toml::from_str(content)?;

        let mut toolchains = HashMap::new();
        let mut names = HashMap::new();

        for (name, raw) in raw_configs {
            let id = name.to_lowercase();
            let spec = build_spec(&id, raw.source_file, raw.build_commands, &raw.run_command)
                .with_context(|| format!("Language {}", name))?;

            let harness = match (raw.harness, raw.harness_template) {
                (Some(_), Some(_)) => {
                    bail!("Language {} sets both harness and harness_template", name)
                }
                (Some(builtin), None) => Some(
                    HarnessTemplate::builtin(&builtin)
                        .with_context(|| format!("Language {}", name))?,
                ),
                (None, Some(template)) => Some(
                    HarnessTemplate::new(template)
                        .with_context(|| format!("Language {}", name))?,
                ),
                (None, None) => None,
            };

            let env = raw
                .env
                .iter()
                .map(|pair| match pair.split_once('=') {
                    Some((key, value)) if !key.is_empty() => {
                        Ok((key.to_string(), value.to_string()))
                    }
                    _ => bail!("Invalid env entry for {}: {:?}", name, pair),
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let all_names = std::iter::once(id.clone())
                .chain(raw.aliases.iter().map(|a| a.to_lowercase()));
            for alias in all_names {
                if let Some(existing) = names.insert(alias.clone(), id.clone()) {
                    bail!(
                        "Language name {:?} is claimed by both {} and {}",
                        alias,
                        existing,
                        id
                    );
                }
            }

            toolchains.insert(
                id.clone(),
                ToolchainSpec {
                    harness,
                    env,
                    ..spec
                },
            );
        }

        Ok(Self { toolchains, names })
    }

    /// Look up a toolchain by id or alias (case-insensitive)
    pub fn resolve(&self, language: &str) -> Option<&ToolchainSpec> {
        let id = self.names.get(&language.trim().to_lowercase())?;
        self.toolchains.get(id)
    }

    /// Canonical ids of all supported languages, sorted
    pub fn supported_languages(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.toolchains.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Languages whose step programs cannot be found on `search_path`.
    ///
    /// Programs referring to the workspace are build artifacts and skipped.
    pub fn missing_binaries(&self, search_path: &str) -> Vec<(String, String)> {
        let cwd = std::env::temp_dir();
        let mut missing = Vec::new();
        for id in self.supported_languages() {
            let spec = &self.toolchains[&id];
            let steps = spec
                .pipeline
                .build_steps()
                .iter()
                .chain(std::iter::once(spec.pipeline.run_step()));
            for step in steps {
                let program = step.program();
                if program.contains(WORKSPACE_PLACEHOLDER) || program.starts_with("./") {
                    continue;
                }
                if which::which_in(program, Some(search_path), &cwd).is_err() {
                    missing.push((id.clone(), program.to_string()));
                }
            }
        }
        missing
    }
}

fn build_spec(
    id: &str,
    source_file: String,
    build_commands: Vec<String>,
    run_command: &str,
) -> anyhow::Result<ToolchainSpec> {
    if !is_bare_file_name(&source_file) {
        bail!("source_file must be a bare file name: {:?}", source_file);
    }

    let run = CommandTemplate::parse(run_command).context("Invalid run_command")?;
    let build = build_commands
        .iter()
        .map(|cmd| CommandTemplate::parse(cmd).context("Invalid build_commands entry"))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let pipeline = if build.is_empty() {
        Pipeline::Direct { run }
    } else {
        Pipeline::CompileThenRun { build, run }
    };

    Ok(ToolchainSpec {
        language_id: id.to_string(),
        source_file,
        pipeline,
        harness: None,
        env: Vec::new(),
    })
}

/// True for a plain file name: no separators, no `..`, not hidden-empty
pub fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
