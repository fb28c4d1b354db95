use anyhow::{Context, Result, bail};
use clap::{Parser as ClapParser, Subcommand};
use docflow::service::{self, CoreHandle};
use docflow::{CoreConfig, DocumentCore, SerializedComponent, UpdateOptions, UpdateOutcome, Value, render_diagnostics};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(ClapParser)]
#[command(name = "docflow")]
#[command(about = "Resolve and drive interactive math documents")]
struct Cli {
    /// Core configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a document and report its diagnostics
    Check {
        /// Serialized component tree (JSON)
        file: PathBuf,
        /// Markup the tree was parsed from, for positioned diagnostics
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Print renderer state, or a single variable
    Resolve {
        file: PathBuf,
        #[arg(long, requires = "variable")]
        component: Option<String>,
        #[arg(long, requires = "component")]
        variable: Option<String>,
    },
    /// Apply the steps of a TOML script and check their expectations
    Run {
        file: PathBuf,
        #[arg(long)]
        script: PathBuf,
    },
}

/// A script of updates:
///
/// ```toml
/// [[step]]
/// component = "n"
/// variable = "value"
/// value = 4
///
/// [step.expect]
/// "n.isInteger" = true
/// ```
#[derive(Deserialize)]
struct Script {
    #[serde(default, rename = "step")]
    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct Step {
    component: String,
    variable: Option<String>,
    value: Option<toml::Value>,
    action: Option<String>,
    args: Option<toml::Value>,
    #[serde(default)]
    transient: bool,
    label: Option<String>,
    /// Whether the update should succeed. Unchecked when left out.
    succeeds: Option<bool>,
    /// `"component.variable" = value` pairs read after the step.
    #[serde(default)]
    expect: BTreeMap<String, toml::Value>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => CoreConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => CoreConfig::default(),
    };

    match cli.command {
        Commands::Check { file, source } => check(&file, source.as_deref(), &config),
        Commands::Resolve {
            file,
            component,
            variable,
        } => resolve(&file, component.zip(variable), &config),
        Commands::Run { file, script } => run(&file, &script, &config),
    }
}

fn load_document(file: &Path, config: &CoreConfig) -> Result<DocumentCore> {
    let json = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let root: SerializedComponent =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", file.display()))?;
    let core = DocumentCore::with_config(&root, config).with_context(|| format!("building {}", file.display()))?;
    log::info!("{}: {} components", file.display(), core.component_count());
    Ok(core)
}

fn check(file: &Path, source: Option<&Path>, config: &CoreConfig) -> Result<()> {
    let mut core = load_document(file, config)?;
    // Resolving everything surfaces the warnings definitions report.
    core.resolve_renderer_state()?;
    let diagnostics = core.diagnostics();
    if diagnostics.is_empty() {
        eprintln!("{}: ok", file.display());
        return Ok(());
    }
    let (filename, markup) = match source {
        Some(path) => (
            path.display().to_string(),
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        ),
        None => (file.display().to_string(), String::new()),
    };
    eprint!("{}", render_diagnostics(diagnostics.entries(), &filename, &markup));
    if diagnostics.has_errors() {
        bail!("{}: {} diagnostic(s)", file.display(), diagnostics.len());
    }
    Ok(())
}

fn resolve(file: &Path, target: Option<(String, String)>, config: &CoreConfig) -> Result<()> {
    let mut core = load_document(file, config)?;
    let output = match target {
        Some((component, variable)) => core
            .resolve(&component, &variable)
            .with_context(|| format!("resolving {component}.{variable}"))?
            .to_json(),
        None => {
            let state = core.resolve_renderer_state()?;
            let mut entries = serde_json::Map::new();
            for entry in state {
                entries.insert(format!("{}.{}", entry.component, entry.variable), entry.value.to_json());
            }
            serde_json::Value::Object(entries)
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run(file: &Path, script_path: &Path, config: &CoreConfig) -> Result<()> {
    let core = load_document(file, config)?;
    let source = fs::read_to_string(script_path).with_context(|| format!("reading {}", script_path.display()))?;
    let script: Script = toml::from_str(&source).with_context(|| format!("parsing {}", script_path.display()))?;

    let total = script.steps.len();
    let (handle, worker) = service::channel(core);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("starting runtime")?;
    let (core, failed) = runtime.block_on(async move {
        let steps = async move {
            let mut failed = 0usize;
            for (index, step) in script.steps.iter().enumerate() {
                match run_step(&handle, step).await {
                    Ok(mismatches) if mismatches.is_empty() => eprintln!("step {}: ok", index + 1),
                    Ok(mismatches) => {
                        failed += 1;
                        for mismatch in mismatches {
                            eprintln!("step {}: {mismatch}", index + 1);
                        }
                    }
                    Err(error) => {
                        failed += 1;
                        eprintln!("step {}: {error:#}", index + 1);
                    }
                }
            }
            failed
        };
        tokio::join!(worker.run(), steps)
    });

    eprintln!("{total} step(s), {failed} failed, {} history entries", core.history().len());
    if failed > 0 {
        bail!("{failed} step(s) failed");
    }
    Ok(())
}

fn from_toml(value: &toml::Value) -> Result<Value> {
    Ok(Value::from_json(&serde_json::to_value(value)?))
}

/// Apply one step and return its unmet expectations.
async fn run_step(handle: &CoreHandle, step: &Step) -> Result<Vec<String>> {
    let options = UpdateOptions {
        transient: step.transient,
        label: step.label.clone(),
    };
    let outcome: UpdateOutcome = match (&step.action, &step.variable, &step.value) {
        (Some(action), _, _) => {
            let args = step.args.as_ref().map(from_toml).transpose()?.unwrap_or_default();
            handle.perform_action(&step.component, action, args, options).await?
        }
        (None, Some(variable), Some(value)) => {
            handle
                .request_value(&step.component, variable, from_toml(value)?, options)
                .await?
        }
        (None, Some(_), None) => bail!("{}: a variable step needs a value", step.component),
        (None, None, _) => bail!("{}: a step needs an action or a variable", step.component),
    };
    if let Some(failure) = &outcome.failure {
        log::info!("{failure}");
    }
    println!("{}", serde_json::to_string(&outcome)?);

    let mut mismatches = Vec::new();
    if let Some(expected) = step.succeeds.filter(|expected| *expected != outcome.success) {
        mismatches.push(format!("expected success = {expected}, got {}", outcome.success));
    }
    for (target, expected) in &step.expect {
        let Some((component, variable)) = target.split_once('.') else {
            bail!("expectation '{target}' is not component.variable");
        };
        let expected = from_toml(expected)?;
        let actual = handle.resolve(component, variable).await?;
        if actual != expected {
            mismatches.push(format!("{target}: expected {expected}, got {actual}"));
        }
    }
    Ok(mismatches)
}
