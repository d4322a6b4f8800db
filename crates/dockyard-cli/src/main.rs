//! Dockyard - multi-variant container image release CLI
//!
//! ## Commands
//!
//! - `run`: classify the current event, build every selected variant and
//!   publish what is eligible
//! - `plan`: show the intent and tags an event would produce, without building
//! - `variants`: list the configured variant registry

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};

use dockyard_ci::{step_summary_path, BuildxBuilder, DockerConfigAuth, DockerPusher, QemuBinfmt};
use dockyard_core::{
    cancel_pair, obs, render_fatal_json, render_report_md, write_fatal_json, write_report_json,
    write_report_md, DockyardConfig, DockyardError, FatalDiagnostic, FatalKind, PipelineConfig,
    PipelineDriver, PipelineReport, Trigger, TriggerKind, VariantRegistry,
};

/// Exit code for runs that could not start or were aborted.
const FATAL_EXIT_CODE: u8 = 2;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-variant container image release pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "DOCKYARD_CONFIG",
        default_value = "dockyard.toml"
    )]
    config: PathBuf,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that take precedence over the configuration file.
#[derive(Args, Debug, Default, Clone)]
struct Overrides {
    /// Maximum number of concurrent builds
    #[arg(long, global = true, env = "DOCKYARD_WORKER_LIMIT")]
    worker_limit: Option<usize>,

    /// Branch whose pushes are published
    #[arg(long, global = true, env = "DOCKYARD_TRUNK_BRANCH")]
    trunk_branch: Option<String>,

    /// Per-build timeout in seconds (0 disables it)
    #[arg(long, global = true, env = "DOCKYARD_BUILD_TIMEOUT_SECS")]
    build_timeout_secs: Option<u64>,

    /// Registry host images are published to
    #[arg(long, global = true, env = "DOCKYARD_REGISTRY")]
    registry: Option<String>,
}

/// The repository event. Read from GitHub Actions when `--event` is omitted.
#[derive(Args, Debug, Default, Clone)]
struct TriggerArgs {
    /// Event kind: push, pull_request, tag_push or release
    #[arg(long)]
    event: Option<TriggerKind>,

    /// Full git ref (e.g. refs/heads/master, refs/tags/v1.2.0)
    #[arg(long = "ref", requires = "event")]
    git_ref: Option<String>,

    /// Commit SHA
    #[arg(long, requires = "event")]
    sha: Option<String>,

    /// Target branch of a pull request
    #[arg(long, requires = "event")]
    base: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    trigger: TriggerArgs,

    /// Write the JSON report to this path (`-` for stdout)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write the Markdown summary to this path (default: the GitHub job summary)
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Skip the registry credential check before pushing
    #[arg(long)]
    no_login_check: bool,

    /// Docker client program
    #[arg(long, env = "DOCKYARD_DOCKER", default_value = "docker")]
    docker: String,

    /// skopeo program, used for multi-platform archives
    #[arg(long, env = "DOCKYARD_SKOPEO", default_value = "skopeo")]
    skopeo: String,

    /// buildx builder instance
    #[arg(long, env = "DOCKYARD_BUILDX_BUILDER")]
    builder: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the release pipeline for an event
    Run(RunArgs),

    /// Show what a run would build, tag and push
    Plan {
        #[command(flatten)]
        trigger: TriggerArgs,
    },

    /// List configured variants
    Variants,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    dockyard_core::init_tracing(cli.json, level);

    let report_path = match &cli.command {
        Commands::Run(args) => args.report.clone(),
        _ => None,
    };

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Err(write_err) = report_fatal(&e, report_path.as_deref()) {
                eprintln!("Error: {:#}", write_err);
            }
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

/// Classify an aborting error by the first dockyard error in its chain.
fn fatal_diagnostic(err: &anyhow::Error) -> FatalDiagnostic {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<DockyardError>())
        .map(DockyardError::fatal_kind)
        .unwrap_or(FatalKind::Internal);
    FatalDiagnostic::new(kind, format!("{:#}", err))
}

/// Log the aborting error and write its record to the report path, or to
/// stdout when no file was requested.
fn report_fatal(err: &anyhow::Error, report: Option<&Path>) -> Result<FatalDiagnostic> {
    let diagnostic = fatal_diagnostic(err);
    obs::emit_run_fatal(&diagnostic);

    match report {
        Some(path) if path.as_os_str() != "-" => write_fatal_json(path, &diagnostic)?,
        _ => println!("{}", render_fatal_json(&diagnostic)?),
    }
    Ok(diagnostic)
}

async fn dispatch(cli: Cli) -> Result<u8> {
    let config = load_config(&cli.config, &cli.overrides)?;

    match cli.command {
        Commands::Run(args) => cmd_run(config, &args).await,
        Commands::Plan { trigger } => cmd_plan(config, &trigger).map(|_| 0),
        Commands::Variants => cmd_variants(&config).map(|_| 0),
    }
}

/// Load the configuration file and apply overrides on top.
fn load_config(path: &Path, overrides: &Overrides) -> Result<DockyardConfig> {
    let mut config = DockyardConfig::from_path(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    apply_overrides(&mut config.pipeline, overrides);
    config
        .pipeline
        .validate()
        .context("Invalid configuration after overrides")?;
    Ok(config)
}

fn apply_overrides(pipeline: &mut PipelineConfig, overrides: &Overrides) {
    if let Some(limit) = overrides.worker_limit {
        pipeline.worker_limit = limit;
    }
    if let Some(branch) = &overrides.trunk_branch {
        pipeline.trunk_branch = branch.clone();
    }
    if let Some(secs) = overrides.build_timeout_secs {
        pipeline.per_build_timeout_secs = secs;
    }
    if let Some(registry) = &overrides.registry {
        pipeline.registry = registry.clone();
    }
}

fn resolve_trigger(args: &TriggerArgs) -> Result<Trigger> {
    let Some(kind) = args.event else {
        return dockyard_ci::trigger_from_env()
            .map_err(DockyardError::from)
            .context("No --event given and the GitHub Actions environment is incomplete");
    };
    let git_ref = args
        .git_ref
        .clone()
        .ok_or_else(|| DockyardError::Trigger("--ref is required with --event".to_string()))?;
    let sha = args
        .sha
        .clone()
        .ok_or_else(|| DockyardError::Trigger("--sha is required with --event".to_string()))?;

    let mut trigger = Trigger::new(kind, git_ref, sha);
    trigger.base_branch = args.base.clone();
    Ok(trigger)
}

fn build_driver(config: DockyardConfig, args: &RunArgs) -> Result<PipelineDriver> {
    let registry =
        VariantRegistry::from_config(&config).context("Failed to load variant registry")?;

    let mut builder = BuildxBuilder::with_program(&args.docker);
    if let Some(name) = &args.builder {
        builder = builder.with_builder(name);
    }
    let pusher = DockerPusher::with_programs(&args.docker, &args.skopeo);
    let emulation = QemuBinfmt::new().with_program(&args.docker);

    let driver = PipelineDriver::new(
        registry,
        config.pipeline,
        Arc::new(builder),
        Arc::new(pusher),
    )
    .with_emulation(Arc::new(emulation));

    if args.no_login_check {
        Ok(driver)
    } else {
        Ok(driver.with_login(Arc::new(DockerConfigAuth::from_env())))
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => ctrl_c.await,
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

async fn cmd_run(config: DockyardConfig, args: &RunArgs) -> Result<u8> {
    let trigger = resolve_trigger(&args.trigger)?;
    let driver = build_driver(config, args)?;

    let (handle, signal) = cancel_pair();
    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, cancelling run");
        handle.cancel();
    });

    let outcome = driver.run(&trigger, signal).await;
    watcher.abort();
    let report = outcome.context("Release run aborted")?;

    match &args.report {
        Some(path) if path.as_os_str() == "-" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(path) => {
            print_report(&report);
            write_report_json(path, &report)?;
            println!("Report written to {}", path.display());
        }
        None => print_report(&report),
    }
    match &args.summary {
        Some(path) => write_report_md(path, &report)?,
        None => {
            if let Some(path) = step_summary_path() {
                append_summary(&path, &report)?;
            }
        }
    }

    info!(status = %report.overall_status, "Run complete");
    Ok(u8::try_from(report.exit_code()).unwrap_or(FATAL_EXIT_CODE))
}

fn print_report(report: &PipelineReport) {
    println!("Run {}", report.run_id);
    println!("Trigger: {} {}", report.trigger.kind, report.trigger.git_ref);
    println!("Intent: {}", report.intent_reason);
    println!("Tags: {}", report.tags.join(", "));
    for result in &report.results {
        let detail = result
            .error
            .as_ref()
            .map(|e| format!(" ({})", e))
            .unwrap_or_default();
        println!(
            "  {:<12} {:<24} {}{}",
            result.variant, result.tag, result.status, detail
        );
    }
    for pushed in &report.pushed {
        println!("  pushed {}:{}", pushed.variant, pushed.tag);
    }
    println!("Status: {}", report.overall_status);
}

/// Append to the job summary; other steps may have written to it already.
fn append_summary(path: &Path, report: &PipelineReport) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(render_report_md(report).as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct PlanSummary<'a> {
    trigger: &'a Trigger,
    reason: String,
    push_eligible: bool,
    variants: Vec<&'a str>,
    tags: &'a [String],
}

fn cmd_plan(config: DockyardConfig, args: &TriggerArgs) -> Result<()> {
    let trigger = resolve_trigger(args)?;
    let registry =
        VariantRegistry::from_config(&config).context("Failed to load variant registry")?;
    let intent = dockyard_core::classify(&trigger, registry.list_variants(), &config.pipeline)
        .context("Failed to classify trigger")?;
    let tags = dockyard_core::resolve_tags(&intent).context("Failed to resolve tags")?;

    let summary = PlanSummary {
        trigger: &trigger,
        reason: intent.reason.describe(),
        push_eligible: intent.push_eligible,
        variants: intent.variant_names(),
        tags: &tags,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_variants(config: &DockyardConfig) -> Result<()> {
    let registry =
        VariantRegistry::from_config(config).context("Failed to load variant registry")?;

    println!("Registry digest: {}", registry.digest());
    for variant in registry.list_variants() {
        let emulation = if variant.requires_emulation {
            " [emulated]"
        } else {
            ""
        };
        println!(
            "  {:<12} {:<32} {:<28} {}{}",
            variant.name,
            variant.repository,
            variant.platforms.join(","),
            variant.dockerfile_path.display(),
            emulation
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_project(extra: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let config = format!(
            r#"
workspace_root = "{}"
{}

[[variant]]
name = "cpu"
dockerfile = "Dockerfile"
repository = "nrdg/afq"

[[variant]]
name = "gpu"
dockerfile = "Dockerfile"
repository = "nrdg/afq-gpu"
build_args = {{ CUDA_VERSION = "12.4" }}
"#,
            dir.path().join("work").display(),
            extra
        );
        std::fs::write(dir.path().join("dockyard.toml"), config).unwrap();
        dir
    }

    fn run_args(event: &str, git_ref: &str) -> RunArgs {
        RunArgs {
            trigger: TriggerArgs {
                event: Some(event.parse().unwrap()),
                git_ref: Some(git_ref.to_string()),
                sha: Some("abc1234def5678".to_string()),
                base: None,
            },
            report: None,
            summary: None,
            no_login_check: true,
            docker: "echo".to_string(),
            skopeo: "true".to_string(),
            builder: None,
        }
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "dockyard",
            "--worker-limit",
            "4",
            "run",
            "--event",
            "tag_push",
            "--ref",
            "refs/tags/v1.2.0",
            "--sha",
            "abc1234",
            "--report",
            "report.json",
        ])
        .unwrap();

        assert_eq!(cli.overrides.worker_limit, Some(4));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.trigger.event, Some(TriggerKind::TagPush));
                assert_eq!(args.trigger.git_ref.as_deref(), Some("refs/tags/v1.2.0"));
                assert_eq!(args.report, Some(PathBuf::from("report.json")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_event() {
        assert!(Cli::try_parse_from([
            "dockyard", "plan", "--event", "schedule", "--ref", "x", "--sha", "abc1234",
        ])
        .is_err());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut pipeline = PipelineConfig::default();
        let overrides = Overrides {
            worker_limit: Some(6),
            trunk_branch: Some("main".to_string()),
            build_timeout_secs: Some(0),
            registry: None,
        };
        apply_overrides(&mut pipeline, &overrides);

        assert_eq!(pipeline.worker_limit, 6);
        assert_eq!(pipeline.trunk_branch, "main");
        assert_eq!(pipeline.per_build_timeout(), None);
        assert_eq!(pipeline.registry, PipelineConfig::default().registry);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = write_project("");
        let overrides = Overrides {
            worker_limit: Some(0),
            ..Overrides::default()
        };
        assert!(load_config(&dir.path().join("dockyard.toml"), &overrides).is_err());
    }

    #[test]
    fn test_explicit_trigger() {
        let args = TriggerArgs {
            event: Some(TriggerKind::PullRequest),
            git_ref: Some("refs/pull/7/merge".to_string()),
            sha: Some("abc1234".to_string()),
            base: Some("master".to_string()),
        };
        let trigger = resolve_trigger(&args).unwrap();
        assert_eq!(trigger.kind, TriggerKind::PullRequest);
        assert_eq!(trigger.base_branch.as_deref(), Some("master"));

        let missing_sha = TriggerArgs {
            sha: None,
            ..args
        };
        let err = resolve_trigger(&missing_sha).unwrap_err();
        assert_eq!(fatal_diagnostic(&err).kind, FatalKind::Trigger);
    }

    #[test]
    fn test_plan_and_variants() {
        let dir = write_project("");
        let config =
            load_config(&dir.path().join("dockyard.toml"), &Overrides::default()).unwrap();

        cmd_variants(&config).unwrap();
        cmd_plan(config, &run_args("push", "refs/heads/master").trigger).unwrap();
    }

    #[tokio::test]
    async fn test_run_writes_report_and_summary() {
        let dir = write_project("");
        let config =
            load_config(&dir.path().join("dockyard.toml"), &Overrides::default()).unwrap();

        let mut args = run_args("push", "refs/heads/master");
        args.report = Some(dir.path().join("report.json"));
        args.summary = Some(dir.path().join("summary.md"));

        let code = cmd_run(config, &args).await.unwrap();
        assert_eq!(code, 0);

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("report.json")).unwrap())
                .unwrap();
        assert_eq!(report["overall_status"], "success");
        assert_eq!(report["results"].as_array().unwrap().len(), 2);

        let summary = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
        assert!(summary.starts_with("# Release Summary"));
    }

    #[tokio::test]
    async fn test_failed_builds_exit_nonzero() {
        let dir = write_project("");
        let config =
            load_config(&dir.path().join("dockyard.toml"), &Overrides::default()).unwrap();

        let mut args = run_args("tag_push", "refs/tags/v1.2.0");
        args.docker = "false".to_string();

        let code = cmd_run(config, &args).await.unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_invalid_tag_is_fatal() {
        let dir = write_project("");
        let config =
            load_config(&dir.path().join("dockyard.toml"), &Overrides::default()).unwrap();

        let args = run_args("tag_push", "refs/tags/bad tag!");
        let err = cmd_run(config, &args).await.unwrap_err();
        let diagnostic = fatal_diagnostic(&err);
        assert_eq!(diagnostic.kind, FatalKind::TagResolution);
        assert!(diagnostic.message.contains("bad tag!"));
    }

    #[test]
    fn test_config_error_writes_fatal_record() {
        let dir = write_project("");
        let overrides = Overrides {
            worker_limit: Some(0),
            ..Overrides::default()
        };
        let err = load_config(&dir.path().join("dockyard.toml"), &overrides).unwrap_err();

        let path = dir.path().join("report.json");
        let diagnostic = report_fatal(&err, Some(&path)).unwrap();
        assert_eq!(diagnostic.kind, FatalKind::Config);

        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(record["overall_status"], "aborted");
        assert_eq!(record["error"]["kind"], "config");
        assert!(record["error"]["message"]
            .as_str()
            .unwrap()
            .contains("worker_limit"));
    }

    #[test]
    fn test_missing_dockerfile_is_config_fatal() {
        let dir = write_project("");
        std::fs::remove_file(dir.path().join("Dockerfile")).unwrap();
        let config =
            load_config(&dir.path().join("dockyard.toml"), &Overrides::default()).unwrap();

        let Err(err) = build_driver(config, &run_args("push", "refs/heads/master")) else {
            panic!("registry with a missing Dockerfile was accepted");
        };
        assert_eq!(fatal_diagnostic(&err).kind, FatalKind::Config);
    }
}
