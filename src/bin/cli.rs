use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ecosystem_ci::engine::{CaseStatus, SuiteResult};
use ecosystem_ci::prelude::*;
use heck::ToSnakeCase;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "ecosystem-ci")]
#[command(about = "Render and run ecosystem test suites", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the suite configuration file
    #[arg(short, long, global = true, default_value = "ecosystem.yaml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render suites to shell scripts or a Buildkite pipeline
    Render(RenderArgs),

    /// Run suites on this machine (default)
    Test(TestArgs),

    /// List configured suites and their cases
    List,

    /// Validate the configuration without running anything
    Validate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Buildkite,
    Shell,
}

#[derive(Args)]
struct RenderArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Buildkite)]
    format: Format,

    /// Directory rendered files are written to
    #[arg(short, long, default_value = "tmp")]
    output: PathBuf,

    /// Only render this suite (key or name)
    #[arg(short, long)]
    suite: Option<String>,

    /// Runtime binary used in rendered commands (overrides config)
    #[arg(short, long)]
    bin: Option<String>,

    /// Branch used in concurrency groups
    #[arg(long, env = "BUILDKITE_BRANCH")]
    branch: Option<String>,
}

#[derive(Args, Default)]
struct TestArgs {
    /// Only run cases whose name contains this
    #[arg(short = 't', long)]
    filter: Option<String>,

    /// Only run this suite (key or name)
    #[arg(short, long)]
    suite: Option<String>,

    /// Runtime binary to test (overrides config)
    #[arg(short, long)]
    bin: Option<String>,

    /// Fail the run when a case marked failing passes
    #[arg(long)]
    strict: bool,

    /// Print the run result as JSON
    #[arg(long)]
    json: bool,
}

#[cfg(feature = "otel")]
fn init_otel_tracing(verbose: bool) -> anyhow::Result<()> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::runtime::Tokio;
    use opentelemetry_sdk::trace::TracerProvider;

    let filter = if verbose {
        "ecosystem_ci=debug"
    } else {
        "ecosystem_ci=info"
    };

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp_endpoint)
        .build()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .build();

    let tracer = provider.tracer("ecosystem-ci");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .init();

    opentelemetry::global::set_tracer_provider(provider);
    Ok(())
}

#[cfg(not(feature = "otel"))]
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "ecosystem_ci=debug"
    } else {
        "ecosystem_ci=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "otel")]
    if let Err(e) = init_otel_tracing(cli.verbose) {
        eprintln!("Failed to initialize OpenTelemetry: {}", e);
        return ExitCode::from(2);
    }

    #[cfg(not(feature = "otel"))]
    init_tracing(cli.verbose);

    let result = run(cli).await;

    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();

    match result {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "ecosystem-ci failed");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Render(args)) => render(&config, args).await,
        Some(Commands::Test(args)) => test(&config, args).await,
        Some(Commands::List) => list(&config).await,
        Some(Commands::Validate) => validate(&config, &cli.config).await,
        None => test(&config, TestArgs::default()).await,
    }
}

fn load_config(path: &Path) -> anyhow::Result<EcosystemConfig> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    Ok(EcosystemConfig::load(path)?)
}

/// Reify the selected suite, or every suite
async fn select_suites(
    registry: &SuiteRegistry,
    selector: Option<&str>,
    ctx: &Context,
) -> anyhow::Result<Vec<(String, TestSuite)>> {
    match selector {
        Some(selector) => match registry.find(selector, ctx).await? {
            Some(found) => Ok(vec![found]),
            None => anyhow::bail!("Suite not found: {}", selector),
        },
        None => Ok(registry.reify_all(ctx).await?),
    }
}

// ============================================================================
// render
// ============================================================================

async fn render(config: &EcosystemConfig, args: RenderArgs) -> anyhow::Result<bool> {
    let bin = args.bin.unwrap_or_else(|| config.bin.clone());
    let registry = config.registry();
    std::fs::create_dir_all(&args.output)?;

    match args.format {
        Format::Shell => {
            let ctx = Context::render(bin, RenderTarget::Shell);
            for (_, suite) in select_suites(&registry, args.suite.as_deref(), &ctx).await? {
                let file = args
                    .output
                    .join(format!("{}.sh", suite.display_name().to_snake_case()));
                std::fs::write(&file, to_script(&render_suite(&suite)?))?;
                make_executable(&file)?;
                println!("Wrote {}", file.display());
            }
        }
        Format::Buildkite => {
            let mut options = config.pipeline.clone();
            if let Some(branch) = args.branch {
                options.branch = branch;
            }
            let ctx = Context::render(bin, RenderTarget::Buildkite);
            let mut factory = PipelineFactory::new(ctx.clone(), options);
            for (_, suite) in select_suites(&registry, args.suite.as_deref(), &ctx).await? {
                factory.push_suite(&suite)?;
            }
            let file = args.output.join(PIPELINE_FILE);
            std::fs::write(&file, factory.to_yaml()?)?;
            println!("Wrote {}", file.display());
        }
    }

    Ok(true)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

// ============================================================================
// test
// ============================================================================

async fn test(config: &EcosystemConfig, args: TestArgs) -> anyhow::Result<bool> {
    let bin = args.bin.unwrap_or_else(|| config.bin.clone());
    let bin = which::which(&bin)
        .map_err(|e| anyhow::anyhow!("Runtime binary '{}' not found: {}", bin, e))?;
    let ctx = Context::local(bin.display().to_string(), std::env::current_dir()?);

    let executor =
        LocalExecutor::new(ExecutorConfig::from_config(config).with_filter(args.filter));

    let registry = config.registry();
    let result = match &args.suite {
        Some(selector) => executor.run_selected(&registry, selector, &ctx).await?,
        None => executor.run_all(&registry, &ctx).await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for suite in &result.suites {
            print_suite(suite);
        }
        println!(
            "\n{} passed, {} failed, {} known failures, {} unexpected passes, {} skipped",
            result.count(CaseStatus::Passed),
            result.count(CaseStatus::Failed),
            result.count(CaseStatus::KnownFailure),
            result.count(CaseStatus::UnexpectedPass),
            result.count(CaseStatus::Skipped),
        );
    }

    let unexpected: Vec<_> = result.unexpected_passes().collect();
    for (suite, case) in &unexpected {
        tracing::warn!(
            "'{}' in suite '{}' is marked failing but passed; consider removing the flag",
            case.name,
            suite.name
        );
    }

    Ok(result.success() && !(args.strict && !unexpected.is_empty()))
}

fn print_suite(suite: &SuiteResult) {
    println!("{}:", suite.name);
    for case in &suite.cases {
        let mark = match case.status {
            CaseStatus::Passed => "✓",
            CaseStatus::Failed => "✗",
            CaseStatus::KnownFailure => "~",
            CaseStatus::UnexpectedPass => "!",
            CaseStatus::Skipped => "-",
        };
        match case.failed_step() {
            Some(step) => println!(
                "  {} {} (step '{}' exited with {})",
                mark,
                case.name,
                step.label,
                step.outcome.exit_code()
            ),
            None => println!("  {} {}", mark, case.name),
        }
    }
    for error in &suite.hook_errors {
        println!("  ✗ {}", error);
    }
}

// ============================================================================
// list / validate
// ============================================================================

async fn list(config: &EcosystemConfig) -> anyhow::Result<bool> {
    let registry = config.registry();
    if registry.is_empty() {
        println!("No suites configured");
        return Ok(true);
    }

    let ctx = Context::render(config.bin.clone(), RenderTarget::Local);
    println!("Suites:\n");
    for (key, suite) in registry.reify_all(&ctx).await? {
        println!("  {} ({}, {} cases)", key, suite.display_name(), suite.cases.len());
        for case in &suite.cases {
            let flag = if case.skip {
                " [skip]"
            } else if case.failing {
                " [failing]"
            } else {
                ""
            };
            println!("    {}{}", case.name, flag);
        }
    }

    Ok(true)
}

async fn validate(config: &EcosystemConfig, path: &Path) -> anyhow::Result<bool> {
    let registry = config.registry();

    let shell = Context::render(config.bin.clone(), RenderTarget::Shell);
    let mut cases = 0;
    for (_, suite) in registry.reify_all(&shell).await? {
        render_suite(&suite)?;
        cases += suite.cases.len();
    }

    let buildkite = Context::render(config.bin.clone(), RenderTarget::Buildkite);
    let mut factory = PipelineFactory::new(buildkite.clone(), config.pipeline.clone());
    for (_, suite) in registry.reify_all(&buildkite).await? {
        factory.push_suite(&suite)?;
    }
    factory.to_yaml()?;

    println!(
        "✓ {} is valid ({} suites, {} cases)",
        path.display(),
        registry.len(),
        cases
    );
    Ok(true)
}
