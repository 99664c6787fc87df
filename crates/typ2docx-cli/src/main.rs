use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use typ2docx::{
    extract_equations, install_acrobat, load_settings, ConversionJob, EngineKind, Pipeline,
    TracingProgress,
};

#[derive(Parser)]
#[command(name = "typ2docx")]
#[command(about = "Convert Typst documents to Word with editable equations")]
#[command(version)]
struct Cli {
    /// Log debug output to standard error
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a Typst project to DOCX
    Convert(ConvertArgs),

    /// Print the equations of a Typst project as a JSON array
    Extract {
        /// Entry point of the Typst project
        input: PathBuf,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,

        /// Project root for absolute includes (default: the entry's directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Install the trusted function used by the desktop engine
    InstallAcrobat,
}

#[derive(Args)]
struct ConvertArgs {
    /// Entry point of the Typst project
    input: PathBuf,

    /// Export engine for the full-fidelity branch
    #[arg(short, long, default_value = "cloud", env = "TYP2DOCX_ENGINE")]
    engine: EngineKind,

    /// Output file (default: <input name>.docx in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep intermediate files in ./.typ2docx
    #[arg(long)]
    debug: bool,

    /// Options passed to `typst compile`
    #[arg(last = true)]
    typst_opts: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || on_interrupt.cancel()) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let outcome = match cli.command {
        Commands::Convert(args) => convert(args, &cancel).await,
        Commands::Extract {
            input,
            pretty,
            root,
        } => extract(input, pretty, root),
        Commands::InstallAcrobat => install(),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to standard error so `extract` keeps standard output clean.
fn init_logging(verbose: bool) {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }

    let default_filter = if verbose { "typ2docx=debug" } else { "typ2docx=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}

async fn convert(args: ConvertArgs, cancel: &CancellationToken) -> Result<(), Box<dyn Error>> {
    let settings = Arc::new(load_settings()?);
    let cwd = std::env::current_dir()?;

    let mut job = ConversionJob::new(&args.input, args.engine, cwd)
        .with_typst_opts(args.typst_opts)
        .with_debug(args.debug);
    if let Some(output) = &args.output {
        job = job.with_output(output);
    }

    let pipeline = Pipeline::for_job(settings, &job);
    let report = pipeline.run(&job, &TracingProgress, cancel).await?;

    info!(
        "Done: {} ({} equations, {:.1}s)",
        report.output.display(),
        report.equations,
        report.elapsed.as_secs_f64()
    );
    if report.retained {
        info!("Intermediate files kept in {}", report.workdir.display());
    }
    Ok(())
}

fn extract(input: PathBuf, pretty: bool, root: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let equations = extract_equations(&input, root.as_deref())?;
    let json = if pretty {
        serde_json::to_string_pretty(&equations)?
    } else {
        serde_json::to_string(&equations)?
    };
    println!("{}", json);
    Ok(())
}

fn install() -> Result<(), Box<dyn Error>> {
    let installed = install_acrobat()?;
    println!("Installed {}", installed.display());
    Ok(())
}
