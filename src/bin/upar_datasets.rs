use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use upar_datasets::app::Pipeline;
use upar_datasets::config::{CliOverrides, ConfigLoader};
use upar_datasets::direct::HttpDirectClient;
use upar_datasets::error::{FailureKind, PrepError};
use upar_datasets::gdrive::DriveHttpClient;
use upar_datasets::layout::DatasetLayout;
use upar_datasets::output::{ConsoleProgress, JsonOutput, OutputMode, TextOutput};
use upar_datasets::progress::ProgressSink;

#[derive(Parser)]
#[command(name = "upar-datasets")]
#[command(about = "Download and prepare the UPAR challenge datasets (Market1501, PA100k, PETA)")]
#[command(version, author)]
struct Cli {
    /// Dataset directory. Downloaded datasets are stored in this directory [default: ./data]
    #[arg(long)]
    data_dir: Option<String>,

    /// JSON config file [default: upar-datasets.json, if present]
    #[arg(long)]
    config: Option<String>,

    /// Where submission templates are extracted [default: current directory]
    #[arg(long)]
    templates_dir: Option<String>,

    /// PETA file mapping [default: peta_file_mapping.txt]
    #[arg(long)]
    peta_mapping: Option<String>,

    /// Attempt every dataset even after one fails
    #[arg(long)]
    keep_going: bool,

    /// No progress bars; print the run report as JSON on stdout
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<PrepError>() {
                return ExitCode::from(map_exit_code(err.kind()));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(kind: FailureKind) -> u8 {
    match kind {
        FailureKind::Config | FailureKind::Mapping => 2,
        FailureKind::Network => 3,
        FailureKind::Filesystem | FailureKind::Archive => 1,
    }
}

fn init_tracing<W>(writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(writer)
        .init();
}

fn run() -> miette::Result<ExitCode> {
    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let sink: Box<dyn ProgressSink> = match output_mode {
        OutputMode::Interactive => {
            let progress = ConsoleProgress::new();
            init_tracing(progress.log_writer());
            Box::new(progress)
        }
        OutputMode::NonInteractive => {
            init_tracing(std::io::stderr);
            Box::new(JsonOutput)
        }
    };

    let resolved = ConfigLoader::resolve(
        cli.config.as_deref(),
        CliOverrides {
            data_dir: cli.data_dir,
            templates_dir: cli.templates_dir,
            peta_mapping: cli.peta_mapping,
            keep_going: cli.keep_going,
        },
    )?;

    let layout = DatasetLayout::new(resolved.data_dir, resolved.templates_dir);
    let pipeline = Pipeline::new(
        HttpDirectClient::new()?,
        DriveHttpClient::new()?,
        layout,
        resolved.sources,
    )
    .with_mapping_path(resolved.peta_mapping)
    .with_policy(resolved.policy);

    let report = pipeline.prepare_datasets(sink.as_ref())?;

    let printed = match output_mode {
        OutputMode::Interactive => TextOutput::print_report(&report),
        OutputMode::NonInteractive => JsonOutput::print_report(&report),
    };
    if let Err(err) = printed {
        tracing::warn!("failed to print report: {err}");
    }

    Ok(match report.first_failure().and_then(|outcome| outcome.failure.as_ref()) {
        Some(failure) => ExitCode::from(map_exit_code(failure.kind)),
        None => ExitCode::SUCCESS,
    })
}
