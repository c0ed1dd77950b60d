use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use terra_ops::app::{
    App, CloneOptions, CopyOptions, DEFAULT_PROTECTED_PREFIXES, IngestOptions, MigrateOptions,
    MopOptions, ProgressEvent, ProgressSink, Settings, UpsertOptions,
};
use terra_ops::auth::default_token;
use terra_ops::config::{ConfigLoader, ResolvedConfig};
use terra_ops::domain::{DatasetId, GcsUri, ProfileId, TdrEnvironment, UpdateStrategy, WorkspaceRef};
use terra_ops::error::OpsError;
use terra_ops::firecloud::FirecloudHttpClient;
use terra_ops::gcs::GcsHttpClient;
use terra_ops::http::{ApiClient, Platform};
use terra_ops::listing::{Listing, ListingComparison, ListingSource, compare};
use terra_ops::output::{JsonOutput, OutputMode, progress_for};
use terra_ops::store::ReportStore;
use terra_ops::tdr::TdrHttpClient;
use terra_ops::tsv::TsvTable;

type HttpApp = App<TdrHttpClient, FirecloudHttpClient, GcsHttpClient>;

#[derive(Parser)]
#[command(name = "terra-ops")]
#[command(about = "Operational toolkit for Terra workspaces, TDR datasets and GCS buckets")]
#[command(version)]
struct Cli {
    /// Path to terra-ops.json
    #[arg(long, global = true)]
    config: Option<String>,

    /// TDR environment for dataset commands
    #[arg(long, global = true, value_enum, default_value_t = TdrEnvironment::Prod)]
    env: TdrEnvironment,

    /// Do not save a JSON report under .terra-ops/reports
    #[arg(long, global = true)]
    no_report: bool,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Clone a workspace, optionally copying its bucket")]
    Clone(CloneArgs),
    #[command(about = "Upsert a TSV into a workspace data table")]
    Upsert(UpsertArgs),
    #[command(about = "Ingest a TSV into a TDR dataset table")]
    Ingest(IngestArgs),
    #[command(about = "Copy objects between bucket prefixes")]
    Copy(CopyArgs),
    #[command(about = "Compare two listings (gs:// prefixes or local directories)")]
    Compare(CompareArgs),
    #[command(about = "Migrate a TDR dataset to another environment")]
    Migrate(MigrateArgs),
    #[command(about = "Delete bucket objects no data table references")]
    Mop(MopArgs),
    #[command(about = "Create a full-view snapshot of a dataset")]
    Snapshot(SnapshotArgs),
    #[command(about = "List TDR datasets")]
    Datasets(DatasetsArgs),
    #[command(about = "List saved run reports")]
    Reports(ReportsArgs),
}

#[derive(Args)]
struct CloneArgs {
    source: WorkspaceRef,
    destination: WorkspaceRef,
    #[arg(long = "auth-domain")]
    auth_domains: Vec<String>,
    #[arg(long)]
    copy_files_with_prefix: Option<String>,
    #[arg(long)]
    copy_bucket: bool,
}

#[derive(Args)]
struct UpsertArgs {
    workspace: WorkspaceRef,
    tsv: Utf8PathBuf,
    #[arg(long)]
    entity_type: Option<String>,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct IngestArgs {
    dataset: DatasetId,
    table: String,
    tsv: Utf8PathBuf,
    #[arg(long, value_enum, default_value_t = UpdateStrategy::Append)]
    update_strategy: UpdateStrategy,
    #[arg(long)]
    infer_numbers: bool,
    #[arg(long)]
    load_tag: Option<String>,
}

#[derive(Args)]
struct CopyArgs {
    source: GcsUri,
    destination: GcsUri,
    #[arg(long)]
    force: bool,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct CompareArgs {
    source: ListingSource,
    destination: ListingSource,
    /// Exit with status 1 when the listings differ
    #[arg(long)]
    fail_on_diff: bool,
}

#[derive(Args)]
struct MigrateArgs {
    dataset: DatasetId,
    #[arg(long, value_enum)]
    to: TdrEnvironment,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    profile: Option<ProfileId>,
    #[arg(long)]
    page_size: Option<usize>,
    #[arg(long, value_enum, default_value_t = UpdateStrategy::Append)]
    update_strategy: UpdateStrategy,
    #[arg(long)]
    snapshot: bool,
}

#[derive(Args)]
struct MopArgs {
    workspace: WorkspaceRef,
    /// Actually delete; without it the candidates are only listed
    #[arg(long)]
    delete: bool,
    #[arg(long = "protect")]
    protected_prefixes: Vec<String>,
}

#[derive(Args)]
struct SnapshotArgs {
    dataset: DatasetId,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    profile: Option<ProfileId>,
}

#[derive(Args)]
struct DatasetsArgs {
    #[arg(long)]
    filter: Option<String>,
}

#[derive(Args)]
struct ReportsArgs {
    #[arg(long)]
    command: Option<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(ops) = report.downcast_ref::<OpsError>() {
                return ExitCode::from(map_exit_code(ops));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &OpsError) -> u8 {
    match error {
        OpsError::InvalidWorkspace(_)
        | OpsError::InvalidUuid(_)
        | OpsError::InvalidJobId(_)
        | OpsError::InvalidGcsUri(_)
        | OpsError::ConfigRead(_)
        | OpsError::ConfigParse(_)
        | OpsError::ConfigValue(_)
        | OpsError::Tsv(_)
        | OpsError::UnknownTable(_)
        | OpsError::MissingProfile(_)
        | OpsError::AlreadyExists(_)
        | OpsError::TdrStatus { status: 404, .. }
        | OpsError::FirecloudStatus { status: 404, .. }
        | OpsError::GcsStatus { status: 404, .. } => 2,
        OpsError::TdrHttp(_)
        | OpsError::TdrStatus { .. }
        | OpsError::FirecloudHttp(_)
        | OpsError::FirecloudStatus { .. }
        | OpsError::GcsHttp(_)
        | OpsError::GcsStatus { .. }
        | OpsError::Payload(_)
        | OpsError::Auth(_)
        | OpsError::MissingTool(_) => 3,
        OpsError::JobFailed { .. } => 4,
        OpsError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "terra_ops=info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.verbose {
        OutputMode::Verbose
    } else {
        OutputMode::Quiet
    };
    let sink = progress_for(mode);
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let reports = (!cli.no_report).then(ReportStore::new).transpose()?;

    match cli.command {
        Commands::Reports(args) => {
            let store = ReportStore::new()?;
            let entries = store.list_reports(args.command.as_deref())?;
            JsonOutput::print(&entries).into_diagnostic()?;
            Ok(ExitCode::SUCCESS)
        }
        // Two local directories need no credentials.
        Commands::Compare(CompareArgs {
            source: ListingSource::Local(source),
            destination: ListingSource::Local(destination),
            fail_on_diff,
        }) => {
            sink.event(ProgressEvent {
                message: format!("phase=Resolve; comparing {source} with {destination}"),
                elapsed: None,
            });
            let result = compare(
                &Listing::from_local(&source)?,
                &Listing::from_local(&destination)?,
            );
            finish_comparison(&result, fail_on_diff, reports.as_ref())
        }
        command => {
            let token = default_token()?;
            let app = build_app(&config, cli.env, &token)?;
            run_command(command, &app, &config, &token, sink, reports.as_ref())
        }
    }
}

fn run_command(
    command: Commands,
    app: &HttpApp,
    config: &ResolvedConfig,
    token: &str,
    sink: &dyn ProgressSink,
    reports: Option<&ReportStore>,
) -> miette::Result<ExitCode> {
    match command {
        Commands::Clone(args) => {
            let options = CloneOptions {
                auth_domains: args.auth_domains,
                copy_files_with_prefix: args.copy_files_with_prefix,
                copy_bucket: args.copy_bucket,
            };
            let result = app.clone_workspace(&args.source, &args.destination, options, sink)?;
            finish("clone", &result, reports)
        }
        Commands::Upsert(args) => {
            let table = TsvTable::read(&args.tsv)?;
            let options = UpsertOptions {
                entity_type: args.entity_type,
                dry_run: args.dry_run,
            };
            let result = app.upsert_table(&args.workspace, &table, options, sink)?;
            finish("upsert", &result, reports)
        }
        Commands::Ingest(args) => {
            let table = TsvTable::read(&args.tsv)?;
            let options = IngestOptions {
                update_strategy: args.update_strategy,
                infer_numbers: args.infer_numbers,
                load_tag: args.load_tag,
            };
            let result = app.ingest_table(&args.dataset, &args.table, &table, options, sink)?;
            finish("ingest", &result, reports)
        }
        Commands::Copy(args) => {
            let options = CopyOptions {
                force: args.force,
                dry_run: args.dry_run,
            };
            let result = app.copy_objects(&args.source, &args.destination, options, sink)?;
            let failed = !result.failed.is_empty();
            finish("copy", &result, reports)?;
            Ok(if failed {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Compare(args) => {
            let result = app.compare_listings(&args.source, &args.destination, sink)?;
            finish_comparison(&result, args.fail_on_diff, reports)
        }
        Commands::Migrate(args) => {
            let destination = tdr_client(config, args.to, token)?;
            let options = MigrateOptions {
                name: args.name,
                profile: args.profile,
                page_size: args.page_size,
                update_strategy: args.update_strategy,
                snapshot: args.snapshot,
            };
            let result = app.migrate_dataset(&destination, &args.dataset, options, sink)?;
            finish("migrate", &result, reports)
        }
        Commands::Mop(args) => {
            let protected_prefixes = if args.protected_prefixes.is_empty() {
                DEFAULT_PROTECTED_PREFIXES
                    .iter()
                    .map(|prefix| prefix.to_string())
                    .collect()
            } else {
                args.protected_prefixes
            };
            let options = MopOptions {
                dry_run: !args.delete,
                protected_prefixes,
            };
            let result = app.mop_workspace(&args.workspace, options, sink)?;
            let failed = !result.failed.is_empty();
            finish("mop", &result, reports)?;
            Ok(if failed {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Snapshot(args) => {
            let name = args.name.as_deref();
            let result = app.create_snapshot(&args.dataset, name, args.profile, sink)?;
            finish("snapshot", &result, reports)
        }
        Commands::Datasets(args) => {
            let result = app.list_datasets(args.filter.as_deref(), sink)?;
            JsonOutput::print(&result).into_diagnostic()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reports(_) => Ok(ExitCode::SUCCESS),
    }
}

fn finish<T: Serialize>(
    command: &str,
    result: &T,
    reports: Option<&ReportStore>,
) -> miette::Result<ExitCode> {
    if let Some(store) = reports {
        let path = store.save(command, result)?;
        tracing::info!(report = %path, "saved report");
    }
    JsonOutput::print(result).into_diagnostic()?;
    Ok(ExitCode::SUCCESS)
}

fn finish_comparison(
    result: &ListingComparison,
    fail_on_diff: bool,
    reports: Option<&ReportStore>,
) -> miette::Result<ExitCode> {
    finish("compare", result, reports)?;
    Ok(if fail_on_diff && !result.is_identical() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn tdr_client(
    config: &ResolvedConfig,
    env: TdrEnvironment,
    token: &str,
) -> Result<TdrHttpClient, OpsError> {
    let api = ApiClient::new(
        Platform::Tdr,
        config.tdr_url(env),
        token,
        config.http_timeout,
        config.max_retries,
    )?;
    Ok(TdrHttpClient::new(api))
}

fn build_app(
    config: &ResolvedConfig,
    env: TdrEnvironment,
    token: &str,
) -> Result<HttpApp, OpsError> {
    let firecloud = ApiClient::new(
        Platform::Firecloud,
        &config.firecloud_url,
        token,
        config.http_timeout,
        config.max_retries,
    )?;
    let gcs = ApiClient::new(
        Platform::Gcs,
        &config.gcs_url,
        token,
        config.http_timeout,
        config.max_retries,
    )?;
    Ok(App::new(
        tdr_client(config, env, token)?,
        FirecloudHttpClient::new(firecloud),
        GcsHttpClient::new(gcs),
        Settings::from(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> [OpsError; 3] {
        let message = || "missing".to_string();
        [
            OpsError::TdrStatus { status, message: message() },
            OpsError::FirecloudStatus { status, message: message() },
            OpsError::GcsStatus { status, message: message() },
        ]
    }

    #[test]
    fn not_found_is_a_usage_error() {
        for error in status(404) {
            assert_eq!(map_exit_code(&error), 2, "{error}");
        }
        for error in status(503) {
            assert_eq!(map_exit_code(&error), 3, "{error}");
        }
        let failed = OpsError::JobFailed {
            job_id: "j1".to_string(),
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(map_exit_code(&failed), 4);
    }
}
