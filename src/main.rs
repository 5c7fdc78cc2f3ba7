use std::path::PathBuf;
use std::process::Command as OsCommand;
use std::sync::Arc;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use diesel::Connection;
use diesel::PgConnection;
use diesel_migrations::embed_migrations;
use diesel_migrations::EmbeddedMigrations;
use diesel_migrations::MigrationHarness;
use itertools::Itertools;
use uuid::Uuid;

use codegraph_indexer::catalog::CodebaseCatalog;
use codegraph_indexer::catalog::CodebaseRecord;
use codegraph_indexer::catalog::InMemoryCatalog;
use codegraph_indexer::config::default_config_path;
use codegraph_indexer::config::Configuration;
use codegraph_indexer::config::TaskConfigResolver;
use codegraph_indexer::config::TaskOverrides;
use codegraph_indexer::config::TaskSettings;
use codegraph_indexer::container::ContainerParserDriver;
use codegraph_indexer::container::ParserRunner;
use codegraph_indexer::credentials::CredentialSource;
use codegraph_indexer::credentials::StaticCredentialSource;
use codegraph_indexer::db::establish_pool;
use codegraph_indexer::db::models::Job;
use codegraph_indexer::graph::GraphSink;
use codegraph_indexer::graph::GraphWriter;
use codegraph_indexer::orchestrator::Orchestrator;
use codegraph_indexer::orchestrator::SubmitRequest;
use codegraph_indexer::storage::Storage;
use codegraph_indexer::task::JobType;
use codegraph_indexer::task::TaskName;

const DEFAULT_DB_POOL_SIZE: u32 = 10;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "codegraph-indexer", version, about = "Turns Git repositories into a typed code knowledge graph")]
struct Cli {
    /// Overrides the XDG-resolved config file location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a codebase for indexing.
    Submit {
        /// The codebase reference resolved through the codebase catalog.
        codebase_ref: String,

        #[arg(long, value_enum, default_value = "full")]
        job_type: JobTypeArg,

        /// Required for an incremental job; ignored for a full one.
        #[arg(long)]
        base_commit: Option<String>,

        /// Registers `codebase_ref` against this Git URL in the in-process
        /// catalog before submitting, bypassing a real external catalog.
        #[arg(long)]
        git_url: Option<String>,

        #[arg(long, default_value = "main")]
        branch: String,

        /// Per-task override, repeatable: `task=timeout_secs,retries`
        /// (e.g. `code_parsing=900,1`).
        #[arg(long = "override", value_parser = parse_task_override)]
        overrides: Vec<(TaskName, TaskSettings)>,
    },

    /// Poll a job's current state.
    Status { job_id: Uuid },

    /// List recently submitted jobs.
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,

        #[arg(long)]
        csv: bool,
    },

    /// Signal cooperative cancellation for a running job.
    Cancel { job_id: Uuid },

    #[command(subcommand)]
    Config(ConfigCommand),

    #[command(subcommand)]
    Db(DbCommand),

    /// Generate a shell completion script on stdout.
    #[command(hide = true)]
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Load and validate the effective configuration without running a job.
    Check,
}

#[derive(Subcommand)]
enum DbCommand {
    /// Open an interactive shell (`psql` or `pgcli`) against the job database.
    Cli,

    /// Apply any pending schema migrations.
    Migrate,

    /// List job rows directly, bypassing the orchestrator.
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: i64,

        #[arg(long)]
        csv: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum JobTypeArg {
    Full,
    Incremental,
}

impl From<JobTypeArg> for JobType {
    fn from(value: JobTypeArg) -> Self {
        match value {
            JobTypeArg::Full => JobType::Full,
            JobTypeArg::Incremental => JobType::Incremental,
        }
    }
}

fn parse_task_override(s: &str) -> std::result::Result<(TaskName, TaskSettings), String> {
    let (name, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected 'task=timeout_secs,retries', got '{s}'"))?;

    let name = match name {
        "git_sync" => TaskName::GitSync,
        "code_parsing" => TaskName::CodeParsing,
        "graph_update" => TaskName::GraphUpdate,
        "cleanup" => TaskName::Cleanup,
        other => return Err(format!("unknown task '{other}'")),
    };

    let (timeout_secs, retries) = rest
        .split_once(',')
        .ok_or_else(|| format!("expected 'timeout_secs,retries', got '{rest}'"))?;

    Ok((
        name,
        TaskSettings {
            timeout_secs: timeout_secs.parse().map_err(|e| format!("invalid timeout: {e}"))?,
            retries: retries.parse().map_err(|e| format!("invalid retry count: {e}"))?,
        },
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,codegraph_indexer=debug")
        }))
        .init();

    let cli = Cli::parse();
    let config_path = default_config_path(cli.config)?;

    match cli.command {
        Command::Submit {
            codebase_ref,
            job_type,
            base_commit,
            git_url,
            branch,
            overrides,
        } => {
            let config = Arc::new(Configuration::load(&config_path)?);
            let (orchestrator, catalog) = build_orchestrator(Arc::clone(&config)).await?;

            if let Some(git_url) = git_url {
                catalog.insert(CodebaseRecord {
                    id: codebase_ref.clone(),
                    display_name: codebase_ref.clone(),
                    git_url,
                    default_branch: branch,
                    language_hint: None,
                    last_indexed_commit: None,
                });
            }

            let mut task_overrides = TaskOverrides::new();
            for (name, settings) in overrides {
                task_overrides = task_overrides.with(name, settings);
            }

            let mut request = SubmitRequest::new(codebase_ref, job_type.into()).with_overrides(task_overrides);
            if let Some(base_commit) = base_commit {
                request = request.with_base_commit(base_commit);
            }

            let job_id = orchestrator.submit(request).await?;
            println!("{job_id}");
        }

        Command::Status { job_id } => {
            let config = Arc::new(Configuration::load(&config_path)?);
            let (orchestrator, _catalog) = build_orchestrator(config).await?;
            let job = orchestrator.status(job_id).await?;
            print_job(&job);
        }

        Command::List { limit, csv } => {
            let config = Arc::new(Configuration::load(&config_path)?);
            let (orchestrator, _catalog) = build_orchestrator(config).await?;
            let jobs = orchestrator.list_recent(limit).await?;
            display_jobs(&jobs, csv)?;
        }

        Command::Cancel { job_id } => {
            let config = Arc::new(Configuration::load(&config_path)?);
            let (orchestrator, _catalog) = build_orchestrator(config).await?;
            orchestrator.cancel(job_id).await?;
            println!("cancellation requested for {job_id}");
        }

        Command::Config(ConfigCommand::Check) => {
            let config = Configuration::load(&config_path)?;
            config.validate()?;

            let resolver = TaskConfigResolver::new(config.tasks());
            println!("configuration at {} is valid", config_path.display());
            for name in TaskName::PIPELINE_ORDER {
                let effective = resolver.resolve(name, &TaskOverrides::new());
                println!("  {name}: timeout={:?} retries={}", effective.timeout, effective.retries);
            }
            for lang in config.container().languages() {
                println!("  language {}: image={}", lang.language, lang.image);
            }
        }

        Command::Db(DbCommand::Cli) => {
            let config = Configuration::load(&config_path)?;
            db_cli(config.database_url())?;
        }

        Command::Db(DbCommand::Migrate) => {
            let config = Configuration::load(&config_path)?;
            let mut conn = PgConnection::establish(config.database_url())
                .with_context(|| format!("failed to connect to {}", config.database_url()))?;
            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|e| anyhow!("failed to run pending migrations: {e}"))?;
            println!("migrations applied");
        }

        Command::Db(DbCommand::Jobs { limit, csv }) => {
            let config = Configuration::load(&config_path)?;
            let pool = establish_pool(config.database_url(), DEFAULT_DB_POOL_SIZE)?;
            let mut conn = pool.get().context("failed to acquire a database connection")?;
            let jobs = Job::recent(&mut conn, limit)?;
            display_jobs(&jobs, csv)?;
        }

        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "codegraph-indexer", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn build_orchestrator(config: Arc<Configuration>) -> Result<(Arc<Orchestrator>, Arc<InMemoryCatalog>)> {
    let db_pool = establish_pool(config.database_url(), DEFAULT_DB_POOL_SIZE)?;

    let docker_host = config.container().docker_host().as_deref();
    let container_driver: Arc<dyn ParserRunner> = Arc::new(ContainerParserDriver::connect(
        docker_host,
        config.container().image_pull_timeout(),
    )?);

    let graph_writer = GraphWriter::connect(config.graph()).await?;
    graph_writer.ensure_schema().await?;
    let graph_sink: Arc<dyn GraphSink> = Arc::new(graph_writer);

    let storage = Storage::new(config.storage().clone());
    let catalog = Arc::new(InMemoryCatalog::new());
    let catalog_dyn: Arc<dyn CodebaseCatalog> = catalog.clone();

    let credentials: Arc<dyn CredentialSource> = Arc::new(StaticCredentialSource::new(
        config.git().oauth_token().clone(),
        config.graph().user().clone(),
        config.graph().password().clone(),
    ));

    let progress = codegraph_indexer::util::progress::ProgressSink::default();

    let orchestrator = Orchestrator::new(
        config,
        db_pool,
        catalog_dyn,
        credentials,
        container_driver,
        graph_sink,
        storage,
        progress,
    );

    Ok((orchestrator, catalog))
}

fn print_job(job: &Job) {
    println!("id:            {}", job.id);
    println!("codebase:      {}", job.codebase_id);
    println!("type:          {}", job.job_type);
    println!("state:         {}", job.state);
    println!("base commit:   {}", job.base_commit.as_deref().unwrap_or("-"));
    println!("started at:    {}", job.started_at.map(|t| t.to_string()).unwrap_or_else(|| "-".into()));
    println!("finished at:   {}", job.finished_at.map(|t| t.to_string()).unwrap_or_else(|| "-".into()));
    if let Some(code) = &job.error_code {
        println!("error:         {code}: {}", job.error_message.as_deref().unwrap_or(""));
    }
}

/// Renders job rows as an ASCII table (a TTY) or CSV, matching this
/// codebase's existing `db` subcommand display convention.
fn display_jobs(jobs: &[Job], csv: bool) -> Result<()> {
    let headers = ["id", "codebase", "type", "state", "created_at"]
        .into_iter()
        .map(|name| {
            let mut column = ascii_table::Column::default();
            column.header = name.into();
            column.align = ascii_table::Align::Left;
            column
        })
        .collect::<Vec<_>>();

    let rows: Vec<Vec<String>> = jobs
        .iter()
        .map(|job| {
            vec![
                job.id.to_string(),
                job.codebase_id.clone(),
                job.job_type.clone(),
                job.state.clone(),
                job.created_at.to_string(),
            ]
        })
        .collect();

    if rows.is_empty() {
        println!("no jobs found");
        return Ok(());
    }

    if csv {
        let mut writer = csv::WriterBuilder::new().from_writer(vec![]);
        for row in &rows {
            writer.write_record(row)?;
        }
        let bytes = writer.into_inner().map_err(|e| anyhow!("failed to flush csv writer: {e}"))?;
        print!("{}", String::from_utf8(bytes)?);
    } else if atty::is(atty::Stream::Stdout) {
        let mut table = ascii_table::AsciiTable::default();
        table.max_width = terminal_size::terminal_size().map(|(w, _)| w.0 as usize).unwrap_or(80);
        for (i, column) in headers.into_iter().enumerate() {
            table.columns.insert(i, column);
        }
        table.print(rows);
    } else {
        for row in rows {
            println!("{}", row.iter().join(" "));
        }
    }

    Ok(())
}

struct DbConnectionParts {
    host: String,
    port: u16,
    user: String,
    name: String,
}

fn parse_database_url(database_url: &str) -> Result<DbConnectionParts> {
    let url = url::Url::parse(database_url).context("invalid database_url")?;
    Ok(DbConnectionParts {
        host: url.host_str().unwrap_or("localhost").to_string(),
        port: url.port().unwrap_or(5432),
        user: url.username().to_string(),
        name: url.path().trim_start_matches('/').to_string(),
    })
}

trait PgCliCommand {
    fn run(&self, dbcc: &DbConnectionParts) -> Result<()>;
}

struct Psql(PathBuf);

impl PgCliCommand for Psql {
    fn run(&self, dbcc: &DbConnectionParts) -> Result<()> {
        run_inheriting(
            OsCommand::new(&self.0)
                .arg(format!("--dbname={}", dbcc.name))
                .arg(format!("--host={}", dbcc.host))
                .arg(format!("--port={}", dbcc.port))
                .arg(format!("--username={}", dbcc.user)),
        )
    }
}

struct PgCli(PathBuf);

impl PgCliCommand for PgCli {
    fn run(&self, dbcc: &DbConnectionParts) -> Result<()> {
        run_inheriting(
            OsCommand::new(&self.0)
                .arg("--host")
                .arg(&dbcc.host)
                .arg("--port")
                .arg(dbcc.port.to_string())
                .arg("--username")
                .arg(&dbcc.user)
                .arg(&dbcc.name),
        )
    }
}

fn run_inheriting(command: &mut OsCommand) -> Result<()> {
    let status = command
        .stdin(std::process::Stdio::inherit())
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit())
        .status()
        .context("failed to spawn database shell")?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("database shell exited with status {status}"))
    }
}

/// Shells out to `psql` or `pgcli`, whichever is on `$PATH`, against the
/// job-state database (mirrors this codebase's `db cli` subcommand).
fn db_cli(database_url: &str) -> Result<()> {
    let dbcc = parse_database_url(database_url)?;

    if let Ok(path) = which::which("psql") {
        return Psql(path).run(&dbcc);
    }
    if let Ok(path) = which::which("pgcli") {
        return PgCli(path).run(&dbcc);
    }

    Err(anyhow!("neither psql nor pgcli was found on PATH"))
}
