use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use csv_chunk_import::{Catalog, EngineConfig, ImportRunner, MemoryStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn job_arg() -> Arg {
    Arg::new("job").long("job").required(true).help("Import job id from the catalog")
}

fn test_arg() -> Arg {
    Arg::new("test")
        .long("test")
        .help("Validate without writing to the destination")
        .action(ArgAction::SetTrue)
}

fn cli() -> Command {
    Command::new("import")
        .about("Chunked CSV import")
        .subcommand_required(true)
        .arg(Arg::new("catalog").long("catalog").required(true).value_parser(clap::value_parser!(PathBuf)).global(true))
        .arg(Arg::new("config").long("config").value_parser(clap::value_parser!(PathBuf)).global(true))
        .arg(Arg::new("sqlite").long("sqlite").help("SQLite database to import into (in-memory table when omitted)").value_parser(clap::value_parser!(PathBuf)).global(true))
        .subcommand(
            Command::new("plan")
                .about("Print the mount payload with the chunk URL stack")
                .arg(job_arg())
                .arg(Arg::new("task-id").long("task-id").default_value("1"))
                .arg(Arg::new("token").long("token").required(true)),
        )
        .subcommand(
            Command::new("run")
                .about("Import one (offset, limit) window")
                .arg(job_arg())
                .arg(Arg::new("offset").long("offset").default_value("0").value_parser(clap::value_parser!(usize)))
                .arg(Arg::new("limit").long("limit").default_value("0").value_parser(clap::value_parser!(usize)))
                .arg(test_arg()),
        )
        .subcommand(
            Command::new("run-all")
                .about("Import every planned window in order")
                .arg(job_arg())
                .arg(test_arg()),
        )
}

async fn open_store(matches: &ArgMatches, table: &str) -> anyhow::Result<Arc<dyn Store>> {
    match matches.get_one::<PathBuf>("sqlite") {
        #[cfg(feature = "sqlite")]
        Some(path) => Ok(Arc::new(csv_chunk_import::SqliteStore::open(path)?)),
        #[cfg(not(feature = "sqlite"))]
        Some(_) => anyhow::bail!("built without the `sqlite` feature"),
        None => {
            let store = MemoryStore::new();
            store.create_table(table).await;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let (name, sub) = matches.subcommand().context("missing subcommand")?;

    let catalog_path = matches.get_one::<PathBuf>("catalog").context("--catalog is required")?;
    let catalog = Catalog::load(catalog_path)
        .await
        .with_context(|| format!("loading catalog {}", catalog_path.display()))?;
    let config = EngineConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path)).await?;
    let job_id = sub.get_one::<String>("job").context("--job is required")?;
    let job = catalog.job(job_id)?.clone();

    let store = open_store(&matches, &job.import_table).await?;
    let runner = ImportRunner::new(store, Arc::new(catalog))
        .with_rules(config.rule_registry()?)
        .with_project_dir(&config.project_dir);

    let output = match name {
        "plan" => {
            let count = runner.count_rows(&job).await?;
            let task_id = sub.get_one::<String>("task-id").map(String::as_str).unwrap_or("1");
            let token = sub.get_one::<String>("token").context("--token is required")?;
            let response = config.planner()?.mount(&job, count, task_id, token, &config.url_template()?);
            serde_json::to_string_pretty(&response)?
        }
        "run" => {
            let offset = sub.get_one::<usize>("offset").copied().unwrap_or(0);
            let limit = sub.get_one::<usize>("limit").copied().unwrap_or(0);
            let report = runner.run(&job, offset, limit, sub.get_flag("test")).await?;
            serde_json::to_string_pretty(&report)?
        }
        "run-all" => {
            let report = runner.run_all(&job, &config.planner()?, sub.get_flag("test")).await?;
            serde_json::to_string_pretty(&report)?
        }
        other => anyhow::bail!("unknown subcommand '{other}'"),
    };
    println!("{output}");
    Ok(())
}
