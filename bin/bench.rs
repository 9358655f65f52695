use clap::{Arg, ArgAction, Command};
use csv_chunk_import::{
    ChunkPlanner, FieldDescriptor, ImportJob, ImportMode, ImportRunner, MemoryStore, TableSchema,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Times a full chunked import of a `gen` fixture into the in-memory store.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("bench")
        .arg(Arg::new("path").long("path").required(true).value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("per-request").long("per-request").default_value("500").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("delim").long("delim").default_value(","))
        .arg(Arg::new("test").long("test").help("Dry run: validate without writing").action(ArgAction::SetTrue))
        .get_matches();

    let path = matches.get_one::<PathBuf>("path").cloned().unwrap_or_default();
    let per_request = matches.get_one::<usize>("per-request").copied().unwrap_or(500);
    let delim = matches.get_one::<String>("delim").cloned().unwrap_or_else(|| ",".into());

    let schema = TableSchema::new(
        "tl_member",
        vec![
            FieldDescriptor::new("", "username").unique().required(),
            FieldDescriptor::new("", "email").unique(),
            FieldDescriptor::new("", "dateOfBirth").with_validation("date"),
            FieldDescriptor::new("", "groups").multiple(),
        ],
    );
    let job = ImportJob {
        id: "bench".into(),
        file_src: path.clone(),
        import_table: "tl_member".into(),
        import_mode: ImportMode::Insert,
        field_separator: delim,
        field_enclosure: "\"".into(),
        array_separator: "||".into(),
        selected_fields: schema.fields.iter().map(|f| f.name.clone()).collect(),
        skip_validation_fields: Default::default(),
        offset: 0,
        limit: 0,
        test_mode: matches.get_flag("test"),
        identity_field: "username".into(),
        charset: None,
    };

    let store = Arc::new(MemoryStore::with_table("tl_member"));
    let runner = ImportRunner::new(store, Arc::new(HashMap::from([("tl_member".to_string(), schema)])))
        .with_project_dir("");

    let start = Instant::now();
    let report = runner.run_all(&job, &ChunkPlanner::new(per_request)?, job.test_mode).await?;
    let elapsed = start.elapsed().as_secs_f64();
    let rps = (report.seen as f64) / elapsed;

    println!(
        "source={} rows={} accepted={} rejected={} per_request={}\nelapsed={:.1}s rows/sec={:.0}",
        path.display(),
        report.seen,
        report.accepted,
        report.rejected,
        per_request,
        elapsed,
        rps
    );
    Ok(())
}
