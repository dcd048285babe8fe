//! CLI driver for tsbench backends.

mod error;
mod workload;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use snafu::{ResultExt, ensure};
use tracing_subscriber::EnvFilter;
use tsbench_core::backend::dataset::DatasetBackend;
use tsbench_core::backend::parquet::ParquetBackend;
use tsbench_core::backend::session::memory::MemorySession;
use tsbench_core::backend::session::{RemoteBackend, SessionEndpoint};
use tsbench_core::{Backend, FieldMap, Gateway, Properties, Status};
use tsbench_datafusion::SqlBackend;

use crate::{
    error::{
        CliError, CliResult, ConfigSnafu, ConnectSnafu, InvalidArgumentSnafu,
        PropertiesFileSnafu, PropertyOverrideSnafu, SqlSnafu,
    },
    workload::{Mix, Workload},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    /// Remote-session adapter over an in-process store (dry runs)
    Session,
    /// Single Parquet file with row-group pruning
    Parquet,
    /// Batched scanner over the same Parquet file
    Dataset,
    /// DataFusion SQL over the same Parquet file
    Sql,
}

fn make_backend(kind: BackendArg, props: &Properties) -> CliResult<Box<dyn Backend>> {
    let backend: Box<dyn Backend> = match kind {
        BackendArg::Session => {
            let endpoint = SessionEndpoint::from_properties(props).context(ConfigSnafu)?;
            Box::new(RemoteBackend::connect(MemorySession::new(), &endpoint).context(ConnectSnafu)?)
        }
        BackendArg::Parquet => {
            Box::new(ParquetBackend::from_properties(props).context(ConfigSnafu)?)
        }
        BackendArg::Dataset => {
            Box::new(DatasetBackend::from_properties(props).context(ConfigSnafu)?)
        }
        BackendArg::Sql => Box::new(SqlBackend::from_properties(props).context(SqlSnafu)?),
    };
    Ok(backend)
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Insert a run of synthetic records
    Load {
        #[arg(long, default_value_t = 1000)]
        records: u64,

        /// First numeric key
        #[arg(long, default_value_t = 0)]
        start: i64,

        /// Bytes per generated field value
        #[arg(long = "value-len", default_value_t = 100)]
        value_len: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Read one record
    Read {
        /// Harness key, e.g. user42
        #[arg(long)]
        key: String,
    },

    /// Scan `count` keys starting at `start`
    Scan {
        /// Harness key, e.g. user42
        #[arg(long)]
        start: String,

        #[arg(long, default_value_t = 10)]
        count: usize,
    },

    /// Run a random mix of reads and scans over a key range
    Run {
        #[arg(long, default_value_t = 1000)]
        records: u64,

        #[arg(long, default_value_t = 0)]
        start: i64,

        #[arg(long, default_value_t = 1000)]
        operations: u64,

        #[arg(long = "read-proportion", default_value_t = 0.5)]
        read_proportion: f64,

        #[arg(long = "max-scan-length", default_value_t = 100)]
        max_scan_length: u64,

        /// Load the key range in this process before running
        #[arg(long, default_value_t = false)]
        load: bool,

        #[arg(long = "value-len", default_value_t = 100)]
        value_len: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[derive(Debug, Parser)]
#[command(name = "tsbench", about = "Drive tsbench storage backends")]
struct Cli {
    /// Property override in `key=value` form (repeatable, wins over -P)
    #[arg(short = 'p', long = "property", value_name = "KEY=VALUE", global = true)]
    properties: Vec<String>,

    /// Properties file with one `key=value` per line
    #[arg(short = 'P', long = "properties-file", global = true)]
    properties_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BackendArg::Parquet, global = true)]
    backend: BackendArg,

    #[command(subcommand)]
    cmd: Command,
}

fn load_properties(file: Option<&PathBuf>, overrides: &[String]) -> CliResult<Properties> {
    let mut props = match file {
        Some(path) => Properties::from_file(path).context(PropertiesFileSnafu { path })?,
        None => Properties::new(),
    };
    for raw in overrides {
        ensure!(
            raw.contains('='),
            InvalidArgumentSnafu {
                what: "property override",
                value: raw.as_str(),
                reason: "expected key=value",
            }
        );
        let parsed = Properties::parse(raw).context(PropertyOverrideSnafu { raw: raw.as_str() })?;
        props.extend(parsed);
    }
    Ok(props)
}

fn format_fields(fields: &FieldMap) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{name}={}", String::from_utf8_lossy(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// OK and NOT_FOUND are answers; anything else fails the command.
fn check(operation: &'static str, key: &str, status: Status) -> CliResult<()> {
    match status {
        Status::Ok | Status::NotFound => Ok(()),
        status => Err(CliError::Operation {
            operation,
            key: key.to_string(),
            status,
        }),
    }
}

fn finish(mut gw: Gateway) -> CliResult<()> {
    let name = gw.backend_name();
    match gw.cleanup() {
        Status::Ok => Ok(()),
        status => Err(CliError::Operation {
            operation: "cleanup",
            key: name.to_string(),
            status,
        }),
    }
}

fn cmd_load(
    mut gw: Gateway,
    props: &Properties,
    start: i64,
    records: u64,
    value_len: usize,
    seed: u64,
) -> CliResult<()> {
    let began = Instant::now();
    let mut workload = Workload::from_properties(props, value_len, seed).context(ConfigSnafu)?;
    let backend = gw.backend_name();
    workload.load(&mut gw, start, records)?;
    finish(gw)?;
    println!(
        "Loaded {records} records into {backend} table {} (elapsed_ms: {})",
        workload.table(),
        began.elapsed().as_millis()
    );
    Ok(())
}

fn cmd_read(mut gw: Gateway, table: &str, key: &str) -> CliResult<()> {
    let mut row = FieldMap::new();
    let status = gw.read(table, key, None, &mut row);
    check("read", key, status)?;
    println!("status: {status}");
    if status.is_ok() {
        println!("{}", format_fields(&row));
    }
    finish(gw)
}

fn cmd_scan(mut gw: Gateway, table: &str, start: &str, count: usize) -> CliResult<()> {
    let mut rows = Vec::new();
    let status = gw.scan(table, start, count, None, &mut rows);
    check("scan", start, status)?;
    println!("status: {status}");
    for (idx, row) in rows.iter().enumerate() {
        println!("[{idx}] {}", format_fields(row));
    }
    finish(gw)
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let props = load_properties(cli.properties_file.as_ref(), &cli.properties)?;
    let backend = make_backend(cli.backend, &props)?;
    let gw = Gateway::from_properties(backend, &props).context(ConfigSnafu)?;
    let table = Workload::from_properties(&props, 0, 0)
        .context(ConfigSnafu)?
        .table()
        .to_string();

    match cli.cmd {
        Command::Load {
            records,
            start,
            value_len,
            seed,
        } => cmd_load(gw, &props, start, records, value_len, seed),
        Command::Read { key } => cmd_read(gw, &table, &key),
        Command::Scan { start, count } => cmd_scan(gw, &table, &start, count),
        Command::Run {
            records,
            start,
            operations,
            read_proportion,
            max_scan_length,
            load,
            value_len,
            seed,
        } => {
            ensure!(
                records > 0,
                InvalidArgumentSnafu {
                    what: "--records",
                    value: records.to_string(),
                    reason: "must be positive",
                }
            );
            ensure!(
                (0.0..=1.0).contains(&read_proportion),
                InvalidArgumentSnafu {
                    what: "--read-proportion",
                    value: read_proportion.to_string(),
                    reason: "must be between 0 and 1",
                }
            );
            ensure!(
                max_scan_length > 0,
                InvalidArgumentSnafu {
                    what: "--max-scan-length",
                    value: max_scan_length.to_string(),
                    reason: "must be positive",
                }
            );

            let mut gw = gw;
            let mut workload =
                Workload::from_properties(&props, value_len, seed).context(ConfigSnafu)?;
            if load {
                workload.load(&mut gw, start, records)?;
            }
            let summary = workload.run(
                &mut gw,
                Mix {
                    start,
                    records,
                    operations,
                    read_proportion,
                    max_scan_length,
                },
            );
            println!("{summary}");
            finish(gw)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a second subscriber can only come from tests in the same process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
