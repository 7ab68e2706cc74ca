use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use flexstore::audit::{AuditLog, SharedAuditLog};
use flexstore::db::{find_profile, load_profiles, QueryOutcome};
use flexstore::export::{self, OutputFormat};
use flexstore::{BackendConfig, ColumnSpec, Selector, ServerConfig, SqlValue, Statement, Store, StoreConfig};

/// Dynamic-schema record store over PostgreSQL and SQLite
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Use a saved connection profile by name
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Use a SQLite database file instead of a server
    #[arg(long, global = true, conflicts_with = "profile")]
    sqlite: Option<PathBuf>,

    #[arg(long, global = true)]
    host: Option<String>,

    #[arg(long, global = true)]
    port: Option<u16>,

    #[arg(long = "db", global = true)]
    database: Option<String>,

    #[arg(long, global = true)]
    user: Option<String>,

    /// Append executed statements to the audit journal
    #[arg(long, global = true)]
    audit: bool,

    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one SQL statement
    Exec { sql: String },
    /// Read rows from a table
    Get {
        table: String,
        #[arg(long, conflicts_with = "filter")]
        id: Option<String>,
        /// Match rows where COL equals VAL
        #[arg(long = "where", value_name = "COL=VAL")]
        filter: Option<String>,
        /// Comma-separated columns to return
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },
    /// Store a JSON document file as a row
    PutJson {
        table: String,
        file: PathBuf,
        /// Upsert this row instead of inserting a new one
        #[arg(long, conflicts_with = "filter")]
        id: Option<String>,
        /// Replace the first row where COL equals VAL, inserting if none does
        #[arg(long = "where", value_name = "COL=VAL")]
        filter: Option<String>,
    },
    /// Print a stored JSON document
    GetJson {
        table: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// List a table's columns
    Columns { table: String },
    /// Drop columns
    Prune {
        table: String,
        /// Drop columns that hold no non-empty value
        #[arg(long, conflicts_with = "keep")]
        empty: bool,
        /// Drop every column except these (and id)
        #[arg(long, value_delimiter = ',', required_unless_present = "empty")]
        keep: Vec<String>,
    },
    /// Rebuild a table with a new column order
    Rearrange {
        table: String,
        /// Columns in their new order, optionally retyped as NAME:TYPE
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// List saved connection profiles
    Profiles,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flexstore=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Profiles = cli.command {
        return list_profiles();
    }

    let config = resolve_config(&cli)?;
    let store = Store::open(&config);
    let result = run(&store, &cli).await;

    if let Some(log) = store.audit_log() {
        persist_audit(log)?;
    }
    result
}

async fn run(store: &Store, cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Exec { sql } => match store.run(&Statement::raw(sql.as_str())).await? {
            QueryOutcome::Rows(result) => print!("{}", with_newline(export::render(&result, cli.format))),
            QueryOutcome::Affected { count, .. } => println!("{} rows affected", count),
        },
        Command::Get {
            table,
            id,
            filter,
            columns,
        } => {
            let selector = selector(id.as_deref(), filter.as_deref())?;
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            let result = store.query_rows(table, &selector, &columns).await?;
            print!("{}", with_newline(export::render(&result, cli.format)));
        }
        Command::PutJson {
            table,
            file,
            id,
            filter,
        } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let document: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let selector = selector(id.as_deref(), filter.as_deref())?;
            let id = store.write_document(table, &document, &selector).await?;
            println!("{}", id.to_text().unwrap_or_default());
        }
        Command::GetJson { table, id } => {
            let document = store.read_document(table, id.as_deref().map(parse_id)).await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Command::Columns { table } => {
            for column in store.columns(table).await? {
                let pk = if column.is_primary_key { " PRIMARY KEY" } else { "" };
                println!("{} {}{}", column.name, column.data_type, pk);
            }
        }
        Command::Prune { table, empty, keep } => {
            let dropped = if *empty {
                store.prune_empty_columns(table).await?
            } else {
                store.prune_columns(table, keep.as_slice()).await?
            };
            if dropped.is_empty() {
                println!("nothing to drop");
            }
            for column in dropped {
                println!("dropped {}", column);
            }
        }
        Command::Rearrange { table, columns } => {
            let target: Vec<ColumnSpec> = columns.iter().map(|c| ColumnSpec::parse(c)).collect();
            store.rearrange_columns(table, &target).await?;
            println!("rearranged {}", table);
        }
        Command::Profiles => list_profiles()?,
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = if let Some(path) = &cli.sqlite {
        StoreConfig::new(BackendConfig::embedded(path))
    } else if let Some(name) = &cli.profile {
        match find_profile(name)? {
            Some(profile) => profile.config,
            None => {
                let saved: Vec<String> = load_profiles()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| p.name)
                    .collect();
                bail!("no saved profile named {:?} (saved: {})", name, saved.join(", "));
            }
        }
    } else {
        StoreConfig::new(BackendConfig::Server(ServerConfig::default()))
    };

    if let BackendConfig::Server(server) = &mut config.backend {
        if let Some(host) = &cli.host {
            server.host = host.clone();
        }
        if let Some(port) = cli.port {
            server.port = port;
        }
        if let Some(database) = &cli.database {
            server.database = database.clone();
        }
        if let Some(user) = &cli.user {
            server.username = user.clone();
        }

        // Resolve password: profile, PGPASSWORD env var, then interactive prompt
        if server.password.is_empty() {
            if let Ok(pw) = std::env::var("PGPASSWORD") {
                server.password = pw;
            } else {
                let prompt = format!("Password for {}: ", server.display_string());
                server.password = rpassword::read_password_from_tty(Some(&prompt))?;
            }
        }
    }

    config.audit |= cli.audit;
    Ok(config)
}

fn list_profiles() -> Result<()> {
    let profiles = load_profiles()?;
    if profiles.is_empty() {
        println!("no saved profiles");
    }
    for profile in profiles {
        println!("{}\t{}", profile.name, profile.config.backend.display_string());
    }
    Ok(())
}

/// `--id` wins over `--where`; neither selects every row.
fn selector(id: Option<&str>, filter: Option<&str>) -> Result<Selector> {
    match (id, filter) {
        (Some(id), _) => Ok(Selector::Id(parse_id(id))),
        (None, Some(filter)) => {
            let (column, value) = filter
                .split_once('=')
                .ok_or_else(|| anyhow!("--where expects COL=VAL, got {:?}", filter))?;
            Ok(Selector::where_eq(column.trim(), value)?)
        }
        (None, None) => Ok(Selector::All),
    }
}

/// Numeric ids bind as integers, anything else as text.
fn parse_id(raw: &str) -> SqlValue {
    raw.trim()
        .parse::<i64>()
        .map(SqlValue::Int)
        .unwrap_or_else(|_| SqlValue::from(raw))
}

fn with_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn persist_audit(log: &SharedAuditLog) -> Result<()> {
    let path = AuditLog::default_path();
    let mut saved = AuditLog::load(&path)?;
    {
        let current = log.lock().map_err(|_| anyhow!("audit log lock poisoned"))?;
        let failed = current.failures().len();
        if failed > 0 {
            warn!(failed, path = %path.display(), "some statements failed; see the audit log");
        }
        for entry in current.entries() {
            saved.record(entry.clone());
        }
    }
    saved
        .save(&path)
        .with_context(|| format!("Failed to save audit log to {}", path.display()))
}
