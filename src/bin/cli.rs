//! Stratum CLI
//!
//! Operator tool for inspecting and editing tables in a local warehouse.

use clap::{Parser, Subcommand};
use stratum::{
    Config, Engine, Field, FieldType, Predicate, Record, Result, Schema, StratumError, Table, Value,
};
use tracing_subscriber::{fmt, EnvFilter};

/// Stratum CLI
#[derive(Parser, Debug)]
#[command(name = "stratum-cli")]
#[command(about = "CLI for Stratum snapshot-versioned tables")]
#[command(version)]
struct Args {
    /// Warehouse directory
    #[arg(short, long, default_value = "./stratum_warehouse")]
    warehouse: String,

    /// Table namespace
    #[arg(short, long, default_value = "default")]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a table (no-op if it already exists)
    Create {
        /// Table name
        table: String,

        /// Column as name:type[:required], type is long, double or string
        #[arg(short, long = "field", required = true)]
        fields: Vec<String>,
    },

    /// List tables in the namespace
    Tables,

    /// Append one record given as field=value pairs
    Append {
        table: String,
        values: Vec<String>,
    },

    /// Print every record, optionally filtered by field=value
    Scan {
        table: String,

        #[arg(long = "where")]
        filter: Option<String>,
    },

    /// Print the first record whose field equals value
    Get {
        table: String,
        field: String,
        value: String,
    },

    /// Delete every record whose field equals value
    Delete {
        table: String,
        field: String,
        value: String,
    },

    /// Replace records whose field equals value with the given field=value pairs
    Update {
        table: String,
        field: String,
        value: String,
        values: Vec<String>,
    },

    /// Print the table's snapshot history
    History {
        table: String,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stratum=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder().warehouse_dir(&args.warehouse).build();
    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open warehouse: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&engine, &args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
        std::process::exit(1);
    }
}

fn run(engine: &Engine, args: &Args) -> Result<()> {
    let ns = args.namespace.as_str();

    match &args.command {
        Commands::Create { table, fields } => {
            let schema = parse_schema(fields)?;
            let table = engine.create_or_load_table(ns, table, &schema)?;
            println!("{}: {}", table.identifier(), table.schema());
        }
        Commands::Tables => {
            for identifier in engine.list_tables(ns)? {
                println!("{}", identifier);
            }
        }
        Commands::Append { table, values } => {
            let table = engine.load_table(ns, table)?;
            let record = parse_record(&table, values)?;
            let ack = engine.append(&table, &[record])?;
            print_ack("appended", ack.records_added, ack.snapshot_id);
        }
        Commands::Scan { table, filter } => {
            let table = engine.load_table(ns, table)?;
            let predicate = match filter {
                Some(filter) => {
                    let (field, value) = split_pair(filter)?;
                    Some(Predicate::eq(field, parse_value(&table, field, value)?))
                }
                None => None,
            };

            let mut count = 0;
            for record in engine.scan(&table, predicate.as_ref())? {
                println!("{}", record?);
                count += 1;
            }
            eprintln!("({} records)", count);
        }
        Commands::Get { table, field, value } => {
            let table = engine.load_table(ns, table)?;
            let value = parse_value(&table, field, value)?;
            match engine.find_one(&table, field, value)? {
                Some(record) => println!("{}", record),
                None => println!("(not found)"),
            }
        }
        Commands::Delete { table, field, value } => {
            let table = engine.load_table(ns, table)?;
            let value = parse_value(&table, field, value)?;
            let ack = engine.delete_where(&table, field, value)?;
            print_ack("deleted", ack.records_deleted, ack.snapshot_id);
        }
        Commands::Update { table, field, value, values } => {
            let table = engine.load_table(ns, table)?;
            let value = parse_value(&table, field, value)?;
            let record = parse_record(&table, values)?;
            let ack = engine.update_where(&table, field, value, record)?;
            print_ack("replaced", ack.records_deleted, ack.snapshot_id);
        }
        Commands::History { table } => {
            let table = engine.load_table(ns, table)?;
            for snapshot in engine.history(&table)? {
                let summary = &snapshot.summary;
                println!(
                    "{:>6}  {:<9}  +{} -{} files  +{} -{} records  \
                     total {} records in {} files  @{}",
                    snapshot.id.to_string(),
                    summary.operation.to_string(),
                    summary.added_files,
                    summary.removed_files,
                    summary.added_records,
                    summary.removed_records,
                    summary.total_records,
                    summary.total_files,
                    snapshot.timestamp_ms,
                );
            }
        }
    }
    Ok(())
}

fn print_ack(verb: &str, records: u64, snapshot: Option<stratum::SnapshotId>) {
    match snapshot {
        Some(id) => println!("{} {} records (snapshot {})", verb, records, id),
        None => println!("nothing to do"),
    }
}

/// `name:type[:required]` definitions, ids assigned in order from 1
fn parse_schema(defs: &[String]) -> Result<Schema> {
    let mut fields = Vec::with_capacity(defs.len());
    for (i, def) in defs.iter().enumerate() {
        let parts: Vec<&str> = def.split(':').collect();
        let (name, ty, required) = match parts.as_slice() {
            [name, ty] => (*name, *ty, false),
            [name, ty, "required"] => (*name, *ty, true),
            _ => return Err(invalid(format!("bad field definition '{}'", def))),
        };
        let ty = match ty {
            "long" => FieldType::Long,
            "double" => FieldType::Double,
            "string" => FieldType::String,
            other => return Err(invalid(format!("unknown field type '{}'", other))),
        };

        let id = i as u32 + 1;
        fields.push(if required {
            Field::required(id, name, ty)
        } else {
            Field::optional(id, name, ty)
        });
    }
    Schema::new(fields)
}

fn parse_record(table: &Table, pairs: &[String]) -> Result<Record> {
    let mut record = Record::new();
    for pair in pairs {
        let (field, value) = split_pair(pair)?;
        record.set(field, parse_value(table, field, value)?);
    }
    Ok(record)
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .ok_or_else(|| invalid(format!("expected field=value, got '{}'", pair)))
}

/// Parse `raw` as the declared type of `field`
fn parse_value(table: &Table, field: &str, raw: &str) -> Result<Value> {
    let field = table
        .schema()
        .field(field)
        .ok_or_else(|| invalid(format!("unknown field '{}'", field)))?;

    match field.field_type {
        FieldType::Long => raw
            .parse::<i64>()
            .map(Value::Long)
            .map_err(|e| invalid(format!("{}: {}", field.name, e))),
        FieldType::Double => raw
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|e| invalid(format!("{}: {}", field.name, e))),
        FieldType::String => Ok(Value::String(raw.to_string())),
    }
}

fn invalid(message: String) -> StratumError {
    StratumError::Validation(message)
}
