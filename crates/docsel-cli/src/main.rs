use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docsel_core::filter::{filter_all, filters_from_params};
use docsel_core::{parse, project, FieldTree};
use docsel_storage::{persistent, DocumentStore};
use serde_json::Value as JsonValue;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docsel")]
#[command(about = "docsel field selection and admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Parse a field selection and print its canonical form
    Parse {
        selection: String,
        /// Print the tree as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Filter and project a JSON array of documents
    Select {
        /// File holding a JSON array, `-` for stdin
        #[arg(default_value = "-")]
        input: String,
        #[arg(long)]
        fields: Option<String>,
        /// `<property><op>=<value>`, e.g. `name^=f` or `owner:(first)=ann`.
        /// `name==foo` spells the exact operator out; a value starting
        /// with `=` then needs it too (`name===x` matches `=x`)
        #[arg(long = "where")]
        filters: Vec<String>,
        /// Drop filters on properties outside this selection
        #[arg(long)]
        schema: Option<String>,
    },
    /// Replay a data directory and print live documents as JSON lines
    Dump {
        data_dir: PathBuf,
        #[arg(long)]
        collection: Option<String>,
    },
}

fn read_documents(input: &str) -> Result<Vec<JsonValue>> {
    let mut s = String::new();
    if input == "-" {
        std::io::stdin().read_to_string(&mut s)?;
    } else {
        s = std::fs::read_to_string(input).with_context(|| format!("reading {input}"))?;
    }
    match serde_json::from_str(&s)? {
        JsonValue::Array(docs) => Ok(docs),
        other => bail!("expected a JSON array of documents, got {}", kind(&other)),
    }
}

fn kind(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn select(
    docs: Vec<JsonValue>,
    fields: Option<&FieldTree>,
    filters: &[String],
    schema: Option<&FieldTree>,
) -> Result<Vec<JsonValue>> {
    let mut params = Vec::with_capacity(filters.len());
    for f in filters {
        let Some(at) = f.find('=') else {
            bail!("filter {f:?} is not <property><op>=<value>");
        };
        // a doubled `=` is the explicit exact operator followed by the separator
        let cut = if f[at + 1..].starts_with('=') { at + 1 } else { at };
        params.push((f[..cut].to_string(), f[cut + 1..].to_string()));
    }
    let filters = filters_from_params(params, schema);
    let docs = filter_all(docs, &filters);
    Ok(match fields {
        Some(tree) => docs.iter().map(|d| project(d, tree)).collect(),
        None => docs,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Parse { selection, json } => {
            let tree = parse(&selection)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                println!("{tree}");
            }
        }
        Cmd::Select {
            input,
            fields,
            filters,
            schema,
        } => {
            let fields = fields.as_deref().map(parse).transpose()?;
            let schema = schema.as_deref().map(parse).transpose()?;
            let docs = read_documents(&input)?;
            let out = select(docs, fields.as_ref(), &filters, schema.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Cmd::Dump {
            data_dir,
            collection,
        } => {
            let store = persistent::replay(&data_dir.join("wal"))?;
            let prefix = collection.map(|c| format!("{c}-"));
            for doc in store.all_documents() {
                let id = doc.get("_id").and_then(|v| v.as_str()).unwrap_or_default();
                if prefix.as_deref().map_or(true, |p| id.starts_with(p)) {
                    println!("{}", serde_json::to_string(&doc)?);
                }
            }
        }
    }
    Ok(())
}
