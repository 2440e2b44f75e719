//! Build automation tasks for GKDB
//!
//! - Generating the ingest CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for GKDB", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the gkdb-ingest CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<gkdb_ingest::Cli>();

    let content = format!(
        r#"# gkdb-ingest CLI Reference

Generated from the CLI source code on {}.

## Overview

`gkdb-ingest` loads survey detection tables and transient alert packets into
a Cassandra/ScyllaDB keyspace. Input files are spread over `--nfileprocesses`
ingest workers; each file's records are spread over `--nprocesses` insert
workers that write multi-row `INSERT` statements of `--bundlesize` rows.

## Quick Start

```bash
# Whitespace-separated detections, 4 files at a time, 8 writers per file
gkdb-ingest db.yaml /data/atlas/*.dph.gz \
  --table atlas_detections \
  --columns ra,dec,mag,dmag \
  --types float,float,float,float \
  --bundlesize 100 --nfileprocesses 4 --nprocesses 8

# Exposure metadata joined on the file name
gkdb-ingest db.yaml --fileoffiles files.txt \
  --table atlas_detections \
  --fktable exposures.tsv --fktablecols mjd,filter --fktablecoltypes float,str

# Alert packets, detections only
gkdb-ingest db.yaml ztf_public_20240101.avro --table ztf_candidates --skiphtm

# Check what would be written without a database
gkdb-ingest db.yaml exp1.dat --table atlas_detections --dry-run --verbose
```

## Database Configuration

```yaml
cassandra:
  local:
    username: gkdb
    password: secret
    keyspace: atlas
    hostname: [db1, db2]
```

Environment overrides: `GKDB_CASSANDRA_USERNAME`, `GKDB_CASSANDRA_PASSWORD`,
`GKDB_CASSANDRA_KEYSPACE`, `GKDB_CASSANDRA_HOSTS` (comma separated).

## Worker Logs

Every worker writes `<location><prefix>_<YYYYmmdd_HHMMSS>_<pid>_<label>.log`.
Ingest workers are labelled by index; insert workers by
`<ingest worker>.<file number>.<index>`.

## Commands

{}

## Environment Variables

- `GKDB_LOG_LEVEL`, `GKDB_LOG_OUTPUT`, `GKDB_LOG_FORMAT`, `GKDB_LOG_DIR`,
  `GKDB_LOG_FILE_PREFIX`, `GKDB_LOG_FILTER`, `GKDB_LOG_ANSI` - process logger settings
- `RUST_LOG` - additional filter directives

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
