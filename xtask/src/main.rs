//! Build automation tasks for civici
//!
//! - `generate-cli-docs`: regenerate `CLI.md` from the clap definition

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for civici", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the civici-index command reference in Markdown
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

    let markdown = clap_markdown::help_markdown::<civici_index::Cli>();

    let content = format!(
        r#"# civici-index Reference

`civici-index` reads the national street-number CSV and writes the JSON shards
served under `public/data`:

- `regioni_province.json`: region name to sorted province names
- `comuni/<PROVINCIA>.json`: sorted comuni of one province
- `strade/<PROVINCIA>_<COMUNE>.json`: streets of one comune with their civic numbers
- `manifest.json`: shard counts and SHA-256 of every file written

The output directory is emptied before the shards are written. A run that
fails while reading the input leaves it untouched.

## Quick Start

```bash
cargo run --release -p civici-index -- data/civici.csv.gz --output-dir public/data
```

## Options

{}

## Environment Variables

- `CIVICI_OUTPUT_DIR` - Output directory (default: `public/data`)
- `CIVICI_HEADER_ROW` - Zero-based header row (default: `3`)
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILTER` - Logging overrides
- `RUST_LOG` - Additional tracing filter directives

Variables can also be placed in a `.env` file in the working directory.

## Exit Status

- `0` - every file was written
- `1` - the input was rejected, or at least one file could not be written
- `2` - invalid command-line usage

---

*This file is generated. To update, run `cargo xtask generate-cli-docs`.*
"#,
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("CLI.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
