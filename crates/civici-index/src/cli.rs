//! Command-line definition for the `civici-index` binary

use crate::config::{
    IndexConfig, DEFAULT_CONCURRENCY, DEFAULT_HEADER_ROW, DEFAULT_OUTPUT_DIR,
    DEFAULT_PROGRESS_INTERVAL,
};
use clap::Parser;
use std::path::PathBuf;

/// Build the region/province/comune/street lookup shards from an address CSV
#[derive(Parser, Debug)]
#[command(name = "civici-index")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address CSV to read (`.gz` files are decompressed on the fly)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory that receives the shards; its previous contents are removed
    #[arg(short, long, env = "CIVICI_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Zero-based index of the header row; earlier rows are ignored
    #[arg(long, env = "CIVICI_HEADER_ROW", default_value_t = DEFAULT_HEADER_ROW)]
    pub header_row: usize,

    /// Field delimiter: a single ASCII character, or `tab`
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    pub delimiter: u8,

    /// Log a progress line every N rows
    #[arg(long, default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    pub progress_interval: u64,

    /// Maximum number of shards written at the same time
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn into_config(self) -> IndexConfig {
        IndexConfig::builder()
            .input(self.input)
            .output_dir(self.output_dir)
            .header_row(self.header_row)
            .delimiter(self.delimiter)
            .progress_interval(self.progress_interval)
            .concurrency(self.concurrency)
            .show_progress(!self.no_progress)
            .build()
    }
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    if value.eq_ignore_ascii_case("tab") || value == "\\t" {
        return Ok(b'\t');
    }

    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() && c != '"' && c != '\n' && c != '\r' => Ok(c as u8),
        _ => Err(format!(
            "delimiter must be one ASCII character or 'tab', got '{}'",
            value
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["civici-index", "indirizzi.csv"]).unwrap();
        let config = cli.into_config();
        assert_eq!(config.input, PathBuf::from("indirizzi.csv"));
        assert_eq!(config.header_row, DEFAULT_HEADER_ROW);
        assert_eq!(config.delimiter, b',');
        assert!(config.show_progress);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "civici-index",
            "in.csv",
            "-o",
            "out",
            "--header-row",
            "0",
            "--delimiter",
            ";",
            "--concurrency",
            "2",
            "--no-progress",
        ])
        .unwrap();
        let config = cli.into_config();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.header_row, 0);
        assert_eq!(config.delimiter, b';');
        assert_eq!(config.concurrency, 2);
        assert!(!config.show_progress);
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert_eq!(parse_delimiter("|").unwrap(), b'|');
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("é").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn test_input_is_required() {
        assert!(Cli::try_parse_from(["civici-index"]).is_err());
    }
}
