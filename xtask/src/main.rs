//! Build automation tasks for Horang
//!
//! Currently generates the forwarder's CLI reference from its clap definition.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for Horang", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the forwarder CLI reference in Markdown
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

    let markdown = clap_markdown::help_markdown::<horang_forwarder::Cli>();

    let content = format!(
        r#"# horang-forwarder CLI Reference

Generated from the CLI source code. Last updated: {}.

`horang-forwarder` watches a directory tree, reads what each log file gained
since the previous poll, tags records carrying an `ip` field with country, city
and ASN, and ships them to Elasticsearch or stdout.

## Commands

{}

## Environment Variables

Every flag has an environment counterpart; flags win when both are given.

- `HORANG_ROOT` - Directory tree to watch
- `HORANG_POLL_INTERVAL_SECS` - Seconds between poll cycles (default: `10`)
- `HORANG_DESTINATION` - `elasticsearch` or `stdout`
- `HORANG_COMMIT_POLICY` - `on-success` (default) or `always`
- `HORANG_SKIP_EXTENSIONS` / `HORANG_SKIP_PREFIXES` - Comma-separated skip lists
- `HORANG_ES_URL`, `HORANG_ES_INDEX`, `HORANG_ES_USERNAME`, `HORANG_ES_PASSWORD`, `HORANG_ES_API_KEY`
- `HORANG_GEOIP_DIR` - Directory holding the GeoLite2 databases
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILTER` - Logging

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
