//! Command-line front-end for the pytd stub parser.
//!
//! `pytdc <file>` parses a stub and prints it back in canonical form:
//!
//! - `--name` - Module name (top-level declarations print prefixed with it)
//! - `--python-version` - Target version, e.g. `2.7.6` or `3.6`
//! - `--platform` - Target platform for `sys.platform` conditions
//! - `--json` - Emit the resolved module as JSON instead of source

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use pytd_ast::print_module;
use pytd_parser::{parse_string, Options};

#[derive(Parser)]
#[command(name = "pytdc", version, about = "Parse pytd type stubs")]
struct Cli {
    /// Stub file to parse, or `-` for stdin
    file: PathBuf,

    /// Module name; defaults to a digest of the source
    #[arg(long)]
    name: Option<String>,

    /// Target Python version, e.g. 2.7.6
    #[arg(long = "python-version", default_value = "2.7.6")]
    python_version: String,

    /// Target platform
    #[arg(long, default_value = "linux")]
    platform: String,

    /// Emit the resolved module as JSON instead of canonical source
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let (source, filename) = read_source(&cli.file)?;
    let options = Options {
        name: cli.name.clone(),
        filename,
        python_version: parse_version(&cli.python_version)?,
        platform: cli.platform.clone(),
    };

    let module = parse_string(&source, &options).map_err(|e| e.to_string())?;
    if cli.json {
        let rendered = serde_json::to_string_pretty(&module)
            .map_err(|e| format!("failed to serialize module: {e}"))?;
        println!("{rendered}");
    } else {
        print!("{}", print_module(&module));
    }
    Ok(())
}

fn read_source(path: &PathBuf) -> Result<(String, Option<String>), String> {
    if path.as_os_str() == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        return Ok((source, None));
    }
    let source =
        fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    Ok((source, Some(path.display().to_string())))
}

/// Parse `2.7.6` into `[2, 7, 6]`.
fn parse_version(text: &str) -> Result<Vec<u32>, String> {
    let parts: Result<Vec<u32>, _> = text.split('.').map(str::parse).collect();
    match parts {
        Ok(parts) if !parts.is_empty() => Ok(parts),
        _ => Err(format!("invalid python version: {text}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_parse() {
        assert_eq!(parse_version("2.7.6").unwrap(), vec![2, 7, 6]);
        assert_eq!(parse_version("3").unwrap(), vec![3]);
        assert!(parse_version("").is_err());
        assert!(parse_version("3.x").is_err());
    }
}
