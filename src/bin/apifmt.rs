use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use apifmt::{format_with, Config, FormatError, Indent};
use clap::Parser;
use rayon::prelude::*;
use walkdir::WalkDir;

const EXTENSION: &str = "api";

/// `dir/...` selects every `.api` file below `dir`.
const RECURSIVE_SUFFIX: &str = "/...";

#[derive(Parser, Debug)]
#[command(name = "apifmt", version, about = "Formats .api service definition files")]
struct Cli {
    /// Files, directories, or `dir/...` for a recursive walk. Reads stdin
    /// when empty.
    paths: Vec<String>,
    /// Write the result back to the source files instead of stdout
    #[arg(short = 'w', long)]
    write: bool,
    /// Indent with this many spaces instead of a tab
    #[arg(long, value_name = "N")]
    indent: Option<u8>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            report(&e);
            ExitCode::from(2)
        }
    }
}

/// `Ok(false)` when some file failed; its errors are already printed.
fn run(cli: &Cli) -> Result<bool> {
    let config = Config {
        indent: cli.indent.map_or(Indent::Tab, Indent::Spaces),
    };

    if cli.paths.is_empty() {
        if cli.write {
            bail!("cannot use -w with standard input");
        }
        format_stdin(&config)?;
        return Ok(true);
    }

    let mut files = Vec::new();
    for arg in &cli.paths {
        collect_files(arg, &mut files)?;
    }
    tracing::debug!(target: "apifmt::cli", files = files.len(), write = cli.write, "formatting");

    let results: Vec<_> = files
        .par_iter()
        .map(|path| process_file(path, cli.write, &config).map(|out| (path, out)))
        .collect();

    let mut ok = true;
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    for r in results {
        match r {
            Ok((_, Some(out))) => stdout.write_all(&out)?,
            Ok((path, None)) => {
                tracing::debug!(target: "apifmt::cli", path = %path.display(), "rewritten");
            }
            Err(e) => {
                report(&e);
                ok = false;
            }
        }
    }
    Ok(ok)
}

fn format_stdin(config: &Config) -> Result<()> {
    let mut src = Vec::new();
    io::stdin()
        .read_to_end(&mut src)
        .context("reading standard input")?;
    let out = format_with(&src, "<standard input>", config)?;
    io::stdout().write_all(&out)?;
    Ok(())
}

/// Prints syntax errors one per line, anything else as a chain.
fn report(e: &anyhow::Error) {
    match e.downcast_ref::<FormatError>() {
        Some(FormatError::Syntax(list)) => {
            for d in list {
                eprintln!("{d}");
            }
        }
        _ => eprintln!("apifmt: {e:#}"),
    }
}

// =============================================================================
// File selection
// =============================================================================

fn is_api_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(EXTENSION)
}

fn collect_files(arg: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    if let Some(root) = arg.strip_suffix(RECURSIVE_SUFFIX) {
        let root = if root.is_empty() { "." } else { root };
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walking {root}"))?;
            if entry.file_type().is_file() && is_api_file(entry.path()) {
                out.push(entry.into_path());
            }
        }
        return Ok(());
    }

    let path = PathBuf::from(arg);
    let meta = fs::metadata(&path).with_context(|| format!("reading {arg}"))?;
    if meta.is_file() {
        // Named files are taken whatever their extension.
        out.push(path);
        return Ok(());
    }

    let mut found: Vec<PathBuf> = fs::read_dir(&path)
        .with_context(|| format!("reading directory {arg}"))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_api_file(p))
        .collect();
    found.sort();
    out.extend(found);
    Ok(())
}

// =============================================================================
// Per-file pipeline
// =============================================================================

/// Formats one file. Returns the output for stdout, or `None` once the file
/// has been rewritten in place.
fn process_file(path: &Path, write: bool, config: &Config) -> Result<Option<Vec<u8>>> {
    let src = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let out = format_with(&src, &path.to_string_lossy(), config)?;

    if !write {
        return Ok(Some(out));
    }
    if out == src {
        return Ok(None);
    }
    replace_file(path, &out)?;
    Ok(None)
}

/// Writes `contents` to a temporary sibling, then renames it over `path`.
/// The original is left untouched unless the rename happens.
fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let perms = fs::metadata(path)
        .with_context(|| format!("reading {}", path.display()))?
        .permissions();
    let name = path
        .file_name()
        .with_context(|| format!("{} is not a file name", path.display()))?;
    let tmp = path.with_file_name(format!(".{}.apifmt~", name.to_string_lossy()));

    let result = fs::write(&tmp, contents)
        .and_then(|()| fs::set_permissions(&tmp, perms))
        .and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("rewriting {}", path.display()));
    }
    Ok(())
}
