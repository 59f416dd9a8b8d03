use std::env;
use std::process::ExitCode;

use apifmt::{parse_file, Mode};

fn main() -> ExitCode {
    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: cargo run --example parse -- <file.api>");
        return ExitCode::from(2);
    };

    let src = match std::fs::read(&path) {
        Ok(src) => src,
        Err(e) => {
            eprintln!("{path}: {e}");
            return ExitCode::from(2);
        }
    };

    let (file, errors) = parse_file(&path, &src, Mode::default());
    if !errors.is_empty() {
        eprintln!("parse failed");
        for d in &errors {
            eprintln!("{:?} {d}", d.kind);
        }
        return ExitCode::from(1);
    }
    println!("{file:#?}");
    ExitCode::SUCCESS
}
