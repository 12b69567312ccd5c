use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use log::debug;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use lectern::{Result, Runtime, RuntimeConfig, Value};

fn print_usage() {
    println!("Usage: chalk [--no-jit] [FILE]");
    println!();
    println!("With FILE, evaluate every form in it; otherwise start a REPL.");
    println!();
    println!("Options:");
    println!("  --no-jit    Interpret everything; never compile lambdas");
    println!("  -h, --help  Show this message");
    println!();
    println!("Environment:");
    println!("  LECTERN_JIT, LECTERN_NATIVE_DEPTH, LECTERN_COMPILE_BOOTSTRAP,");
    println!("  LECTERN_FETCH_ROOT, RUST_LOG");
}

fn history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("lectern").join("chalk_history"))
}

/// True once every bracket opened in `src` outside strings and comments
/// has been closed.
fn is_complete(src: &str) -> bool {
    let mut depth: i64 = 0;
    let mut chars = src.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => loop {
                match chars.next() {
                    Some('\\') => {
                        chars.next();
                    }
                    Some('"') => break,
                    Some(_) => {}
                    None => return false,
                }
            },
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '#' if chars.peek() == Some(&'\\') => {
                chars.next();
                chars.next();
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

/// Print values and diagnostics; returns whether any form failed.
fn report(results: Vec<Result<Value>>, echo: bool) -> bool {
    let mut failed = false;
    for result in results {
        match result {
            Ok(Value::Unspecified) => {}
            Ok(value) => {
                if echo {
                    println!("{value}");
                }
            }
            Err(e) => {
                eprintln!("Error: {e}");
                failed = true;
            }
        }
    }
    failed
}

fn repl(rt: &Runtime) {
    println!("Lectern Scheme");
    println!("Type expressions to evaluate, or (exit) to quit");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not start line editor: {e}");
            process::exit(1);
        }
    };
    let history = history_path();
    if let Some(path) = &history {
        if rl.load_history(path).is_err() {
            debug!("no history at {}", path.display());
        }
    }

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "chalk> " } else { "  ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() && matches!(line.trim(), "(exit)" | "exit" | ",q") {
                    break;
                }
                buffer.push_str(&line);
                buffer.push('\n');
                if !is_complete(&buffer) {
                    continue;
                }
                let _ = rl.add_history_entry(buffer.trim());
                report(rt.submit(&buffer), true);
                report(rt.run_deferred(), true);
                buffer.clear();
            }
            Err(ReadlineError::Interrupted) => buffer.clear(),
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {e}");
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(dir) = path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        if let Err(e) = rl.save_history(path) {
            debug!("could not save history: {e}");
        }
    }
}

fn run_file(rt: &Runtime, filename: &str) -> std::result::Result<(), String> {
    let contents = fs::read_to_string(filename)
        .map_err(|e| format!("Failed to read file '{filename}': {e}"))?;
    let mut failed = report(rt.submit(&contents), false);
    failed |= report(rt.run_deferred(), false);
    if failed {
        Err(format!("{filename}: evaluation failed"))
    } else {
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let mut config = RuntimeConfig::from_env();
    let mut file = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "--no-jit" => config.jit = false,
            flag if flag.starts_with('-') => {
                eprintln!("Unknown option: {flag}");
                print_usage();
                process::exit(2);
            }
            path => file = Some(path.to_string()),
        }
    }

    let rt = Runtime::new(config);
    match file {
        Some(path) => {
            if let Err(e) = run_file(&rt, &path) {
                eprintln!("{e}");
                process::exit(1);
            }
        }
        None => repl(&rt),
    }
}
