use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use env_logger::Builder;
use log::{debug, info};

use rox::error::LoxError;
use rox::scanner::Scanner;
use rox::session::Session;

/// Usage error (sysexits EX_USAGE).
const EXIT_USAGE: i32 = 64;

/// Stack for the interpreter thread; nested calls recurse on the host stack.
const INTERPRETER_STACK_SIZE: usize = 256 * 1024 * 1024;

#[derive(ClapParser, Debug)]
#[command(version, about = "Rox: a Lox language interpreter", long_about = None)]
pub struct Cli {
    /// Script to run. Starts an interactive prompt when omitted.
    script: Option<PathBuf>,

    /// Enable logging to app.log
    #[arg(long)]
    log: bool,

    /// Print the script's tokens instead of running it
    #[arg(long, value_enum, value_name = "FORMAT")]
    tokens: Option<TokenFormat>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TokenFormat {
    /// `TYPE lexeme literal`, one token per line
    Text,

    /// One JSON object per line
    Json,
}

/// Reads the contents of a file as UTF-8 text.
fn read_file(filename: &Path) -> Result<String> {
    info!("Reading file: {:?}", filename);

    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    let bytes = reader
        .read_to_end(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    String::from_utf8(buf)
        .map_err(LoxError::from)
        .context(format!("File {:?} is not valid UTF-8", filename))
}

fn init_logger() -> Result<()> {
    // Create or open the log file
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record.module_path().unwrap_or("<unnamed>");
            let module = module.strip_prefix("rox::").unwrap_or(module);
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Print every token of `source`; lexical errors go to stderr.
fn dump_tokens(source: &str, format: TokenFormat) -> Result<bool> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut tokenized = true;

    for token in Scanner::new(source.as_bytes()) {
        match token {
            Ok(token) => match format {
                TokenFormat::Text => writeln!(out, "{}", token)?,
                TokenFormat::Json => {
                    writeln!(out, "{}", serde_json::to_string(&token)?)?;
                }
            },

            Err(e) => {
                tokenized = false;
                debug!("Tokenization debug: {}", e);
                eprintln!("{}", e);
            }
        }
    }

    Ok(tokenized)
}

fn run_file(script: &Path) -> Result<()> {
    let source = match read_file(script) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(EXIT_USAGE);
        }
    };

    let mut session = Session::new();

    if let Err(e) = session.run(&source) {
        debug!("Run failed: {}", e);
        eprintln!("{}", e);
        process::exit(e.exit_code());
    }

    info!("Program executed successfully");
    Ok(())
}

/// Read-eval-print loop. Errors are reported and the session carries on.
fn run_prompt() -> Result<()> {
    let mut session = Session::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line.context("Failed to read from stdin")?;

        if let Err(e) = session.run(&line) {
            eprintln!("{}", e);
        }
    }

    info!("Prompt closed");
    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version are not errors
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let worker = thread::Builder::new()
        .name("rox".to_string())
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(move || dispatch(args))
        .context("Failed to start interpreter thread")?;

    worker
        .join()
        .map_err(|_| anyhow!("Interpreter thread panicked"))?
}

fn dispatch(args: Cli) -> Result<()> {
    match (args.script, args.tokens) {
        (Some(script), Some(format)) => {
            let source = match read_file(&script) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("{:#}", e);
                    process::exit(EXIT_USAGE);
                }
            };

            if !dump_tokens(&source, format)? {
                debug!("Tokenization failed, exiting with code 65");
                process::exit(65);
            }

            Ok(())
        }

        (None, Some(_)) => {
            eprintln!("Usage: rox --tokens <FORMAT> <SCRIPT>");
            process::exit(EXIT_USAGE);
        }

        (Some(script), None) => run_file(&script),

        (None, None) => run_prompt(),
    }
}
