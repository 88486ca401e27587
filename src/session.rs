//! One interpreter session: the state that persists between units of source
//! (a whole file, or each REPL line) and the pipeline that runs them.

use std::fmt;
use std::io::{self, Write};

use log::info;
use thiserror::Error;

use crate::error::LoxError;
use crate::expr::ExprId;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::{GlobalTable, Resolver};
use crate::scanner::scan_tokens;

/// Why a unit of source did not run to completion.
#[derive(Debug, Error)]
pub enum RunError {
    /// Scan, parse, or resolve diagnostics. Nothing was executed.
    #[error("{}", Diagnostics(.0))]
    Static(Vec<LoxError>),

    /// Execution started and stopped at this error.
    #[error("{0}")]
    Runtime(LoxError),
}

impl RunError {
    /// Conventional sysexits code: 65 (data error) or 70 (software error).
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Static(_) => 65,
            RunError::Runtime(_) => 70,
        }
    }

    pub fn diagnostics(&self) -> &[LoxError] {
        match self {
            RunError::Static(errors) => errors,
            RunError::Runtime(error) => std::slice::from_ref(error),
        }
    }
}

/// One diagnostic per line.
struct Diagnostics<'a>(&'a [LoxError]);

impl fmt::Display for Diagnostics<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

pub struct Session {
    interpreter: Interpreter,
    globals: GlobalTable,
    next_id: ExprId,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// A session whose `print` output goes to `output`.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        let interpreter = Interpreter::with_output(output);
        let names: Vec<String> = interpreter.global_names();
        let globals = GlobalTable::from_names(names.iter().map(String::as_str));

        info!("Session started with {} global(s)", names.len());

        Self {
            interpreter,
            globals,
            next_id: 0,
        }
    }

    /// Scan, parse, resolve, and execute `source`.
    ///
    /// Any static diagnostic stops the unit before resolution or execution,
    /// and leaves the session exactly as it was.
    pub fn run(&mut self, source: &str) -> Result<(), RunError> {
        let (tokens, mut errors) = scan_tokens(source.as_bytes());

        let mut parser = Parser::with_id_base(&tokens, self.next_id);
        let statements = parser.parse();
        self.next_id = parser.next_id();

        errors.extend(parser.take_errors());

        if !errors.is_empty() {
            errors.sort_by_key(LoxError::line);
            return Err(RunError::Static(errors));
        }

        let bindings = Resolver::new(&mut self.globals)
            .resolve(&statements)
            .map_err(RunError::Static)?;

        self.interpreter.add_bindings(bindings);

        self.interpreter
            .interpret(&statements)
            .map_err(RunError::Runtime)
    }
}
