//! Runtime scope chain.
//!
//! Local scopes are plain slot vectors: the resolver has already proved which
//! scope and slot every local use refers to, so lookups walk `depth` links and
//! index directly. The root scope of a session additionally keeps a by‑name
//! table for globals, which may be declared across separate REPL inputs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::error::{LoxError, Result};
use crate::token::Token;
use crate::value::Value;

/// Shared handle to a scope. Closures and bound methods keep their defining
/// chain alive through it.
pub type Env = Rc<RefCell<Environment>>;

/// One scope: ordered slots (`None` = declared but uninitialized) plus a link
/// to the enclosing scope.
#[derive(Debug, Default)]
pub struct Environment {
    slots: Vec<Option<Value>>,
    globals: HashMap<String, Option<Value>>,
    enclosing: Option<Env>,
}

impl Environment {
    /// A fresh root (global) scope.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enclosing(enclosing: Env) -> Self {
        Environment {
            slots: Vec::new(),
            globals: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wrap a child of `enclosing` in a shareable handle.
    pub fn child_of(enclosing: &Env) -> Env {
        Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(enclosing))))
    }

    // ───────────────────────────── slots ─────────────────────────────

    /// Append a slot and return its index.
    pub fn define(&mut self, value: Option<Value>) -> usize {
        self.slots.push(value);
        self.slots.len() - 1
    }

    /// Read `slot` in the scope `depth` links above `env`.
    pub fn get_at(env: &Env, depth: usize, slot: usize, name: &Token) -> Result<Value> {
        let scope: Env = Self::ancestor(env, depth, name)?;
        let scope = scope.borrow();

        match scope.slots.get(slot) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(LoxError::runtime(
                name,
                format!("Uninitialized variable '{}'.", name.lexeme),
            )),
            None => Err(LoxError::runtime(
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            )),
        }
    }

    /// Overwrite `slot` in the scope `depth` links above `env`.
    pub fn assign_at(
        env: &Env,
        depth: usize,
        slot: usize,
        name: &Token,
        value: Value,
    ) -> Result<()> {
        let scope: Env = Self::ancestor(env, depth, name)?;
        let mut scope = scope.borrow_mut();

        match scope.slots.get_mut(slot) {
            Some(entry) => {
                *entry = Some(value);
                Ok(())
            }
            None => Err(LoxError::runtime(
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            )),
        }
    }

    fn ancestor(env: &Env, depth: usize, name: &Token) -> Result<Env> {
        let mut scope: Env = Rc::clone(env);

        for _ in 0..depth {
            let parent: Option<Env> = scope.borrow().enclosing.clone();

            scope = parent.ok_or_else(|| {
                LoxError::runtime(
                    name,
                    format!("Undefined variable '{}'.", name.lexeme),
                )
            })?;
        }

        Ok(scope)
    }

    // ──────────────────────────── globals ────────────────────────────

    /// Declare (or redeclare) a global by name.
    pub fn define_global(&mut self, name: &str, value: Option<Value>) {
        debug!("Defining global '{}'", name);

        self.globals.insert(name.to_string(), value);
    }

    pub fn get_global(&self, name: &Token) -> Result<Value> {
        match self.globals.get(&name.lexeme) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(LoxError::runtime(
                name,
                format!("Uninitialized variable '{}'.", name.lexeme),
            )),
            None => Err(LoxError::runtime(
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            )),
        }
    }

    pub fn assign_global(&mut self, name: &Token, value: Value) -> Result<()> {
        match self.globals.get_mut(&name.lexeme) {
            Some(entry) => {
                *entry = Some(value);
                Ok(())
            }
            None => Err(LoxError::runtime(
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            )),
        }
    }

    /// Names currently bound in the global table.
    pub fn global_names(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }
}
