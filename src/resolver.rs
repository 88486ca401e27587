//! Static resolver pass for the **Rox** interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of slot lists tracking declared/defined/used).
//! 2. Report static errors (redeclaration, read in own initializer, misplaced
//!    `break`/`return`/`this`/`super`, self‑inheritance, clashing method
//!    signatures, unused locals, undefined globals).
//! 3. Record, for *each* variable occurrence, the `(depth, slot)` of the local
//!    it refers to. Occurrences with no entry are globals, looked up by name.
//!
//! Every diagnostic is collected; the pass never stops at the first one.
//! Globals live in a [`GlobalTable`] that outlives a single pass so later REPL
//! input can see earlier top‑level declarations. Changes to it are staged and
//! only committed when the pass succeeds.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::rc::Rc;

use log::{debug, info};

use crate::class::INITIALIZER;
use crate::error::LoxError;
use crate::expr::{Expr, ExprId};
use crate::stmt::{ClassDecl, FunctionDecl, Stmt};
use crate::token::{Token, TokenType};

/// Where a local lives: `depth` scopes out from the use, at index `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub depth: usize,
    pub slot: usize,
}

/// Resolver output: binding per variable‑like node.
pub type Bindings = HashMap<ExprId, Binding>;

/// Top‑level names known to a session; `true` once the name is defined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalTable {
    names: HashMap<String, bool>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with `names` already defined (natives).
    pub fn from_names<'n>(names: impl IntoIterator<Item = &'n str>) -> Self {
        Self {
            names: names
                .into_iter()
                .map(|name| (name.to_string(), true))
                .collect(),
        }
    }

    /// Reserve `name`. A name that is already defined stays readable, so
    /// `var a = a + 1;` at top level reads the previous `a`.
    pub fn declare(&mut self, name: &str) {
        self.names.entry(name.to_string()).or_insert(false);
    }

    pub fn define(&mut self, name: &str) {
        self.names.insert(name.to_string(), true);
    }

    /// `Some(defined?)` when the name is known.
    pub fn state(&self, name: &str) -> Option<bool> {
        self.names.get(name).copied()
    }
}

/// What kind of body we are inside.  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Lambda,
    Method,
    Initializer,
    Getter,
    StaticMethod,
}

/// Used to validate `this` and `super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

#[derive(Debug)]
struct Local {
    token: Token,
    defined: bool,
    used: bool,
}

#[derive(Debug, Default)]
struct Scope {
    names: HashMap<String, usize>,
    locals: Vec<Local>,
}

/// Resolver: tracks scopes, enforces static rules, and records binding
/// locations for the interpreter.
pub struct Resolver<'g> {
    globals: &'g mut GlobalTable,
    staged: GlobalTable,
    scopes: Vec<Scope>,
    bindings: Bindings,
    errors: Vec<LoxError>,
    current_function: FunctionType,
    current_class: ClassType,
    in_static: bool,
    loop_depth: usize,
}

impl<'g> Resolver<'g> {
    pub fn new(globals: &'g mut GlobalTable) -> Self {
        info!("Resolver instantiated");

        let staged: GlobalTable = globals.clone();

        Resolver {
            globals,
            staged,
            scopes: Vec::new(),
            bindings: Bindings::new(),
            errors: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            in_static: false,
            loop_depth: 0,
        }
    }

    /// Walk all top‑level statements. On success the staged global table is
    /// committed and the binding table returned; otherwise every diagnostic.
    pub fn resolve(mut self, statements: &[Stmt]) -> Result<Bindings, Vec<LoxError>> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        self.resolve_stmts(statements);

        if !self.errors.is_empty() {
            info!("Resolve pass failed with {} error(s)", self.errors.len());
            return Err(self.errors);
        }

        *self.globals = self.staged;

        info!("Resolve pass recorded {} binding(s)", self.bindings.len());

        Ok(self.bindings)
    }

    fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_stmts(statements);
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(name);
            }

            Stmt::Function(decl) => {
                // name is visible *inside* its own body
                if let Some(name) = &decl.name {
                    self.declare(name);
                    self.define(name);
                }
                self.resolve_function(decl, FunctionType::Function);
            }

            Stmt::Class(decl) => self.resolve_class(decl),

            Stmt::Expression(expr) | Stmt::Print(expr) => self.resolve_expr(expr),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch.as_deref() {
                    self.resolve_stmt(else_branch);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);

                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;
            }

            Stmt::Break(keyword) => {
                if self.loop_depth == 0 {
                    self.error(keyword, "Can't use 'break' outside of a loop.");
                }
            }

            Stmt::Return { keyword, value } => {
                match self.current_function {
                    FunctionType::None => {
                        self.error(keyword, "Can't return from top-level code.");
                    }
                    FunctionType::Initializer => {
                        self.error(keyword, "Can't return from an initializer.");
                    }
                    _ => {}
                }

                if let Some(expr) = value {
                    self.resolve_expr(expr);
                }
            }
        }
    }

    fn resolve_class(&mut self, decl: &ClassDecl) {
        let enclosing_class: ClassType = mem::replace(&mut self.current_class, ClassType::Class);

        // Declared before the superclass so inherited methods can name it.
        self.declare(&decl.name);
        self.define(&decl.name);

        if let Some(superclass) = &decl.superclass {
            if let Expr::Variable { name, .. } = superclass {
                if name.lexeme == decl.name.lexeme {
                    self.error(name, "A class can't inherit from itself.");
                }
            }

            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass);

            self.begin_scope();
            self.declare_receiver("super", &decl.name);
        }

        self.check_signatures(&decl.methods);
        self.check_signatures(&decl.static_methods);

        // Statics see neither `this` nor `super`; they live outside the `this` scope.
        let enclosing_static: bool = mem::replace(&mut self.in_static, true);

        for method in &decl.static_methods {
            if method.is_getter() {
                self.error(&method.keyword, "Static methods need a parameter list.");
            }
            self.resolve_function(method, FunctionType::StaticMethod);
        }

        self.in_static = false;

        self.begin_scope();
        self.declare_receiver("this", &decl.name);

        for method in &decl.methods {
            let kind: FunctionType = if method.is_getter() {
                FunctionType::Getter
            } else if method.display_name() == INITIALIZER {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };

            self.resolve_function(method, kind);
        }

        self.end_scope();

        if decl.superclass.is_some() {
            self.end_scope();
        }

        self.in_static = enclosing_static;
        self.current_class = enclosing_class;
    }

    /// Two methods of one table may share a name only with different arities.
    fn check_signatures(&mut self, methods: &[Rc<FunctionDecl>]) {
        let mut seen: HashSet<(&str, Option<usize>)> = HashSet::new();

        for method in methods {
            let signature = (
                method.display_name(),
                method.params.as_ref().map(Vec::len),
            );

            if !seen.insert(signature) {
                let message: String = match signature.1 {
                    Some(arity) => format!(
                        "A method named '{}' with {} parameter(s) is already declared in this class.",
                        signature.0, arity
                    ),
                    None => format!(
                        "A getter named '{}' is already declared in this class.",
                        signature.0
                    ),
                };

                self.errors.push(LoxError::resolve(&method.keyword, message));
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => self.resolve_expr(inner),

            Expr::Unary { right, .. } => self.resolve_expr(right),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.resolve_expr(condition);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }

            Expr::Variable { id, name } => self.resolve_local(*id, name, true),

            Expr::Assign { id, name, value } => {
                // First resolve RHS, then bind LHS
                self.resolve_expr(value);
                self.resolve_local(*id, name, false);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Lambda(decl) => self.resolve_function(decl, FunctionType::Lambda),

            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(value);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                } else if self.in_static {
                    self.error(keyword, "Can't use 'this' in a static method.");
                } else {
                    self.resolve_local(*id, keyword, true);
                }
            }

            Expr::Super { id, keyword, .. } => match self.current_class {
                ClassType::None => {
                    self.error(keyword, "Can't use 'super' outside of a class.");
                }
                ClassType::Class => {
                    self.error(keyword, "Can't use 'super' in a class with no superclass.");
                }
                ClassType::Subclass if self.in_static => {
                    self.error(keyword, "Can't use 'super' in a static method.");
                }
                ClassType::Subclass => self.resolve_local(*id, keyword, true),
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Parameters and body share one fresh scope, mirroring the call frame.
    fn resolve_function(&mut self, decl: &FunctionDecl, kind: FunctionType) {
        let enclosing_function: FunctionType = mem::replace(&mut self.current_function, kind);
        let enclosing_loops: usize = mem::replace(&mut self.loop_depth, 0);

        self.begin_scope();
        for param in decl.params() {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(&decl.body);
        self.end_scope();

        self.loop_depth = enclosing_loops;
        self.current_function = enclosing_function;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pop the innermost scope; a local nobody read is an error.
    fn end_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };

        for local in scope.locals.iter().filter(|local| !local.used) {
            self.errors.push(LoxError::resolve(
                &local.token,
                format!("Local variable '{}' is never used.", local.token.lexeme),
            ));
        }
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            self.staged.declare(&name.lexeme);
            return;
        };

        if scope.names.contains_key(&name.lexeme) {
            self.error(name, "Already a variable with this name in this scope.");
            return;
        }

        scope.names.insert(name.lexeme.clone(), scope.locals.len());
        scope.locals.push(Local {
            token: name.clone(),
            defined: false,
            used: false,
        });
    }

    fn define(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            self.staged.define(&name.lexeme);
            return;
        };

        if let Some(&slot) = scope.names.get(&name.lexeme) {
            scope.locals[slot].defined = true;
        }
    }

    /// Implicit `this` / `super` slot, exempt from the unused check.
    fn declare_receiver(&mut self, lexeme: &str, class_name: &Token) {
        let token_type: TokenType = if lexeme == "super" {
            TokenType::SUPER
        } else {
            TokenType::THIS
        };

        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(lexeme.to_string(), scope.locals.len());
            scope.locals.push(Local {
                token: Token::new(token_type, lexeme, class_name.line),
                defined: true,
                used: true,
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Bind a use to the innermost *defined* local of that name, or check it
    /// against the global table. A same‑named local that is still being
    /// initialized is skipped, so `{ var a = a + 1; }` reads the outer `a`.
    /// Only reads mark the local as used; an assignment target does not.
    fn resolve_local(&mut self, id: ExprId, name: &Token, is_read: bool) {
        let mut initializing: bool = false;

        for (depth, scope) in self.scopes.iter_mut().rev().enumerate() {
            if let Some(&slot) = scope.names.get(&name.lexeme) {
                let local: &mut Local = &mut scope.locals[slot];

                if local.defined {
                    local.used |= is_read;

                    debug!(
                        "Resolved '{}' at depth {}, slot {}",
                        name.lexeme, depth, slot
                    );

                    self.bindings.insert(id, Binding { depth, slot });
                    return;
                }

                initializing = true;
            }
        }

        match self.staged.state(&name.lexeme) {
            Some(true) => {
                debug!("Resolved '{}' as global", name.lexeme);
            }
            Some(false) => {
                self.error(name, "Can't read local variable in its own initializer.");
            }
            None if initializing => {
                self.error(name, "Can't read local variable in its own initializer.");
            }
            None => {
                let message: String = format!("Undefined variable '{}'.", name.lexeme);
                self.errors.push(LoxError::resolve(name, message));
            }
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.errors.push(LoxError::resolve(token, message));
    }
}
