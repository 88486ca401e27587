use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use chrono::Utc;
use log::{debug, info};

use crate::class::{LoxClass, LoxInstance, MethodTable, INITIALIZER};
use crate::environment::{Env, Environment};
use crate::error::{LoxError, Result};
use crate::expr::{Expr, ExprId, LiteralValue};
use crate::function::LoxFunction;
use crate::resolver::{Binding, Bindings};
use crate::stmt::{ClassDecl, Stmt};
use crate::token::{Token, TokenType};
use crate::value::{NativeFunction, Value};

/// Deepest chain of nested calls before execution is aborted.
pub const MAX_CALL_DEPTH: usize = 256;

/// How a statement finished. `Break` and `Return` unwind to the nearest loop
/// or call instead of travelling as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Return(Value),
}

pub struct Interpreter {
    globals: Env,
    environment: Env,
    bindings: Bindings,
    output: Box<dyn Write>,
    call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates a new Interpreter printing to stdout, with natives such as `clock`.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Same as [`Interpreter::new`] but `print` writes into `output`.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        info!("Initializing Interpreter");

        let globals: Env = Env::default();

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define_global(
            "clock",
            Some(Value::NativeFunction(Rc::new(NativeFunction {
                name: "clock",
                arity: 0,
                func: clock,
            }))),
        );

        Self {
            environment: Rc::clone(&globals),
            globals,
            bindings: Bindings::new(),
            output,
            call_depth: 0,
        }
    }

    /// Names currently defined at global scope (natives included).
    pub fn global_names(&self) -> Vec<String> {
        self.globals
            .borrow()
            .global_names()
            .map(str::to_string)
            .collect()
    }

    /// Merge a resolver pass into the session's binding table.
    pub fn add_bindings(&mut self, bindings: Bindings) {
        debug!("Adding {} binding(s)", bindings.len());

        self.bindings.extend(bindings);
    }

    /// Interprets a list of statements (a "program"). Stops at the first
    /// runtime error; effects of earlier statements stay in place.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        let mut outcome: Result<()> = Ok(());

        for stmt in statements {
            if let Err(err) = self.execute(stmt) {
                outcome = Err(err);
                break;
            }
        }

        self.output.flush()?;

        if outcome.is_ok() {
            info!("Interpretation completed successfully");
        }

        outcome
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;
                writeln!(self.output, "{}", value)?;

                debug!("Printed value: {}", value);
                Ok(Flow::Normal)
            }

            Stmt::Var { name, initializer } => {
                debug!("Defining variable '{}'", name.lexeme);

                let value: Option<Value> = initializer
                    .as_ref()
                    .map(|expr| self.evaluate(expr))
                    .transpose()?;

                self.define(name, value);
                Ok(Flow::Normal)
            }

            Stmt::Function(decl) => {
                let function = LoxFunction::new(
                    Rc::clone(decl),
                    Rc::clone(&self.environment),
                    false,
                );

                if let Some(name) = &decl.name {
                    debug!("Defining function '{}'", name.lexeme);
                    self.define(name, Some(Value::Function(Rc::new(function))));
                }

                Ok(Flow::Normal)
            }

            Stmt::Class(decl) => {
                self.execute_class(decl)?;
                Ok(Flow::Normal)
            }

            Stmt::Block(statements) => {
                let scope: Env = Environment::child_of(&self.environment);
                self.execute_block(statements, scope)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }

            Stmt::While { condition, body } => {
                debug!("Entering while loop");

                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }

                debug!("Exited while loop");
                Ok(Flow::Normal)
            }

            Stmt::Break(_) => Ok(Flow::Break),

            Stmt::Return { value, .. } => {
                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                debug!("Returning value: {}", value);
                Ok(Flow::Return(value))
            }
        }
    }

    /// Run `statements` inside `scope`, restoring the current scope however
    /// the block exits.
    pub fn execute_block(&mut self, statements: &[Stmt], scope: Env) -> Result<Flow> {
        let previous: Env = mem::replace(&mut self.environment, scope);

        let result: Result<Flow> = self.execute_all(statements);

        self.environment = previous;
        result
    }

    fn execute_all(&mut self, statements: &[Stmt]) -> Result<Flow> {
        for stmt in statements {
            match self.execute(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }

        Ok(Flow::Normal)
    }

    fn execute_class(&mut self, decl: &ClassDecl) -> Result<()> {
        debug!("Defining class '{}'", decl.name.lexeme);

        // The name exists (as nil) while the class body is being built.
        let slot: Option<usize> = self.define(&decl.name, Some(Value::Nil));

        let superclass: Option<Rc<LoxClass>> = match &decl.superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    let token: &Token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => &decl.name,
                    };
                    return Err(LoxError::runtime(token, "Superclass must be a class."));
                }
            },
            None => None,
        };

        let closure: Env = match &superclass {
            Some(class) => {
                let scope: Env = Environment::child_of(&self.environment);
                scope
                    .borrow_mut()
                    .define(Some(Value::Class(Rc::clone(class))));
                scope
            }
            None => Rc::clone(&self.environment),
        };

        let mut methods = MethodTable::new();
        let mut getters = MethodTable::new();
        let mut static_methods = MethodTable::new();

        for method in &decl.methods {
            let name: String = method.display_name().to_string();

            if method.is_getter() {
                let getter = LoxFunction::new(Rc::clone(method), Rc::clone(&closure), false);
                getters.insert(name, Rc::new(getter));
            } else {
                let is_initializer: bool = name == INITIALIZER;
                let function =
                    LoxFunction::new(Rc::clone(method), Rc::clone(&closure), is_initializer);
                methods.insert(name, Rc::new(function));
            }
        }

        for method in &decl.static_methods {
            let function = LoxFunction::new(Rc::clone(method), Rc::clone(&closure), false);
            static_methods.insert(method.display_name().to_string(), Rc::new(function));
        }

        let class = Value::Class(Rc::new(LoxClass {
            name: decl.name.lexeme.clone(),
            superclass,
            methods,
            static_methods,
            getters,
        }));

        match slot {
            Some(slot) => Environment::assign_at(&self.environment, 0, slot, &decl.name, class),
            None => self.globals.borrow_mut().assign_global(&decl.name, class),
        }
    }

    /// Bind `name` in the current scope. Returns the slot for locals, `None`
    /// when the name went into the global table.
    fn define(&mut self, name: &Token, value: Option<Value>) -> Option<usize> {
        if Rc::ptr_eq(&self.environment, &self.globals) {
            self.globals
                .borrow_mut()
                .define_global(&name.lexeme, value);
            None
        } else {
            Some(self.environment.borrow_mut().define(value))
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => {
                let right: Value = self.evaluate(right)?;

                match operator.token_type {
                    TokenType::MINUS => match right {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(LoxError::runtime(operator, "Operand must be a number.")),
                    },
                    TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),
                    _ => Err(LoxError::runtime(operator, "Invalid unary operator.")),
                }
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left: Value = self.evaluate(left)?;

                // Comma: sequence, keep the right value.
                if operator.token_type == TokenType::COMMA {
                    return self.evaluate(right);
                }

                let right: Value = self.evaluate(right)?;
                binary(operator, left, right)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left: Value = self.evaluate(left)?;

                let short_circuit: bool = if operator.token_type == TokenType::OR {
                    left.is_truthy()
                } else {
                    !left.is_truthy()
                };

                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value: Value = self.evaluate(value)?;

                match self.bindings.get(id) {
                    Some(&Binding { depth, slot }) => Environment::assign_at(
                        &self.environment,
                        depth,
                        slot,
                        name,
                        value.clone(),
                    )?,
                    None => self
                        .globals
                        .borrow_mut()
                        .assign_global(name, value.clone())?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee: Value = self.evaluate(callee)?;

                let mut args: Vec<Value> = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    args.push(self.evaluate(arg)?);
                }

                self.call(callee, paren, args)
            }

            Expr::Lambda(decl) => Ok(Value::Function(Rc::new(LoxFunction::new(
                Rc::clone(decl),
                Rc::clone(&self.environment),
                false,
            )))),

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => self.get_property(&instance, name),

                Value::Class(class) => class
                    .find_static(&name.lexeme)
                    .map(Value::Function)
                    .ok_or_else(|| {
                        LoxError::runtime(
                            name,
                            format!("Undefined static member '{}'.", name.lexeme),
                        )
                    }),

                _ => Err(LoxError::runtime(name, "Only instances have properties.")),
            },

            Expr::Set {
                object,
                name,
                value,
            } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    let value: Value = self.evaluate(value)?;
                    instance.set_field(&name.lexeme, value.clone());
                    Ok(value)
                }

                Value::Class(_) => Err(LoxError::runtime(name, "Static members cannot be set.")),

                _ => Err(LoxError::runtime(name, "Only instances have fields.")),
            },

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token) -> Result<Value> {
        match self.bindings.get(&id) {
            Some(&Binding { depth, slot }) => {
                Environment::get_at(&self.environment, depth, slot, name)
            }
            None => self.globals.borrow().get_global(name),
        }
    }

    /// Methods come first, then getters (run on access), then fields.
    fn get_property(&mut self, instance: &Rc<LoxInstance>, name: &Token) -> Result<Value> {
        let receiver = Value::Instance(Rc::clone(instance));

        if let Some(method) = instance.class.find_method(&name.lexeme) {
            return Ok(Value::Function(Rc::new(method.bind(receiver))));
        }

        if let Some(getter) = instance.class.find_getter(&name.lexeme) {
            return self.call_function(&getter.bind(receiver), Vec::new(), name);
        }

        if let Some(value) = instance.field(&name.lexeme) {
            return Ok(value);
        }

        Err(LoxError::runtime(
            name,
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    /// `super.method`: the superclass sits `depth` scopes out, `this` one
    /// scope closer.
    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> Result<Value> {
        let Some(&Binding { depth, slot }) = self.bindings.get(&id) else {
            return Err(LoxError::runtime(keyword, "Undefined variable 'super'."));
        };

        let Value::Class(superclass) = Environment::get_at(&self.environment, depth, slot, keyword)?
        else {
            return Err(LoxError::runtime(keyword, "Superclass must be a class."));
        };

        let receiver: Value =
            Environment::get_at(&self.environment, depth.saturating_sub(1), 0, keyword)?;

        if let Some(function) = superclass.find_method(&method.lexeme) {
            return Ok(Value::Function(Rc::new(function.bind(receiver))));
        }

        if let Some(getter) = superclass.find_getter(&method.lexeme) {
            return self.call_function(&getter.bind(receiver), Vec::new(), method);
        }

        Err(LoxError::runtime(
            method,
            format!("Undefined property '{}'.", method.lexeme),
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────────

    fn call(&mut self, callee: Value, paren: &Token, args: Vec<Value>) -> Result<Value> {
        match callee {
            Value::NativeFunction(native) => {
                debug!("Calling native function '{}'", native.name);

                check_arity(native.arity, args.len(), paren)?;
                (native.func)(&args).map_err(|message| LoxError::runtime(paren, message))
            }

            Value::Function(function) => {
                check_arity(function.arity(), args.len(), paren)?;
                self.call_function(&function, args, paren)
            }

            Value::Class(class) => {
                check_arity(class.arity(), args.len(), paren)?;

                let instance = Value::Instance(Rc::new(LoxInstance::new(Rc::clone(&class))));

                if let Some(initializer) = class.find_method(INITIALIZER) {
                    self.call_function(&initializer.bind(instance.clone()), args, paren)?;
                }

                Ok(instance)
            }

            _ => Err(LoxError::runtime(
                paren,
                "Can only call functions and classes.",
            )),
        }
    }

    /// Parameters fill slots `0..n` of a fresh scope under the closure; the
    /// body runs directly in that scope.
    fn call_function(
        &mut self,
        function: &LoxFunction,
        args: Vec<Value>,
        paren: &Token,
    ) -> Result<Value> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(LoxError::runtime(paren, "Stack overflow."));
        }

        debug!("Calling function '{}'", function.name());

        let scope: Env = Environment::child_of(&function.closure);
        {
            let mut scope = scope.borrow_mut();
            for arg in args {
                scope.define(Some(arg));
            }
        }

        self.call_depth += 1;
        let flow: Result<Flow> = self.execute_block(&function.declaration.body, scope);
        self.call_depth -= 1;

        let flow: Flow = flow?;

        if function.is_initializer {
            return Environment::get_at(&function.closure, 0, 0, paren);
        }

        match flow {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }
}

fn check_arity(expected: usize, got: usize, paren: &Token) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(LoxError::runtime(
            paren,
            format!("Expected {} arguments but got {}.", expected, got),
        ))
    }
}

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value> {
    match operator.token_type {
        TokenType::PLUS => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            _ => Err(LoxError::runtime(
                operator,
                "Operands must be two numbers or two strings.",
            )),
        },

        TokenType::EQUAL_EQUAL => Ok(Value::Bool(is_equal(operator, &left, &right)?)),
        TokenType::BANG_EQUAL => Ok(Value::Bool(!is_equal(operator, &left, &right)?)),

        _ => {
            let (Value::Number(a), Value::Number(b)) = (left, right) else {
                return Err(LoxError::runtime(operator, "Operands must be numbers."));
            };

            match operator.token_type {
                TokenType::MINUS => Ok(Value::Number(a - b)),
                TokenType::STAR => Ok(Value::Number(a * b)),
                TokenType::SLASH => {
                    // Divisors no larger than the smallest normal f64 count as zero.
                    if b.abs() <= f64::MIN_POSITIVE {
                        Err(LoxError::runtime(operator, "Division by zero."))
                    } else {
                        Ok(Value::Number(a / b))
                    }
                }
                TokenType::GREATER => Ok(Value::Bool(a > b)),
                TokenType::GREATER_EQUAL => Ok(Value::Bool(a >= b)),
                TokenType::LESS => Ok(Value::Bool(a < b)),
                TokenType::LESS_EQUAL => Ok(Value::Bool(a <= b)),
                _ => Err(LoxError::runtime(operator, "Invalid binary operator.")),
            }
        }
    }
}

/// Numbers compare by value; anything compared against `nil` is equal only
/// to `nil`. Every other pairing is a type error.
fn is_equal(operator: &Token, left: &Value, right: &Value) -> Result<bool> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(a == b),
        (Value::Nil, other) | (other, Value::Nil) => Ok(matches!(other, Value::Nil)),
        _ => Err(LoxError::runtime(
            operator,
            "Operands must both be numbers, or at least one nil.",
        )),
    }
}

fn clock(_args: &[Value]) -> std::result::Result<Value, String> {
    let seconds: f64 = Utc::now().timestamp_millis() as f64 / 1000.0;

    debug!("Native function 'clock' returned: {}", seconds);

    Ok(Value::Number(seconds))
}
