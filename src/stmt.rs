use std::rc::Rc;

use crate::expr::Expr;
use crate::token::Token;

/// A named function, method, getter, or lambda.
///
/// Shared behind `Rc` because every function value created from it keeps the
/// declaration alive, possibly longer than the source unit it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// `None` for lambdas.
    pub name: Option<Token>,

    /// `fun` keyword for functions and lambdas, the name token for methods.
    pub keyword: Token,

    /// `None` when the declaration has no parameter list at all (a getter).
    pub params: Option<Vec<Token>>,

    pub body: Vec<Stmt>,
}

impl FunctionDecl {
    pub fn arity(&self) -> usize {
        self.params.as_ref().map_or(0, Vec::len)
    }

    pub fn params(&self) -> &[Token] {
        self.params.as_deref().unwrap_or(&[])
    }

    pub fn is_getter(&self) -> bool {
        self.params.is_none()
    }

    /// Display name; lambdas have none.
    pub fn display_name(&self) -> &str {
        self.name.as_ref().map_or("lambda", |t| t.lexeme.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Token,

    /// Always an `Expr::Variable` when present.
    pub superclass: Option<Expr>,

    /// Instance methods and getters, in source order.
    pub methods: Vec<Rc<FunctionDecl>>,

    /// Methods marked with a leading `class` keyword.
    pub static_methods: Vec<Rc<FunctionDecl>>,
}

/// **Abstract‑Syntax‑Tree node** for *statements*.  A program is a sequence of
/// these nodes returned by [`crate::parser::Parser::parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr),

    Print(Expr),

    /// `"var" IDENT ("=" initializer)? ";"`
    Var {
        name: Token,
        initializer: Option<Expr>,
    },

    Function(Rc<FunctionDecl>),

    Class(ClassDecl),

    /// Braced scope containing zero or more declarations/statements.
    Block(Vec<Stmt>),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `while` loop; `for` loops are desugared into this.
    While {
        condition: Expr,
        body: Box<Stmt>,
    },

    Break(Token),

    Return {
        /// The `return` keyword token (for error locations).
        keyword: Token,

        /// Absent ⇒ `nil` is returned.
        value: Option<Expr>,
    },
}
