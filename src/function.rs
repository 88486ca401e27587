use std::fmt;
use std::rc::Rc;

use crate::environment::{Env, Environment};
use crate::stmt::FunctionDecl;
use crate::value::Value;

/// A user function, method, getter, or lambda together with its closure.
pub struct LoxFunction {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Env,
    pub is_initializer: bool,
}

impl LoxFunction {
    pub fn new(declaration: Rc<FunctionDecl>, closure: Env, is_initializer: bool) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        self.declaration.display_name()
    }

    pub fn arity(&self) -> usize {
        self.declaration.arity()
    }

    /// Wrap the closure in a scope whose slot 0 holds `this`.
    pub fn bind(&self, receiver: Value) -> LoxFunction {
        let scope: Env = Environment::child_of(&self.closure);
        scope.borrow_mut().define(Some(receiver));

        LoxFunction::new(Rc::clone(&self.declaration), scope, self.is_initializer)
    }
}

impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name())
    }
}
