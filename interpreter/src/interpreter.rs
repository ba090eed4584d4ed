use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::rc::Rc;

use ahash::AHashMap;
use log::{debug, trace};
use reflox_core::{Literal, Scanner, Token, TokenIndex, Type};

use crate::ast::{Expr, ExprVisitor, FunctionDecl, Stmt, StmtVisitor};
use crate::callable::{Callable, Class, Function, Instance};
use crate::env::{Env, Environment};
use crate::error::{Error, RunError};
use crate::limits::MAX_CALL_DEPTH;
use crate::native;
use crate::parser::Parser;
use crate::reference::Reference;
use crate::resolver::{ResolvedStmts, Resolver};
use crate::stack::ensure_sufficient_stack;
use crate::stdlib;
use crate::value::Value;

/// How a statement finished. `return` unwinds through enclosing blocks and loops as a value
/// instead of an error.
#[derive(Debug, PartialEq)]
pub(crate) enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter {
    globals: Env,
    env: Env,
    locals: AHashMap<TokenIndex, usize>,
    // Owned so that token indices, and therefore resolved locals, stay unique across every piece
    // of source this interpreter runs: REPL lines and imported modules alike.
    scanner: Scanner,
    pub(crate) stdout: Rc<RefCell<dyn Write>>,
    depth: usize,
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn Write>>) -> Self {
        let globals = Environment::new().into_env();
        native::install(&mut globals.borrow_mut());

        Interpreter {
            env: Rc::clone(&globals),
            globals,
            locals: AHashMap::new(),
            scanner: Scanner::new(),
            stdout,
            depth: 0,
        }
    }

    /// Binds the process arguments to the `argv` global.
    pub fn with_args(self, args: Vec<String>) -> Self {
        let argv = args.into_iter().map(Value::from).collect();
        self.define_global("argv", Value::array(argv));
        self
    }

    /// Runs a piece of source through the whole pipeline. Nothing is executed if lexing, parsing
    /// or resolution reported a problem. A runtime error stops the remaining statements of this
    /// source only, the interpreter stays usable.
    pub fn run(&mut self, src: &str) -> Result<(), RunError> {
        let mut stream = self.scanner.scan_tokens(src);
        let tokens: Vec<Token> = stream.by_ref().collect();
        let mut errors: Vec<Error> = stream.into_errors().into_iter().map(Error::from).collect();
        debug!("scanned {} tokens", tokens.len());

        let parsed = match Parser::new(&tokens).parse() {
            Ok(parsed) => Some(parsed),
            Err(parse_errors) => {
                errors.extend(parse_errors);
                None
            }
        };

        let parsed = match parsed {
            Some(parsed) if errors.is_empty() => parsed,
            _ => {
                errors.sort_by_key(Error::line);
                return Err(RunError::Static(errors));
            }
        };
        debug!("parsed {} statements", parsed.0.len());

        let resolved = Resolver::new()
            .resolve(parsed)
            .map_err(RunError::Static)?;
        debug!("resolved {} local references", resolved.locals.len());

        self.interpret(resolved).map_err(|err| {
            debug!("execution aborted: {}", err);
            RunError::Runtime(err)
        })
    }

    pub fn interpret(&mut self, resolved: ResolvedStmts) -> Result<(), Error> {
        self.locals.extend(resolved.locals);
        for stmt in &resolved.stmts {
            self.execute(stmt)?;
        }
        Ok(())
    }

    pub(crate) fn define_global(&self, name: &str, value: Value) {
        self.globals.borrow_mut().define(name, value);
    }

    /// Runs `f` with `env` as the current environment, restoring the previous one afterwards
    /// whether or not `f` succeeded.
    pub(crate) fn with_env<T>(
        &mut self,
        env: Env,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let previous = std::mem::replace(&mut self.env, env);
        let res = f(self);
        self.env = previous;
        res
    }

    pub(crate) fn execute_block_with_env(
        &mut self,
        stmts: &[Stmt],
        env: Env,
    ) -> Result<Flow, Error> {
        self.with_env(env, |interpreter| {
            for stmt in stmts {
                if let Flow::Return(value) = interpreter.execute(stmt)? {
                    return Ok(Flow::Return(value));
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<Flow, Error> {
        ensure_sufficient_stack(|| self.visit_stmt(stmt))
    }

    /// Evaluates an expression and follows any reference it produced.
    pub(crate) fn evaluate(&mut self, expr: &Expr) -> Result<Value, Error> {
        let value = self.evaluate_raw(expr)?;
        self.dereference(value)
    }

    /// Evaluates an expression without following references. Only variable declarations keep
    /// the raw value, which is how a variable becomes an alias.
    pub(crate) fn evaluate_raw(&mut self, expr: &Expr) -> Result<Value, Error> {
        ensure_sufficient_stack(|| self.visit_expr(expr))
    }

    pub(crate) fn call_value(
        &mut self,
        callee: &Callable,
        paren: &Token,
        args: &[Value],
    ) -> Result<Value, Error> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Error::runtime_error(paren, "Stack depth exceeded."));
        }

        trace!("calling {} with {} arguments", callee.name(), args.len());
        self.depth += 1;
        let res = ensure_sufficient_stack(|| callee.call(self, paren, args));
        self.depth -= 1;
        res
    }

    pub(crate) fn run_module(
        &mut self,
        src: &str,
        keyword: &Token,
        name: &str,
    ) -> Result<(), Error> {
        debug!("running module '{}'", name);
        let globals = Rc::clone(&self.globals);
        let outcome = self.with_env(globals, |interpreter| Ok(interpreter.run(src)))?;

        match outcome {
            Ok(()) => Ok(()),
            Err(RunError::Runtime(err)) => Err(err),
            Err(err @ RunError::Static(_)) => Err(Error::runtime_error(
                keyword,
                &format!("Could not compile module '{}'.\n{}", name, err),
            )),
        }
    }

    fn undefined_variable(name: &Token) -> Error {
        Error::runtime_error(name, &format!("Undefined variable '{}'.", name.lexeme))
    }

    /// Reads a variable without following a reference stored in it.
    fn lookup_variable(&self, name: &Token) -> Result<Value, Error> {
        let value = match self.locals.get(&name.idx) {
            Some(dist) => self.env.borrow().get_at(*dist, &name.lexeme),
            None => self.globals.borrow().get(&name.lexeme),
        };

        value.ok_or_else(|| Interpreter::undefined_variable(name))
    }

    /// Stores into a variable. When the variable holds a reference the store goes to the
    /// referenced location instead, `hops` counts how many references were already followed.
    pub(crate) fn store_variable(
        &mut self,
        name: &Token,
        value: Value,
        hops: usize,
    ) -> Result<(), Error> {
        if let Value::Reference(reference) = self.lookup_variable(name)? {
            return self.assign_through(&reference, value, hops);
        }

        let res = match self.locals.get(&name.idx) {
            Some(dist) => self
                .env
                .borrow_mut()
                .assign_at(*dist, &name.lexeme, value),
            None => self.globals.borrow_mut().assign(&name.lexeme, value),
        };

        res.map_err(|_| Interpreter::undefined_variable(name))
    }

    pub(crate) fn get_property(&mut self, object: Value, name: &Token) -> Result<Value, Error> {
        let property = match &object {
            Value::Instance(instance) => Instance::get(instance, &name.lexeme),
            Value::Callable(Callable::Class(class)) => Class::get(class, &name.lexeme),
            _ => {
                return Err(Error::runtime_error(
                    name,
                    "Only instances have properties.",
                ))
            }
        };

        match property {
            Some(Value::Callable(Callable::Function(getter))) if getter.is_getter() => {
                self.call_value(&Callable::Function(getter), name, &[])
            }
            Some(value) => Ok(value),
            None => Err(Error::runtime_error(
                name,
                &format!("Undefined property '{}'.", name.lexeme),
            )),
        }
    }

    pub(crate) fn set_property(
        &mut self,
        object: Value,
        name: &Token,
        value: Value,
    ) -> Result<(), Error> {
        match object {
            Value::Instance(instance) => {
                instance.borrow_mut().set(&name.lexeme, value);
                Ok(())
            }
            Value::Callable(Callable::Class(class)) => {
                class.set(&name.lexeme, value);
                Ok(())
            }
            _ => Err(Error::runtime_error(name, "Only instances have fields.")),
        }
    }

    fn element_index(bracket: &Token, index: &Value, len: usize) -> Result<usize, Error> {
        let index = match index {
            Value::Num(index) => index.trunc(),
            _ => {
                return Err(Error::runtime_error(
                    bracket,
                    "Only numbers can be used as an array index.",
                ))
            }
        };

        if index >= 0.0 && index < len as f64 {
            Ok(index as usize)
        } else {
            Err(Error::runtime_error(bracket, "Array index out of range."))
        }
    }

    pub(crate) fn get_element(
        &mut self,
        object: Value,
        bracket: &Token,
        index: Value,
    ) -> Result<Value, Error> {
        match object {
            Value::Array(array) => {
                let elements = array.borrow();
                let index = Interpreter::element_index(bracket, &index, elements.len())?;
                let value = elements[index].clone();
                Ok(value)
            }
            _ => Err(Error::runtime_error(
                bracket,
                "Only arrays can be subscripted.",
            )),
        }
    }

    pub(crate) fn set_element(
        &mut self,
        object: Value,
        bracket: &Token,
        index: Value,
        value: Value,
    ) -> Result<(), Error> {
        match object {
            Value::Array(array) => {
                let mut elements = array.borrow_mut();
                let index = Interpreter::element_index(bracket, &index, elements.len())?;
                elements[index] = value;
                Ok(())
            }
            _ => Err(Error::runtime_error(
                bracket,
                "Only arrays can be subscripted.",
            )),
        }
    }

    fn methods(decls: &[Rc<FunctionDecl>], closure: &Env) -> AHashMap<String, Rc<Function>> {
        decls
            .iter()
            .filter_map(|decl| {
                decl.name.as_ref().map(|name| {
                    let method = Function::new(Rc::clone(decl), Rc::clone(closure));
                    (name.lexeme.clone(), Rc::new(method))
                })
            })
            .collect()
    }
}

fn numbers(operator: &Token, left: &Value, right: &Value) -> Result<(f64, f64), Error> {
    match (left, right) {
        (Value::Num(left), Value::Num(right)) => Ok((*left, *right)),
        _ => Err(Error::runtime_error(operator, "Operands must be numbers.")),
    }
}

impl ExprVisitor for Interpreter {
    type Item = Value;

    fn visit_array(&mut self, _: &Token, elements: &[Expr]) -> Result<Value, Error> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.evaluate(element)?);
        }
        Ok(Value::array(values))
    }

    fn visit_assign(&mut self, name: &Token, value: &Expr) -> Result<Value, Error> {
        let value = self.evaluate(value)?;
        self.store_variable(name, value.clone(), 0)?;
        Ok(value)
    }

    fn visit_binary(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Value, Error> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        match operator.ty {
            Type::Comma => Ok(right),
            Type::Plus => match (left, right) {
                (Value::Num(left), Value::Num(right)) => Ok(Value::Num(left + right)),
                (Value::Str(left), Value::Str(right)) => {
                    Ok(Value::from(format!("{}{}", left, right)))
                }
                (Value::Array(array), element) => {
                    array.borrow_mut().push(element);
                    Ok(Value::Array(array))
                }
                _ => Err(Error::runtime_error(
                    operator,
                    "Invalid operands to binary operator '+'.",
                )),
            },
            Type::Minus => match (left, right) {
                (Value::Num(left), Value::Num(right)) => Ok(Value::Num(left - right)),
                (Value::Array(array), Value::Num(count)) => {
                    let elements = array.borrow();
                    if !(count >= 0.0 && count <= elements.len() as f64) {
                        return Err(Error::runtime_error(
                            operator,
                            &format!(
                                "Cannot remove {} elements from an array of size {}.",
                                Value::Num(count.trunc()),
                                elements.len()
                            ),
                        ));
                    }
                    let keep = elements.len() - count as usize;
                    Ok(Value::array(elements[..keep].to_vec()))
                }
                _ => Err(Error::runtime_error(
                    operator,
                    "Invalid operands to binary operator '-'.",
                )),
            },
            Type::Star => {
                let (left, right) = numbers(operator, &left, &right)?;
                Ok(Value::Num(left * right))
            }
            Type::Slash => {
                let (left, right) = numbers(operator, &left, &right)?;
                if right == 0.0 {
                    Err(Error::runtime_error(operator, "Cannot divide by zero."))
                } else {
                    Ok(Value::Num(left / right))
                }
            }
            Type::Percent => {
                let (left, right) = numbers(operator, &left, &right)?;
                Ok(Value::Num(left % right))
            }
            Type::Greater => {
                let (left, right) = numbers(operator, &left, &right)?;
                Ok(Value::Bool(left > right))
            }
            Type::GreaterEqual => {
                let (left, right) = numbers(operator, &left, &right)?;
                Ok(Value::Bool(left >= right))
            }
            Type::Less => {
                let (left, right) = numbers(operator, &left, &right)?;
                Ok(Value::Bool(left < right))
            }
            Type::LessEqual => {
                let (left, right) = numbers(operator, &left, &right)?;
                Ok(Value::Bool(left <= right))
            }
            Type::EqualEqual => Ok(Value::Bool(left == right)),
            Type::BangEqual => Ok(Value::Bool(left != right)),
            _ => Err(Error::runtime_error(operator, "Invalid operator.")),
        }
    }

    fn visit_call(
        &mut self,
        callee: &Expr,
        paren: &Token,
        args: &[Expr],
    ) -> Result<Value, Error> {
        let callee = self.evaluate(callee)?;
        let mut evaluated_args = Vec::with_capacity(args.len());
        for arg in args {
            evaluated_args.push(self.evaluate(arg)?);
        }

        match callee {
            Value::Callable(callable) => {
                if callable.arity() == evaluated_args.len() {
                    self.call_value(&callable, paren, &evaluated_args)
                } else {
                    Err(Error::runtime_error(
                        paren,
                        &format!(
                            "Expected {} arguments but got {}.",
                            callable.arity(),
                            evaluated_args.len()
                        ),
                    ))
                }
            }
            _ => Err(Error::runtime_error(
                paren,
                "Only functions and classes are callable.",
            )),
        }
    }

    fn visit_function(&mut self, declaration: &Rc<FunctionDecl>) -> Result<Value, Error> {
        let function = Function::new(Rc::clone(declaration), Rc::clone(&self.env));
        Ok(Value::Callable(Callable::Function(Rc::new(function))))
    }

    fn visit_get(&mut self, object: &Expr, name: &Token) -> Result<Value, Error> {
        let object = self.evaluate(object)?;
        self.get_property(object, name)
    }

    fn visit_set(&mut self, object: &Expr, name: &Token, value: &Expr) -> Result<Value, Error> {
        let object = self.evaluate(object)?;
        if !matches!(
            object,
            Value::Instance(_) | Value::Callable(Callable::Class(_))
        ) {
            return Err(Error::runtime_error(name, "Only instances have fields."));
        }

        let value = self.evaluate(value)?;
        self.set_property(object, name, value.clone())?;
        Ok(value)
    }

    fn visit_subscript(
        &mut self,
        object: &Expr,
        bracket: &Token,
        index: &Expr,
    ) -> Result<Value, Error> {
        let object = self.evaluate(object)?;
        let index = self.evaluate(index)?;
        self.get_element(object, bracket, index)
    }

    fn visit_set_element(
        &mut self,
        object: &Expr,
        bracket: &Token,
        index: &Expr,
        value: &Expr,
    ) -> Result<Value, Error> {
        let object = self.evaluate(object)?;
        let index = self.evaluate(index)?;
        let value = self.evaluate(value)?;
        self.set_element(object, bracket, index, value.clone())?;
        Ok(value)
    }

    fn visit_reference(&mut self, operator: &Token, target: &Rc<Expr>) -> Result<Value, Error> {
        match target.as_ref() {
            Expr::Variable { .. } | Expr::Get { .. } | Expr::Subscript { .. } => {
                let reference =
                    Reference::new(operator.clone(), Rc::clone(target), Rc::clone(&self.env));
                Ok(Value::Reference(Rc::new(reference)))
            }
            _ => Err(Error::runtime_error(operator, "Invalid reference target.")),
        }
    }

    fn visit_ternary(
        &mut self,
        condition: &Expr,
        _: &Token,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> Result<Value, Error> {
        if self.evaluate(condition)?.is_truthy() {
            self.evaluate(then_branch)
        } else {
            self.evaluate(else_branch)
        }
    }

    fn visit_this(&mut self, keyword: &Token) -> Result<Value, Error> {
        self.lookup_variable(keyword)
    }

    fn visit_super(&mut self, keyword: &Token, method: &Token) -> Result<Value, Error> {
        let dist = match self.locals.get(&keyword.idx) {
            Some(dist) if *dist > 0 => *dist,
            _ => return Err(Interpreter::undefined_variable(keyword)),
        };

        let found = self.env.borrow().get_at(dist, "super");
        let superclass = match found {
            Some(Value::Callable(Callable::Class(superclass))) => superclass,
            _ => return Err(Interpreter::undefined_variable(keyword)),
        };
        let this = self.env.borrow().get_at(dist - 1, "this").unwrap_or(Value::Nil);

        // Inside a class method `this` is the class, so `super` looks among class methods.
        let found = match &this {
            Value::Callable(Callable::Class(_)) => superclass
                .metaclass()
                .and_then(|meta| meta.find_method(&method.lexeme)),
            _ => superclass.find_method(&method.lexeme),
        };
        let function = found.ok_or_else(|| {
            Error::runtime_error(method, &format!("Undefined property '{}'.", method.lexeme))
        })?;

        let bound = Rc::new(function.bind(this, method.lexeme == "init"));
        if bound.is_getter() {
            self.call_value(&Callable::Function(bound), method, &[])
        } else {
            Ok(Value::Callable(Callable::Function(bound)))
        }
    }

    fn visit_grouping(&mut self, expression: &Expr) -> Result<Value, Error> {
        self.evaluate(expression)
    }

    fn visit_literal(&mut self, value: &Literal) -> Result<Value, Error> {
        Ok(Value::from(value.clone()))
    }

    fn visit_logical(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Value, Error> {
        let left = self.evaluate(left)?;

        // The deciding operand is the result, the right side only runs when it can still decide.
        if operator.ty == Type::Or {
            if left.is_truthy() {
                return Ok(left);
            }
        } else if !left.is_truthy() {
            return Ok(left);
        }

        self.evaluate(right)
    }

    fn visit_unary(&mut self, operator: &Token, right: &Expr) -> Result<Value, Error> {
        let right = self.evaluate(right)?;
        match (operator.ty, right) {
            (Type::Minus, Value::Num(val)) => Ok(Value::Num(-val)),
            (Type::Minus, _) => Err(Error::runtime_error(operator, "Operand must be a number.")),
            (Type::Bang, val) => Ok(Value::Bool(!val.is_truthy())),
            _ => Err(Error::runtime_error(operator, "Invalid operator.")),
        }
    }

    fn visit_variable(&mut self, name: &Token) -> Result<Value, Error> {
        self.lookup_variable(name)
    }
}

impl StmtVisitor for Interpreter {
    type Item = Flow;

    fn visit_block(&mut self, statements: &[Stmt]) -> Result<Flow, Error> {
        let env = Environment::with(Rc::clone(&self.env)).into_env();
        self.execute_block_with_env(statements, env)
    }

    fn visit_expression(&mut self, expression: &Expr) -> Result<Flow, Error> {
        self.evaluate(expression)?;
        Ok(Flow::Normal)
    }

    fn visit_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
        class_methods: &[Rc<FunctionDecl>],
    ) -> Result<Flow, Error> {
        let superclass = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Callable(Callable::Class(superclass)) => Some(superclass),
                _ => {
                    let token = match expr {
                        Expr::Variable { name } => name,
                        _ => name,
                    };
                    return Err(Error::runtime_error(token, "Superclass must be a class."));
                }
            },
            None => None,
        };

        self.env.borrow_mut().define(&name.lexeme, Value::Nil);

        let closure = match &superclass {
            Some(superclass) => {
                let mut env = Environment::with(Rc::clone(&self.env));
                env.define("super", Value::Callable(Callable::Class(Rc::clone(superclass))));
                env.into_env()
            }
            None => Rc::clone(&self.env),
        };

        let metaclass = Class::new(
            &format!("{} metaclass", name.lexeme),
            superclass
                .as_ref()
                .and_then(|superclass| superclass.metaclass().cloned()),
            Interpreter::methods(class_methods, &closure),
            None,
        );
        let class = Class::new(
            &name.lexeme,
            superclass,
            Interpreter::methods(methods, &closure),
            Some(metaclass),
        );

        self.env
            .borrow_mut()
            .assign(&name.lexeme, Value::Callable(Callable::Class(class)))
            .map_err(|_| Interpreter::undefined_variable(name))?;
        Ok(Flow::Normal)
    }

    fn visit_if(
        &mut self,
        condition: &Expr,
        _: &Token,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<Flow, Error> {
        if self.evaluate(condition)?.is_truthy() {
            self.execute(then_branch)
        } else if let Some(else_branch) = else_branch {
            self.execute(else_branch)
        } else {
            Ok(Flow::Normal)
        }
    }

    fn visit_while(&mut self, condition: &Expr, body: &Stmt, _: &Token) -> Result<Flow, Error> {
        while self.evaluate(condition)?.is_truthy() {
            if let Flow::Return(value) = self.execute(body)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn visit_return(&mut self, _: &Token, value: Option<&Expr>) -> Result<Flow, Error> {
        let value = match value {
            Some(value) => self.evaluate(value)?,
            None => Value::Nil,
        };
        Ok(Flow::Return(value))
    }

    fn visit_var(&mut self, name: &Token, init: Option<&Expr>) -> Result<Flow, Error> {
        let value = match init {
            Some(init) => self.evaluate_raw(init)?,
            None => Value::Nil,
        };
        self.env.borrow_mut().define(&name.lexeme, value);
        Ok(Flow::Normal)
    }

    fn visit_import(&mut self, keyword: &Token, module: &Expr) -> Result<Flow, Error> {
        let path = match self.evaluate(module)? {
            Value::Str(path) => path,
            _ => {
                return Err(Error::runtime_error(
                    keyword,
                    "Module name must be a string.",
                ))
            }
        };

        debug!("importing '{}'", path);
        if let Some(name) = path.strip_prefix("std:") {
            stdlib::import(self, keyword, name)?;
        } else {
            let src = fs::read_to_string(path.as_str()).map_err(|_| {
                Error::runtime_error(keyword, &format!("Could not import module '{}'.", path))
            })?;
            self.run_module(&src, keyword, &path)?;
        }

        Ok(Flow::Normal)
    }
}
