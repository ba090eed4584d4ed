use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use ahash::AHashMap;
use reflox_core::Token;

use crate::ast::FunctionDecl;
use crate::env::{Env, Environment};
use crate::error::Error;
use crate::interpreter::{Flow, Interpreter};
use crate::value::Value;

/// Everything that can appear on the left of a call. The set is closed, so callers can ask
/// whether a callee is a class by matching instead of downcasting.
#[derive(Debug, Clone)]
pub(crate) enum Callable {
    Function(Rc<Function>),
    Class(Rc<Class>),
    Native(Rc<Native>),
}

impl Callable {
    pub(crate) fn name(&self) -> &str {
        match self {
            Callable::Function(function) => function.name().unwrap_or("anonymous"),
            Callable::Class(class) => &class.name,
            Callable::Native(native) => &native.name,
        }
    }

    pub(crate) fn arity(&self) -> usize {
        match self {
            Callable::Function(function) => function.arity(),
            Callable::Class(class) => class.arity(),
            Callable::Native(native) => native.arity,
        }
    }

    /// Invokes the callee. Arity has already been checked by the caller, `paren` is only used to
    /// attribute errors raised by natives.
    pub(crate) fn call(
        &self,
        interpreter: &mut Interpreter,
        paren: &Token,
        args: &[Value],
    ) -> Result<Value, Error> {
        match self {
            Callable::Function(function) => function.call(interpreter, args),
            Callable::Class(class) => Class::construct(class, interpreter, args),
            Callable::Native(native) => (native.func)(interpreter, paren, args),
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Function(lhs), Callable::Function(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Callable::Class(lhs), Callable::Class(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Callable::Native(lhs), Callable::Native(rhs)) => Rc::ptr_eq(lhs, rhs),
            _ => false,
        }
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(function) => match function.name() {
                Some(name) => write!(f, "<fn {}>", name),
                None => write!(f, "<fn>"),
            },
            Callable::Class(class) => write!(f, "{}", class.name),
            Callable::Native(_) => write!(f, "<native fn>"),
        }
    }
}

pub(crate) type NativeFn = fn(&mut Interpreter, &Token, &[Value]) -> Result<Value, Error>;

// `Native` bridges rust functions and the interpreter. They live in the global namespace, or as
// members of standard library objects.
pub(crate) struct Native {
    func: NativeFn,
    name: String,
    arity: usize,
}

impl Native {
    pub(crate) fn new(func: NativeFn, name: &str, arity: usize) -> Self {
        Self {
            func,
            name: String::from(name),
            arity,
        }
    }
}

impl Debug for Native {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<native {}/{}>", self.name, self.arity)
    }
}

// Bound methods share the declaration with the unbound one, binding only allocates the small
// environment that holds `this`.
pub(crate) struct Function {
    declaration: Rc<FunctionDecl>,
    closure: Env,
    is_init: bool,
}

impl Function {
    pub(crate) fn new(declaration: Rc<FunctionDecl>, closure: Env) -> Self {
        Function {
            declaration,
            closure,
            is_init: false,
        }
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.declaration
            .name
            .as_ref()
            .map(|name| name.lexeme.as_str())
    }

    pub(crate) fn arity(&self) -> usize {
        self.declaration.params.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn is_getter(&self) -> bool {
        self.declaration.params.is_none()
    }

    pub(crate) fn bind(&self, this: Value, is_init: bool) -> Function {
        let mut env = Environment::with(Rc::clone(&self.closure));
        env.define("this", this);

        Function {
            declaration: Rc::clone(&self.declaration),
            closure: env.into_env(),
            is_init,
        }
    }

    pub(crate) fn call(
        &self,
        interpreter: &mut Interpreter,
        args: &[Value],
    ) -> Result<Value, Error> {
        let mut env = Environment::with(Rc::clone(&self.closure));
        if let Some(params) = &self.declaration.params {
            for (param, arg) in params.iter().zip(args) {
                env.define(&param.lexeme, arg.clone());
            }
        }

        let flow = interpreter.execute_block_with_env(&self.declaration.body, env.into_env())?;

        // An initializer always yields the instance, whatever its body returned.
        if self.is_init {
            return Ok(self.closure.borrow().get_at(0, "this").unwrap_or(Value::Nil));
        }

        match flow {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Nil),
        }
    }
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<fn {}>", self.name().unwrap_or("anonymous"))
    }
}

pub(crate) struct Class {
    name: String,
    superclass: Option<Rc<Class>>,
    methods: AHashMap<String, Rc<Function>>,
    // Holds the class methods. The metaclass of a subclass extends the metaclass of its
    // superclass, so class methods are inherited the same way instance methods are.
    metaclass: Option<Rc<Class>>,
    fields: RefCell<AHashMap<String, Value>>,
}

impl Class {
    pub(crate) fn new(
        name: &str,
        superclass: Option<Rc<Class>>,
        methods: AHashMap<String, Rc<Function>>,
        metaclass: Option<Rc<Class>>,
    ) -> Rc<Self> {
        Rc::new(Class {
            name: name.to_string(),
            superclass,
            methods,
            metaclass,
            fields: RefCell::new(AHashMap::new()),
        })
    }

    pub(crate) fn metaclass(&self) -> Option<&Rc<Class>> {
        self.metaclass.as_ref()
    }

    pub(crate) fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(fun) = self.methods.get(name) {
            Some(Rc::clone(fun))
        } else if let Some(superclass) = &self.superclass {
            superclass.find_method(name)
        } else {
            None
        }
    }

    fn arity(&self) -> usize {
        match self.find_method("init") {
            Some(init) => init.arity(),
            _ => 0,
        }
    }

    fn construct(
        class: &Rc<Class>,
        interpreter: &mut Interpreter,
        args: &[Value],
    ) -> Result<Value, Error> {
        let instance = Instance::new(Rc::clone(class));
        if let Some(init) = class.find_method("init") {
            let this = Value::Instance(Rc::clone(&instance));
            init.bind(this, true).call(interpreter, args)?;
        }

        Ok(Value::Instance(instance))
    }

    /// Property lookup on the class object itself: its own fields first, then class methods
    /// bound with `this` set to the class.
    pub(crate) fn get(class: &Rc<Class>, name: &str) -> Option<Value> {
        if let Some(field) = class.fields.borrow().get(name) {
            return Some(field.clone());
        }

        class
            .metaclass
            .as_ref()
            .and_then(|meta| meta.find_method(name))
            .map(|method| {
                let this = Value::Callable(Callable::Class(Rc::clone(class)));
                Value::Callable(Callable::Function(Rc::new(method.bind(this, false))))
            })
    }

    pub(crate) fn set(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(String::from(name), value);
    }
}

impl Debug for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<class {}>", self.name)
    }
}

pub(crate) struct Instance {
    class: Rc<Class>,
    fields: AHashMap<String, Value>,
}

impl Instance {
    pub(crate) fn new(class: Rc<Class>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Instance {
            class,
            fields: AHashMap::new(),
        }))
    }

    pub(crate) fn get(instance: &Rc<RefCell<Self>>, name: &str) -> Option<Value> {
        if let Some(field) = instance.borrow().fields.get(name) {
            return Some(field.clone());
        }

        let method = instance.borrow().class.find_method(name);
        method.map(|function| {
            let this = Value::Instance(Rc::clone(instance));
            Value::Callable(Callable::Function(Rc::new(
                function.bind(this, name == "init"),
            )))
        })
    }

    pub(crate) fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(String::from(name), value);
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} instance>", self.class.name)
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} instance>", self.class.name)
    }
}
