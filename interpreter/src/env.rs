use crate::value::Value;
use ahash::AHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub(crate) type Env = Rc<RefCell<Environment>>;

pub(crate) struct Environment {
    enclosing: Option<Env>,
    values: AHashMap<String, Value>,
}

#[derive(Debug, PartialEq)]
pub(crate) struct UndefinedVariable;

impl Environment {
    pub(crate) fn new() -> Self {
        Environment {
            enclosing: None,
            values: AHashMap::new(),
        }
    }

    pub(crate) fn with(enclosing: Env) -> Self {
        Environment {
            enclosing: Some(enclosing),
            values: AHashMap::new(),
        }
    }

    pub(crate) fn into_env(self) -> Env {
        Rc::new(RefCell::new(self))
    }

    /// Defining an existing name in the same scope replaces it.
    pub(crate) fn define(&mut self, key: &str, value: Value) {
        self.values.insert(String::from(key), value);
    }

    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        if let Some(val) = self.values.get(key) {
            Some(val.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.as_ref().borrow().get(key)
        } else {
            None
        }
    }

    /// Reads `key` from the scope exactly `dist` hops up the chain, without searching.
    pub(crate) fn get_at(&self, dist: usize, key: &str) -> Option<Value> {
        if dist == 0 {
            self.values.get(key).cloned()
        } else {
            self.enclosing
                .as_ref()
                .and_then(|parent| parent.borrow().get_at(dist - 1, key))
        }
    }

    pub(crate) fn assign(&mut self, key: &str, value: Value) -> Result<(), UndefinedVariable> {
        if let Some(val) = self.values.get_mut(key) {
            *val = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.as_ref().borrow_mut().assign(key, value)
        } else {
            Err(UndefinedVariable)
        }
    }

    pub(crate) fn assign_at(
        &mut self,
        dist: usize,
        key: &str,
        value: Value,
    ) -> Result<(), UndefinedVariable> {
        if dist == 0 {
            if let Some(val) = self.values.get_mut(key) {
                *val = value;
                Ok(())
            } else {
                Err(UndefinedVariable)
            }
        } else if let Some(parent) = &self.enclosing {
            parent.as_ref().borrow_mut().assign_at(dist - 1, key, value)
        } else {
            Err(UndefinedVariable)
        }
    }
}

// Closures stored in an environment usually capture that same environment, printing the chain
// would never end.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("names", &names)
            .field("enclosed", &self.enclosing.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::{Environment, UndefinedVariable};
    use crate::value::Value;

    #[test]
    fn test_define_and_get() {
        let mut env = Environment::new();
        env.define("foo", Value::from("bar"));
        env.define("baz", Value::from(false));

        assert_eq!(env.get("foo"), Some(Value::from("bar")));
        assert_eq!(env.get("baz"), Some(Value::from(false)));

        env.define("foo", Value::from(1.0));
        assert_eq!(env.get("foo"), Some(Value::from(1.0)));
    }

    #[test]
    fn test_throw_error_if_undefined() {
        let mut env = Environment::new();
        assert_eq!(
            Err(UndefinedVariable),
            env.assign("foo", Value::from("bar"))
        );
        assert_eq!(None, env.get("foo"));
    }

    #[test]
    fn test_multi_level() {
        let env1 = Environment::new().into_env();
        env1.borrow_mut().define("foo", Value::from("bar"));

        {
            let mut env2 = Environment::with(env1.clone());
            env2.define("foo", Value::from("foofoo"));
            assert_eq!(env2.get_at(0, "foo"), Some(Value::from("foofoo")));
            assert_eq!(env2.get_at(1, "foo"), Some(Value::from("bar")));
            env2.assign_at(1, "foo", Value::from(false)).unwrap();
        }

        assert_eq!(env1.borrow().get("foo"), Some(Value::from(false)));
    }

    #[test]
    fn test_get_at_does_not_search() {
        let outer = Environment::new().into_env();
        outer.borrow_mut().define("a", Value::from(1.0));
        let mut inner = Environment::with(outer);

        assert_eq!(None, inner.get_at(0, "a"));
        assert_eq!(None, inner.get_at(2, "a"));
        assert_eq!(Err(UndefinedVariable), inner.assign_at(0, "a", Value::Nil));
        assert_eq!(Some(Value::from(1.0)), inner.get("a"));
    }
}
