//! Lexically nested environments.
//!
//! An environment chains upward to its parent. Name lookup recurses,
//! declaration is strictly local, mutation walks to the nearest defining
//! scope and falls back to a local definition. Each environment also owns a
//! LIFO self-reference stack read by the `@` token, and only the root
//! environment carries the native-callback registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{LumError, LumResult};
use crate::executor::Executor;
use crate::value::{StructType, Value};

pub type EnvRef = Rc<RefCell<Environment>>;

/// Host callback registered for a `native fin` stub. `None` is the
/// no-return marker.
pub type NativeFn =
    Rc<dyn Fn(&mut Executor, &HashMap<String, Value>) -> LumResult<Option<Value>>>;

pub struct Environment {
    parent: Option<EnvRef>,
    vars: HashMap<String, Value>,
    types: HashMap<String, Rc<StructType>>,
    self_refs: Vec<Value>,
    natives: Option<HashMap<String, NativeFn>>,
}

impl Environment {
    /// A root environment; the only one allowed to register natives.
    pub fn root() -> EnvRef {
        Rc::new(RefCell::new(Environment {
            parent: None,
            vars: HashMap::new(),
            types: HashMap::new(),
            self_refs: Vec::new(),
            natives: Some(HashMap::new()),
        }))
    }

    pub fn child(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            parent: Some(parent.clone()),
            vars: HashMap::new(),
            types: HashMap::new(),
            self_refs: Vec::new(),
            natives: None,
        }))
    }

    pub fn get(&self, name: &str) -> LumResult<Value> {
        if let Some(val) = self.vars.get(name) {
            return Ok(val.clone());
        }
        match &self.parent {
            Some(parent) => parent.borrow().get(name),
            None => Err(LumError::runtime(format!("Undefined variable: {name}"))),
        }
    }

    /// Declare in this scope, shadowing any outer binding.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Overwrite the nearest enclosing binding; declare locally when none
    /// exists.
    pub fn modify(&mut self, name: &str, value: Value) {
        if self.vars.contains_key(name) {
            self.vars.insert(name.to_string(), value);
        } else if let Some(parent) = &self.parent {
            parent.borrow_mut().modify(name, value);
        } else {
            self.vars.insert(name.to_string(), value);
        }
    }

    /// Is the name bound in this scope (not a parent)?
    pub fn has(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn has_recursive(&self, name: &str) -> bool {
        if self.vars.contains_key(name) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.borrow().has_recursive(name),
            None => false,
        }
    }

    pub fn set_type(&mut self, name: impl Into<String>, ty: Rc<StructType>) {
        self.types.insert(name.into(), ty);
    }

    pub fn get_type(&self, name: &str) -> Option<Rc<StructType>> {
        if let Some(ty) = self.types.get(name) {
            return Some(ty.clone());
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.borrow().get_type(name))
    }

    pub fn push_self_ref(&mut self, value: Value) {
        self.self_refs.push(value);
    }

    pub fn pop_self_ref(&mut self) -> LumResult<()> {
        self.self_refs
            .pop()
            .map(|_| ())
            .ok_or_else(|| LumError::runtime("Attempted to pop empty self-reference stack"))
    }

    pub fn current_self_ref(&self) -> Option<Value> {
        self.self_refs.last().cloned()
    }

    pub fn has_self_ref(&self) -> bool {
        !self.self_refs.is_empty()
    }

    /// Only the root environment may register natives.
    pub fn register_native(&mut self, name: impl Into<String>, f: NativeFn) -> LumResult<()> {
        match &mut self.natives {
            Some(natives) => {
                natives.insert(name.into(), f);
                Ok(())
            }
            None => Err(LumError::module(
                "Native functions can only be registered on the root environment",
            )),
        }
    }

    pub fn find_native(&self, name: &str) -> Option<NativeFn> {
        if let Some(natives) = &self.natives {
            return natives.get(name).cloned();
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.borrow().find_native(name))
    }
}

/// Keeps a self-reference push balanced with its pop on every exit path.
pub struct SelfRefGuard {
    env: EnvRef,
}

impl SelfRefGuard {
    pub fn push(env: &EnvRef, value: Value) -> Self {
        env.borrow_mut().push_self_ref(value);
        SelfRefGuard { env: env.clone() }
    }
}

impl Drop for SelfRefGuard {
    fn drop(&mut self) {
        // The guard owns exactly one push, so the pop cannot underflow.
        let _ = self.env.borrow_mut().pop_self_ref();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_to_parent_and_set_shadows() {
        let root = Environment::root();
        root.borrow_mut().set("x", Value::Int(1));

        let inner = Environment::child(&root);
        assert_eq!(inner.borrow().get("x").unwrap().as_int().unwrap(), 1);

        inner.borrow_mut().set("x", Value::Int(2));
        assert_eq!(inner.borrow().get("x").unwrap().as_int().unwrap(), 2);
        assert_eq!(root.borrow().get("x").unwrap().as_int().unwrap(), 1);
    }

    #[test]
    fn modify_reaches_the_defining_scope() {
        let root = Environment::root();
        root.borrow_mut().set("x", Value::Int(1));

        let inner = Environment::child(&root);
        inner.borrow_mut().modify("x", Value::Int(7));
        assert_eq!(root.borrow().get("x").unwrap().as_int().unwrap(), 7);

        // No binding anywhere: modify declares locally.
        inner.borrow_mut().modify("fresh", Value::Int(3));
        assert!(inner.borrow().has("fresh"));
        assert!(!root.borrow().has("fresh"));
    }

    #[test]
    fn self_ref_stack_is_lifo_and_guarded() {
        let env = Environment::root();
        {
            let _a = SelfRefGuard::push(&env, Value::Int(1));
            {
                let _b = SelfRefGuard::push(&env, Value::Int(2));
                assert_eq!(
                    env.borrow().current_self_ref().unwrap().as_int().unwrap(),
                    2
                );
            }
            assert_eq!(
                env.borrow().current_self_ref().unwrap().as_int().unwrap(),
                1
            );
        }
        assert!(!env.borrow().has_self_ref());
        assert!(env.borrow_mut().pop_self_ref().is_err());
    }

    #[test]
    fn natives_register_on_root_only() {
        let root = Environment::root();
        let child = Environment::child(&root);
        let f: NativeFn = Rc::new(|_, _| Ok(None));

        assert!(root.borrow_mut().register_native("f", f.clone()).is_ok());
        assert!(child.borrow_mut().register_native("g", f).is_err());
        assert!(child.borrow().find_native("f").is_some());
        assert!(child.borrow().find_native("g").is_none());
    }
}
