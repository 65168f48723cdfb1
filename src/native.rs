//! Dynamically loaded native plug-ins.
//!
//! `link "path";` loads a library and hands its `initPlugin` symbol a
//! registrar; every callback the plug-in registers becomes resolvable from
//! `native fin` stubs by name. The core type-checks arguments and return
//! values against the Lum declaration before and after each callback.

use libloading::{Library, Symbol};

use crate::env::{EnvRef, NativeFn};
use crate::error::{LumError, LumResult};

/// Registration surface handed to a plug-in's entry point.
pub struct PluginRegistrar<'a> {
    env: &'a EnvRef,
}

impl PluginRegistrar<'_> {
    pub fn register(&mut self, name: &str, callback: NativeFn) -> LumResult<()> {
        self.env.borrow_mut().register_native(name, callback)
    }
}

/// The single symbol a plug-in must export.
pub type PluginInit = unsafe fn(&mut PluginRegistrar);

pub fn link_native(path: &str, env: &EnvRef) -> LumResult<()> {
    unsafe {
        let library = Library::new(path)
            .map_err(|e| LumError::module(format!("Unable to load plug-in {path}: {e}")))?;
        let init: Symbol<PluginInit> = library
            .get(b"initPlugin")
            .map_err(|e| LumError::module(format!("Plug-in {path} does not export initPlugin: {e}")))?;
        let mut registrar = PluginRegistrar { env };
        init(&mut registrar);
        // Registered callbacks point into the plug-in's code; the library
        // must stay resident for the rest of the process.
        std::mem::forget(library);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use std::rc::Rc;

    #[test]
    fn missing_plugin_is_a_module_error() {
        let env = Environment::root();
        assert!(matches!(
            link_native("/nonexistent/plugin.so", &env),
            Err(LumError::Module { .. })
        ));
    }

    #[test]
    fn registrar_registers_on_the_root() {
        let env = Environment::root();
        let mut registrar = PluginRegistrar { env: &env };
        registrar
            .register("hello", Rc::new(|_, _| Ok(None)))
            .unwrap();
        assert!(env.borrow().find_native("hello").is_some());
    }
}
