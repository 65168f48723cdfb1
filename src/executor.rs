//! The Lum tree-walking executor.
//!
//! `run` executes the program root (which registers every pragma and runs
//! the entry file's pragma), then calls `main` if one is bound. Statement
//! execution returns `Option<Value>`: `Some` carries a `return` upward
//! through blocks and loops until a function boundary absorbs it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BinOp, Node, NodeKind, Primitive};
use crate::env::{EnvRef, Environment, SelfRefGuard};
use crate::error::{LumError, LumResult};
use crate::native;
use crate::stdlib;
use crate::value::{
    BaseType, ExportData, LumArray, LumFunction, StructInstance, StructType, TypeDesc, Value,
};

pub struct Executor {
    root: Node,
    global: EnvRef,
    pragmas: HashMap<String, Node>,
    exports: HashMap<String, Rc<RefCell<ExportData>>>,
    handling: Vec<String>,
}

struct ParamSpec {
    name: String,
    ty: TypeDesc,
    variadic: bool,
}

impl Executor {
    pub fn new(root: Node) -> Self {
        let global = Environment::root();
        global.borrow_mut().set("nil", Value::Nil);
        Executor {
            root,
            global,
            pragmas: HashMap::new(),
            exports: HashMap::new(),
            handling: Vec::new(),
        }
    }

    pub fn global(&self) -> &EnvRef {
        &self.global
    }

    /// Execute the program, then `main` if it resolves to a function.
    pub fn run(&mut self) -> LumResult<Value> {
        let root = std::mem::replace(&mut self.root, Node::new(NodeKind::Program));
        let global = self.global.clone();
        let result = self.execute_node(&root, &global);
        self.root = root;
        result?;

        let main = {
            let env = self.global.borrow();
            if env.has("main") {
                Some(env.get("main")?)
            } else {
                None
            }
        };
        match main {
            Some(Value::Function(f)) => (f.call)(self, Vec::new()),
            Some(other) => Err(LumError::type_error(format!(
                "main is not a function type - received {}",
                other.type_desc()
            ))),
            None => Ok(Value::Int(0)),
        }
    }

    fn child<'n>(&self, node: &'n Node, i: usize) -> LumResult<&'n Node> {
        node.children
            .get(i)
            .ok_or_else(|| LumError::runtime(format!("Malformed {:?} node", node.kind)))
    }

    // === Statement execution ===

    pub fn execute_node(&mut self, node: &Node, env: &EnvRef) -> LumResult<Option<Value>> {
        match node.kind {
            NodeKind::Program => {
                self.execute_pragmas(node, env)?;
                Ok(None)
            }
            NodeKind::Block => {
                let scope = Environment::child(env);
                self.execute_block(&node.children, &scope)
            }
            NodeKind::StructDeclare => {
                self.declare_struct(node, env)?;
                Ok(None)
            }
            NodeKind::ExprStatement => {
                self.evaluate(self.child(node, 0)?, env)?;
                Ok(None)
            }
            NodeKind::PrimitiveAssign => {
                self.handle_assignment(node, env)?;
                Ok(None)
            }
            NodeKind::StructAssign => {
                self.handle_struct_assignment(node, env)?;
                Ok(None)
            }
            NodeKind::NdArrayAssign => {
                self.handle_ndarray_assignment(node, env)?;
                Ok(None)
            }
            NodeKind::Return => Ok(Some(match node.children.first() {
                Some(expr) => self.evaluate(expr, env)?,
                None => Value::Nil,
            })),
            NodeKind::If => {
                let cond = self.evaluate(self.child(node, 0)?, env)?.as_bool()?;
                if cond {
                    return self.execute_node(self.child(node, 1)?, env);
                }
                if let Some(else_node) = node.children.get(2) {
                    if else_node.kind == NodeKind::Else {
                        return self.execute_node(self.child(else_node, 0)?, env);
                    }
                }
                Ok(None)
            }
            NodeKind::While => {
                while self.evaluate(self.child(node, 0)?, env)?.as_bool()? {
                    if let Some(ret) = self.execute_node(self.child(node, 1)?, env)? {
                        return Ok(Some(ret));
                    }
                }
                Ok(None)
            }
            NodeKind::For => self.execute_for(node, env),
            NodeKind::Function => {
                let func = self.build_function(node, env)?;
                env.borrow_mut().set(node.value.clone(), func);
                Ok(None)
            }
            NodeKind::NativeStatement => {
                self.execute_native_statement(node, env)?;
                Ok(None)
            }
            _ => {
                self.evaluate(node, env)?;
                Ok(None)
            }
        }
    }

    fn execute_block(&mut self, nodes: &[Node], env: &EnvRef) -> LumResult<Option<Value>> {
        for node in nodes {
            if let Some(ret) = self.execute_node(node, env)? {
                return Ok(Some(ret));
            }
        }
        Ok(None)
    }

    fn execute_for(&mut self, node: &Node, env: &EnvRef) -> LumResult<Option<Value>> {
        if node.value == "1" {
            // for (T x : iterable)
            let binding = self.child(node, 0)?;
            let declared = self.binding_type(binding)?;
            let iterable = self.evaluate(self.child(node, 1)?, env)?;
            let items = match &iterable {
                Value::Array(arr) => arr.borrow().items.clone(),
                other => {
                    return Err(LumError::type_error(format!(
                        "For-in loop requires an array, got {}",
                        other.type_desc()
                    )))
                }
            };
            let body = self.child(node, 2)?;
            for item in items {
                if !item.type_desc().matches(&declared) {
                    return Err(LumError::type_error(format!(
                        "For-in binding expects {declared}, got {}",
                        item.type_desc()
                    )));
                }
                let scope = Environment::child(env);
                scope.borrow_mut().set(binding.value.clone(), item);
                if let Some(ret) = self.execute_node(body, &scope)? {
                    return Ok(Some(ret));
                }
            }
            return Ok(None);
        }

        // for (init; cond; step)
        self.execute_node(self.child(node, 0)?, env)?;
        while self.evaluate(self.child(node, 1)?, env)?.as_bool()? {
            if let Some(ret) = self.execute_node(self.child(node, 3)?, env)? {
                return Ok(Some(ret));
            }
            self.evaluate(self.child(node, 2)?, env)?;
        }
        Ok(None)
    }

    fn binding_type(&self, binding: &Node) -> LumResult<TypeDesc> {
        match binding.kind {
            NodeKind::PrimitiveAssign => TypeDesc::from_primitive(binding.primitive)
                .ok_or_else(|| LumError::runtime("Malformed for-in binding")),
            NodeKind::StructAssign => Ok(TypeDesc::structure(&self.child(binding, 0)?.value)),
            _ => Err(LumError::runtime("Malformed for-in binding")),
        }
    }

    // === Pragmas and imports ===

    fn execute_pragmas(&mut self, program: &Node, env: &EnvRef) -> LumResult<()> {
        for child in &program.children {
            if child.kind != NodeKind::Pragma {
                return Err(LumError::module("Program children must be pragmas"));
            }
            self.pragmas.insert(child.value.clone(), child.clone());
        }
        let entry = program
            .children
            .last()
            .cloned()
            .ok_or_else(|| LumError::module("Program contains no pragmas"))?;
        self.execute_pragma(&entry, env)
    }

    fn execute_pragma(&mut self, pragma: &Node, env: &EnvRef) -> LumResult<()> {
        self.handling.push(pragma.value.clone());
        let result = self.execute_pragma_inner(pragma, env);
        self.handling.pop();
        result
    }

    fn execute_pragma_inner(&mut self, pragma: &Node, env: &EnvRef) -> LumResult<()> {
        if pragma.children.len() < 2 {
            return Err(LumError::module("Malformed pragma"));
        }
        let name = pragma.value.clone();
        let imports = self.child(pragma, 0)?.children.clone();
        self.handle_imports(&imports, env)?;

        self.exports
            .insert(name.clone(), Rc::new(RefCell::new(ExportData::new(&name))));

        for stmt in &pragma.children[2..] {
            self.execute_node(stmt, env)?;
        }

        for export in &self.child(pragma, 1)?.children {
            let var = &export.value;
            if !env.borrow().has(var) {
                return Err(LumError::module(format!(
                    "Cannot export undefined variable: {var}"
                )));
            }
            if let Some(data) = self.exports.get(&name) {
                data.borrow_mut().add_export(var.clone(), env.clone());
            }
        }
        Ok(())
    }

    /// Process one pragma's import block. `.lum` imports execute their
    /// pragma lazily (in a fresh child of the root environment) and bind the
    /// alias to an export handle; bare names install a built-in module.
    fn handle_imports(&mut self, imports: &[Node], env: &EnvRef) -> LumResult<()> {
        for import in imports {
            let name = import.value.clone();
            if name.ends_with(".lum") {
                if !self.exports.contains_key(&name) {
                    let pragma = self
                        .pragmas
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| LumError::module(format!("Unknown pragma: {name}")))?;
                    if self.handling.contains(&name) {
                        return Err(LumError::module(format!("Circular import: {name}")));
                    }
                    let module_env = Environment::child(&self.global);
                    self.execute_pragma(&pragma, &module_env)?;
                }
                let alias = import
                    .children
                    .first()
                    .map(|a| a.value.clone())
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        LumError::module(format!("Import of {name} is missing an alias"))
                    })?;
                if let Some(handle) = self.exports.get(&name) {
                    env.borrow_mut().set(alias, Value::Export(handle.clone()));
                }
            } else {
                stdlib::install(&name, env)?;
            }
        }
        Ok(())
    }

    fn execute_native_statement(&mut self, node: &Node, env: &EnvRef) -> LumResult<()> {
        let child = self.child(node, 0)?;
        match child.kind {
            NodeKind::String => native::link_native(&child.value, &self.global),
            NodeKind::Function => {
                let (params, ret) = function_signature(child)?;
                let name = child.value.clone();
                let lookup = name.clone();
                let func = LumFunction::new(move |exec: &mut Executor, args: Vec<Value>| {
                    let callback = exec
                        .global()
                        .borrow()
                        .find_native(&lookup)
                        .ok_or_else(|| {
                            LumError::module(format!("Unable to link native function: {lookup}"))
                        })?;
                    let map: HashMap<String, Value> =
                        bind_arguments(&lookup, &params, args)?.into_iter().collect();
                    let value = (*callback)(exec, &map)?.unwrap_or(Value::Nil);
                    if !value.type_desc().matches(&ret) {
                        return Err(LumError::type_error(format!(
                            "Function return type mismatch in {lookup}: got {}, expected {ret}",
                            value.type_desc()
                        )));
                    }
                    Ok(value)
                });
                env.borrow_mut().set(name, func);
                Ok(())
            }
            _ => Err(LumError::runtime("Malformed native statement")),
        }
    }

    // === Declarations and assignment ===

    fn declare_struct(&mut self, node: &Node, env: &EnvRef) -> LumResult<()> {
        let mut ty = StructType::new(&node.value);
        for field in &node.children {
            let base = match field.kind {
                NodeKind::PrimitiveAssign => TypeDesc::from_primitive(field.primitive)
                    .ok_or_else(|| LumError::runtime("Malformed struct field"))?,
                NodeKind::StructAssign => TypeDesc::structure(&self.child(field, 0)?.value),
                _ => return Err(LumError::runtime("Malformed struct field")),
            };
            let desc = if field
                .children
                .iter()
                .any(|c| c.kind == NodeKind::SizedArrayDeclare)
            {
                TypeDesc::array(base)
            } else {
                base
            };
            ty.fields.push((field.value.clone(), desc));
        }
        env.borrow_mut().set_type(node.value.clone(), Rc::new(ty));
        Ok(())
    }

    fn handle_assignment(&mut self, node: &Node, env: &EnvRef) -> LumResult<Value> {
        if node
            .children
            .first()
            .is_some_and(|c| c.kind == NodeKind::Read)
        {
            return self.handle_read_assignment(node, env);
        }
        if node.primitive != Primitive::None {
            return self.handle_declaration(node, env);
        }

        // Mutation: modify the nearest enclosing binding; the current value
        // is visible as `@` while the right-hand side evaluates.
        let name = node.value.clone();
        let value_node = self.child(node, 0)?;
        let current = {
            let e = env.borrow();
            if e.has_recursive(&name) {
                Some(e.get(&name)?)
            } else {
                None
            }
        };
        let value = match current {
            Some(current) => {
                let expected = current.type_desc();
                let guard = SelfRefGuard::push(env, current);
                let value = self.evaluate(value_node, env)?;
                drop(guard);
                if !value.type_desc().matches(&expected) {
                    return Err(LumError::type_error(format!(
                        "Incompatible types for assignment to {name}: expected {expected}, got {}",
                        value.type_desc()
                    )));
                }
                value
            }
            None => self.evaluate(value_node, env)?,
        };
        env.borrow_mut().modify(&name, value.clone());
        Ok(value)
    }

    fn handle_read_assignment(&mut self, node: &Node, env: &EnvRef) -> LumResult<Value> {
        let read = self.child(node, 0)?;
        let target = self.evaluate(self.child(read, 0)?, env)?;
        let instance = target.as_struct().map_err(|_| {
            LumError::type_error("Left-hand side of assignment is not a struct")
        })?;
        let prop = self.child(read, 1)?.value.clone();

        let current = instance.borrow().field(&prop)?;
        let guard = SelfRefGuard::push(env, current);
        let value = self.evaluate(self.child(node, 1)?, env)?;
        drop(guard);

        instance.borrow_mut().set_field(&prop, value.clone())?;
        Ok(value)
    }

    fn handle_declaration(&mut self, node: &Node, env: &EnvRef) -> LumResult<Value> {
        let name = node.value.clone();
        let base = TypeDesc::from_primitive(node.primitive)
            .ok_or_else(|| LumError::runtime("Malformed declaration"))?;
        let sized = node
            .children
            .first()
            .filter(|c| c.kind == NodeKind::SizedArrayDeclare);

        let value = match (sized, node.children.len()) {
            (None, 0) => Value::default_of(&base)?,
            (Some(sz), 1) => self.eval_sized_array(sz, env)?,
            (Some(sz), 2) => {
                let array = self.eval_sized_array(sz, env)?;
                let init = self.child(node, 1)?;
                if init.kind == NodeKind::ArrayLiteral {
                    self.fill_sized_array(&array, init, env)?;
                    array
                } else {
                    let value = self.evaluate(init, env)?;
                    if !value.type_desc().matches(&array.type_desc()) {
                        return Err(LumError::type_error(format!(
                            "Incompatible types for assignment to {name}: expected {}, got {}",
                            array.type_desc(),
                            value.type_desc()
                        )));
                    }
                    value
                }
            }
            (None, 1) => {
                let value = self.evaluate(self.child(node, 0)?, env)?;
                let desc = value.type_desc();
                // `int a[] = [...]` lowers to the same shape as `int x = e`,
                // so an array of the declared element type is accepted too.
                if !desc.matches(&base) && !desc.matches(&TypeDesc::array(base.clone())) {
                    return Err(LumError::type_error(format!(
                        "Incompatible types for assignment to {name}: expected {base}, got {desc}"
                    )));
                }
                value
            }
            _ => return Err(LumError::runtime("Malformed declaration")),
        };

        env.borrow_mut().set(name, value.clone());
        Ok(value)
    }

    fn eval_sized_array(&mut self, node: &Node, env: &EnvRef) -> LumResult<Value> {
        let size = self.evaluate(self.child(node, 0)?, env)?.as_int()?;
        let size =
            usize::try_from(size).map_err(|_| LumError::runtime("Invalid array size"))?;
        let elem = TypeDesc::from_primitive(node.primitive).ok_or_else(|| {
            LumError::type_error("Sized arrays require a primitive element type")
        })?;
        let default = Value::default_of(&elem)?;
        Ok(Value::Array(Rc::new(RefCell::new(LumArray::filled(
            elem, size, default,
        )))))
    }

    /// Initialize a default-filled sized array from a literal. Each element
    /// evaluates with the destination slot's current value pushed as `@`.
    fn fill_sized_array(&mut self, array: &Value, literal: &Node, env: &EnvRef) -> LumResult<()> {
        let arr = match array {
            Value::Array(a) => a.clone(),
            _ => return Err(LumError::runtime("Malformed sized array")),
        };
        let mut slot: i64 = 0;
        for child in &literal.children {
            if child.kind == NodeKind::Range {
                let start = self.evaluate(self.child(child, 0)?, env)?.as_int()?;
                let end = self.evaluate(self.child(child, 1)?, env)?.as_int()?;
                for i in start..=end {
                    arr.borrow_mut().set(slot, Value::Int(i))?;
                    slot += 1;
                }
            } else {
                let current = arr.borrow().get(slot)?;
                let guard = SelfRefGuard::push(env, current);
                let value = self.evaluate(child, env)?;
                drop(guard);
                arr.borrow_mut().set(slot, value)?;
                slot += 1;
            }
        }
        Ok(())
    }

    fn handle_struct_assignment(&mut self, node: &Node, env: &EnvRef) -> LumResult<Value> {
        let var = node.value.clone();
        let type_child = self.child(node, 0)?;
        let type_name = type_child.value.clone();

        match type_child.kind {
            // `P p = { ... }`
            NodeKind::String => {
                let ty = env
                    .borrow()
                    .get_type(&type_name)
                    .ok_or_else(|| LumError::type_error(format!("Struct not found: {type_name}")))?;
                let mut instance = StructInstance::new(&type_name, ty.clone());
                let mut positional = 0usize;

                for child in &node.children[1..] {
                    let (field_name, value) = if child.kind == NodeKind::PrimitiveAssign
                        && !child.value.is_empty()
                    {
                        let value = self.evaluate(self.child(child, 0)?, env)?;
                        (child.value.clone(), value)
                    } else {
                        let field_name = ty
                            .fields
                            .get(positional)
                            .map(|(n, _)| n.clone())
                            .ok_or_else(|| {
                                LumError::type_error(format!(
                                    "Too many positional values for struct: {type_name}"
                                ))
                            })?;
                        positional += 1;
                        (field_name, self.evaluate(child, env)?)
                    };

                    let declared = ty.field(&field_name).ok_or_else(|| {
                        LumError::type_error(format!(
                            "Struct {type_name} does not have field: {field_name}"
                        ))
                    })?;
                    if !value.type_desc().matches(declared) {
                        return Err(LumError::type_error(format!(
                            "Incompatible types for field {field_name}: expected {declared}, got {}",
                            value.type_desc()
                        )));
                    }
                    instance.add_field(field_name, value);
                }

                let value = Value::Struct(Rc::new(RefCell::new(instance)));
                env.borrow_mut().set(var, value.clone());
                Ok(value)
            }

            // `P p;` / `P p = expr;`
            NodeKind::Identifier => match node.children.get(1) {
                None => {
                    let value = self.default_struct(&type_name, env, 0)?;
                    env.borrow_mut().set(var, value.clone());
                    Ok(value)
                }
                Some(c) if c.kind == NodeKind::SizedArrayDeclare => Err(LumError::type_error(
                    "Sized arrays of structs are not supported",
                )),
                Some(rhs) => {
                    let value = self.evaluate(rhs, env)?;
                    let matches = matches!(&value, Value::Struct(s) if s.borrow().name == type_name);
                    if !matches {
                        return Err(LumError::type_error(format!(
                            "RHS expression does not evaluate to a {type_name} struct"
                        )));
                    }
                    env.borrow_mut().set(var, value.clone());
                    Ok(value)
                }
            },

            _ => Err(LumError::runtime("Malformed struct assignment")),
        }
    }

    fn default_struct(&mut self, type_name: &str, env: &EnvRef, depth: usize) -> LumResult<Value> {
        if depth > 256 {
            return Err(LumError::runtime(format!(
                "Struct nesting too deep while defaulting {type_name}"
            )));
        }
        let ty = env
            .borrow()
            .get_type(type_name)
            .ok_or_else(|| LumError::type_error(format!("Struct not found: {type_name}")))?;
        let mut instance = StructInstance::new(type_name, ty.clone());
        for (field_name, desc) in &ty.fields {
            let value = match desc.kind {
                BaseType::Struct => self.default_struct(&desc.name, env, depth + 1)?,
                _ => Value::default_of(desc)?,
            };
            instance.add_field(field_name.clone(), value);
        }
        Ok(Value::Struct(Rc::new(RefCell::new(instance))))
    }

    /// `ident { d1, d2 } [!|!!] = expr;` fills a flat int array. The
    /// efficiency marker decides what `@` means while each slot's value is
    /// produced.
    fn handle_ndarray_assignment(&mut self, node: &Node, env: &EnvRef) -> LumResult<Value> {
        if node.children.len() < 2 {
            return Err(LumError::runtime("Malformed NDArray assignment"));
        }
        let efficiency: i64 = self
            .child(node, 0)?
            .value
            .parse()
            .map_err(|_| LumError::runtime("Malformed NDArray assignment"))?;
        let rhs = &node.children[node.children.len() - 1];

        let mut shape = Vec::new();
        for dim in &node.children[1..node.children.len() - 1] {
            let d = self.evaluate(dim, env)?.as_int()?;
            shape.push(
                usize::try_from(d).map_err(|_| LumError::runtime("Invalid array dimension"))?,
            );
        }
        let total = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| LumError::runtime("Array too large"))?;

        let int_desc = TypeDesc::base(BaseType::Int);
        let mut items = Vec::with_capacity(total);

        match efficiency {
            // Evaluate once, fill every slot (cyclically for an array RHS).
            0 => {
                let value = self.evaluate(rhs, env)?;
                for flat in 0..total {
                    items.push(Value::Int(cyclic_int(&value, flat)?));
                }
            }
            // Per slot, with the flat index as `@`.
            1 => {
                for flat in 0..total {
                    let guard = SelfRefGuard::push(env, Value::Int(flat as i64));
                    let value = self.evaluate(rhs, env)?;
                    drop(guard);
                    items.push(Value::Int(cyclic_int(&value, flat)?));
                }
            }
            // Per slot, with the multi-index tuple as `@`, advanced
            // lexicographically after each slot.
            2 => {
                let index = Rc::new(RefCell::new(LumArray::filled(
                    int_desc.clone(),
                    shape.len(),
                    Value::Int(0),
                )));
                let guard = SelfRefGuard::push(env, Value::Array(index.clone()));
                let mut multi = vec![0usize; shape.len()];
                for flat in 0..total {
                    let value = self.evaluate(rhs, env)?;
                    items.push(Value::Int(cyclic_int(&value, flat)?));

                    for d in (0..shape.len()).rev() {
                        multi[d] += 1;
                        index.borrow_mut().items[d] = Value::Int(multi[d] as i64);
                        if multi[d] < shape[d] {
                            break;
                        }
                        multi[d] = 0;
                        index.borrow_mut().items[d] = Value::Int(0);
                    }
                }
                drop(guard);
            }
            _ => return Err(LumError::runtime("Invalid self-reference level")),
        }

        let value = Value::Array(Rc::new(RefCell::new(LumArray {
            elem: int_desc,
            items,
        })));
        env.borrow_mut().set(node.value.clone(), value.clone());
        Ok(value)
    }

    // === Expression evaluation ===

    pub fn evaluate(&mut self, node: &Node, env: &EnvRef) -> LumResult<Value> {
        match node.kind {
            NodeKind::Number => node
                .value
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| LumError::runtime(format!("Malformed number literal: {}", node.value))),
            NodeKind::Bool => Ok(Value::Bool(node.value == "1")),
            NodeKind::String => Ok(Value::Str(node.value.clone())),
            NodeKind::Identifier => env.borrow().get(&node.value),
            NodeKind::SelfRef => env
                .borrow()
                .current_self_ref()
                .ok_or_else(|| LumError::runtime("Self-reference read with empty stack")),

            NodeKind::PrimitiveAssign => self.handle_assignment(node, env),
            NodeKind::StructAssign => self.handle_struct_assignment(node, env),
            NodeKind::NdArrayAssign => self.handle_ndarray_assignment(node, env),
            NodeKind::SizedArrayDeclare => self.eval_sized_array(node, env),

            NodeKind::Range => {
                let start = self.evaluate(self.child(node, 0)?, env)?.as_int()?;
                let end = self.evaluate(self.child(node, 1)?, env)?.as_int()?;
                let items = (start..=end).map(Value::Int).collect();
                Ok(Value::Array(Rc::new(RefCell::new(LumArray {
                    elem: TypeDesc::base(BaseType::Int),
                    items,
                }))))
            }

            NodeKind::ArrayLiteral => self.eval_array_literal(node, env),

            NodeKind::ArrayAccess => {
                let target = self.evaluate(self.child(node, 0)?, env)?;
                let arr = match &target {
                    Value::Array(a) => a.clone(),
                    other => {
                        return Err(LumError::type_error(format!(
                            "Attempted array access on non-array ({})",
                            other.type_desc()
                        )))
                    }
                };
                let indices = self.eval_indices(self.child(node, 1)?, env)?;
                if indices.len() == 1 {
                    return arr.borrow().get(indices[0]);
                }
                let mut gathered = LumArray::new(arr.borrow().elem.clone());
                for &idx in &indices {
                    let item = arr.borrow().get(idx)?;
                    gathered.items.push(item);
                }
                Ok(Value::Array(Rc::new(RefCell::new(gathered))))
            }

            NodeKind::ArrayAssign => {
                let target = self.evaluate(self.child(node, 0)?, env)?;
                let arr = match &target {
                    Value::Array(a) => a.clone(),
                    other => {
                        return Err(LumError::type_error(format!(
                            "Attempted array assignment on non-array ({})",
                            other.type_desc()
                        )))
                    }
                };
                let indices = self.eval_indices(self.child(node, 1)?, env)?;
                let rhs = self.evaluate(self.child(node, 2)?, env)?;
                let values: Vec<Value> = match &rhs {
                    Value::Array(v) => v.borrow().items.clone(),
                    scalar => vec![scalar.clone()],
                };
                let last = values
                    .last()
                    .cloned()
                    .ok_or_else(|| LumError::runtime("Cannot assign from an empty array"))?;
                for (i, &idx) in indices.iter().enumerate() {
                    let value = values.get(i).cloned().unwrap_or_else(|| last.clone());
                    arr.borrow_mut().set(idx, value)?;
                }
                Ok(target)
            }

            NodeKind::Call => {
                let callee = self.evaluate(self.child(node, 0)?, env)?;
                let func = callee.as_function()?;
                let mut args = Vec::with_capacity(node.children.len() - 1);
                for arg in &node.children[1..] {
                    args.push(self.evaluate(arg, env)?);
                }
                (func.call)(self, args)
            }

            NodeKind::BinaryOp => {
                let op = node
                    .op
                    .ok_or_else(|| LumError::runtime("Unsupported binary op"))?;
                let left = self.evaluate(self.child(node, 0)?, env)?;
                let right = self.evaluate(self.child(node, 1)?, env)?;
                binary_op(op, left, right)
            }

            NodeKind::UnaryOp => {
                let op = node
                    .op
                    .ok_or_else(|| LumError::runtime("Unsupported unary op"))?;
                let value = self.evaluate(self.child(node, 0)?, env)?.as_int()?;
                match op {
                    BinOp::Sub => value
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| LumError::runtime("Integer overflow")),
                    BinOp::Not => Ok(Value::Bool(value == 0)),
                    BinOp::BitNot => Ok(Value::Int(!value)),
                    _ => Err(LumError::runtime("Unsupported unary op")),
                }
            }

            NodeKind::Read => {
                let target = self.evaluate(self.child(node, 0)?, env)?;
                read_property(&target, &self.child(node, 1)?.value)
            }

            other => Err(LumError::runtime(format!(
                "Unsupported expression node: {other:?}"
            ))),
        }
    }

    /// Array literal: the first element fixes the element type; each
    /// element's value is exposed as `@` while the next one is built.
    fn eval_array_literal(&mut self, node: &Node, env: &EnvRef) -> LumResult<Value> {
        let mut elem: Option<TypeDesc> = None;
        let mut items = Vec::new();
        let mut guard: Option<SelfRefGuard> = None;

        for child in &node.children {
            if child.kind == NodeKind::Range {
                match &elem {
                    None => elem = Some(TypeDesc::base(BaseType::Int)),
                    Some(desc) if desc.kind == BaseType::Int => {}
                    Some(desc) => {
                        return Err(LumError::type_error(format!(
                            "Range elements require an int array literal, found {desc}"
                        )))
                    }
                }
                let start = self.evaluate(self.child(child, 0)?, env)?.as_int()?;
                let end = self.evaluate(self.child(child, 1)?, env)?.as_int()?;
                for i in start..=end {
                    items.push(Value::Int(i));
                    let _ = guard.take();
                    guard = Some(SelfRefGuard::push(env, Value::Int(i)));
                }
            } else {
                let value = self.evaluate(child, env)?;
                match &elem {
                    None => elem = Some(value.type_desc()),
                    Some(desc) => {
                        if !value.type_desc().matches(desc) {
                            return Err(LumError::type_error(format!(
                                "Mixed-type array literal: expected {desc}, got {}",
                                value.type_desc()
                            )));
                        }
                    }
                }
                items.push(value.clone());
                let _ = guard.take();
                guard = Some(SelfRefGuard::push(env, value));
            }
        }
        drop(guard);

        Ok(Value::Array(Rc::new(RefCell::new(LumArray {
            elem: elem.unwrap_or(TypeDesc::base(BaseType::Nil)),
            items,
        }))))
    }

    /// Expand an index block: single indices plus inclusive ranges, in
    /// order.
    fn eval_indices(&mut self, block: &Node, env: &EnvRef) -> LumResult<Vec<i64>> {
        let mut indices = Vec::new();
        for idx in &block.children {
            if idx.kind == NodeKind::Range {
                let start = self.evaluate(self.child(idx, 0)?, env)?.as_int()?;
                let end = self.evaluate(self.child(idx, 1)?, env)?.as_int()?;
                for i in start..=end {
                    indices.push(i);
                }
            } else {
                indices.push(self.evaluate(idx, env)?.as_int()?);
            }
        }
        Ok(indices)
    }

    // === Functions ===

    /// Build a callable from a `Function` node. The closure re-checks
    /// argument and return types on every call.
    fn build_function(&mut self, node: &Node, env: &EnvRef) -> LumResult<Value> {
        let (params, ret) = function_signature(node)?;
        let body = node
            .children
            .last()
            .cloned()
            .ok_or_else(|| LumError::runtime("Malformed function node"))?;
        let closure = env.clone();
        let name = node.value.clone();

        Ok(LumFunction::new(move |exec: &mut Executor, args: Vec<Value>| {
            let local = Environment::child(&closure);
            for (param, value) in bind_arguments(&name, &params, args)? {
                local.borrow_mut().set(param, value);
            }
            let value = exec.execute_node(&body, &local)?.unwrap_or(Value::Nil);
            if !value.type_desc().matches(&ret) {
                return Err(LumError::type_error(format!(
                    "Function return type mismatch in {name}: got {}, expected {ret}",
                    value.type_desc()
                )));
            }
            Ok(value)
        }))
    }
}

/// Parameter list and return type from a `Function` node. The last child is
/// the body; the rest are parameters, each carrying a type child and an
/// optional vararg sentinel.
fn function_signature(node: &Node) -> LumResult<(Vec<ParamSpec>, TypeDesc)> {
    if node.children.is_empty() {
        return Err(LumError::runtime("Malformed function node"));
    }
    let mut params = Vec::new();
    for param in &node.children[..node.children.len() - 1] {
        let ty_node = param
            .children
            .first()
            .ok_or_else(|| LumError::runtime("Malformed function parameter"))?;
        let variadic = param
            .children
            .get(1)
            .is_some_and(|c| c.kind == NodeKind::ArrayAssign);
        params.push(ParamSpec {
            name: param.value.clone(),
            ty: TypeDesc::from_name(&ty_node.value),
            variadic,
        });
    }
    Ok((params, TypeDesc::from_name(&node.ret_type)))
}

/// Bind call arguments to parameters: positional with per-argument type
/// match; a trailing variadic parameter collects the remaining arguments
/// into an array of its declared type.
fn bind_arguments(
    name: &str,
    params: &[ParamSpec],
    args: Vec<Value>,
) -> LumResult<Vec<(String, Value)>> {
    let mut bound = Vec::with_capacity(params.len());
    let mut next = 0usize;

    for param in params {
        if param.variadic {
            let mut rest = LumArray::new(param.ty.clone());
            while next < args.len() {
                rest.push(args[next].clone())?;
                next += 1;
            }
            bound.push((
                param.name.clone(),
                Value::Array(Rc::new(RefCell::new(rest))),
            ));
        } else {
            let arg = args.get(next).cloned().ok_or_else(|| {
                LumError::type_error(format!(
                    "Wrong number of arguments for {name}: expected {}, got {}",
                    params.len(),
                    args.len()
                ))
            })?;
            if !arg.type_desc().matches(&param.ty) {
                return Err(LumError::type_error(format!(
                    "Wrong argument type for {} in {name}: expected {}, got {}",
                    param.name,
                    param.ty,
                    arg.type_desc()
                )));
            }
            bound.push((param.name.clone(), arg));
            next += 1;
        }
    }

    if next < args.len() {
        return Err(LumError::type_error(format!(
            "Wrong number of arguments for {name}: expected {}, got {}",
            params.len(),
            args.len()
        )));
    }
    Ok(bound)
}

fn cyclic_int(value: &Value, flat: usize) -> LumResult<i64> {
    match value {
        Value::Array(arr) => {
            let arr = arr.borrow();
            if arr.is_empty() {
                Ok(0)
            } else {
                arr.items[flat % arr.len()].as_int()
            }
        }
        other => other.as_int(),
    }
}

fn binary_op(op: BinOp, left: Value, right: Value) -> LumResult<Value> {
    // String specials: concatenation renders the right operand the way
    // `print` would; `s * n` repeats.
    if let Value::Str(s) = &left {
        match op {
            BinOp::Add => return Ok(Value::Str(format!("{s}{right}"))),
            BinOp::Mul => {
                let n = right.as_int()?;
                let n = usize::try_from(n).map_err(|_| {
                    LumError::runtime("Cannot repeat a string a negative number of times")
                })?;
                return Ok(Value::Str(s.repeat(n)));
            }
            _ => {}
        }
    }

    match op {
        BinOp::And => Ok(Value::Bool(left.as_bool()? && right.as_bool()?)),
        BinOp::Or => Ok(Value::Bool(left.as_bool()? || right.as_bool()?)),
        _ => {
            let l = left.as_int()?;
            let r = right.as_int()?;
            let overflow = || LumError::runtime("Integer overflow");
            match op {
                BinOp::Add => l.checked_add(r).map(Value::Int).ok_or_else(overflow),
                BinOp::Sub => l.checked_sub(r).map(Value::Int).ok_or_else(overflow),
                BinOp::Mul => l.checked_mul(r).map(Value::Int).ok_or_else(overflow),
                BinOp::Div => {
                    if r == 0 {
                        return Err(LumError::runtime("Division by zero"));
                    }
                    l.checked_div(r).map(Value::Int).ok_or_else(overflow)
                }
                BinOp::Mod => {
                    if r == 0 {
                        return Err(LumError::runtime("Modulus by zero"));
                    }
                    l.checked_rem(r).map(Value::Int).ok_or_else(overflow)
                }
                BinOp::BitAnd => Ok(Value::Int(l & r)),
                BinOp::BitOr => Ok(Value::Int(l | r)),
                BinOp::BitXor => Ok(Value::Int(l ^ r)),
                BinOp::Eq => Ok(Value::Bool(l == r)),
                BinOp::Lt => Ok(Value::Bool(l < r)),
                BinOp::Gt => Ok(Value::Bool(l > r)),
                BinOp::Le => Ok(Value::Bool(l <= r)),
                BinOp::Ge => Ok(Value::Bool(l >= r)),
                _ => Err(LumError::runtime("Unsupported binary op")),
            }
        }
    }
}

fn read_property(target: &Value, property: &str) -> LumResult<Value> {
    match target {
        Value::Struct(s) => s.borrow().field(property),
        Value::Array(arr) => {
            if property == "length" {
                Ok(Value::Int(arr.borrow().len() as i64))
            } else {
                Err(LumError::runtime(format!(
                    "Unknown array property: {property}"
                )))
            }
        }
        Value::Export(e) => e.borrow().exported_value(property),
        other => Err(LumError::type_error(format!(
            "Attempted property read on non-object ({})",
            other.type_desc()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn run(source: &str) -> LumResult<Value> {
        let program = parse_program(source, "test.lum")?;
        Executor::new(program).run()
    }

    fn run_int(source: &str) -> i64 {
        run(source).unwrap().as_int().unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(run_int("fin int main() { return 2 + 3 * 4; }"), 14);
        assert_eq!(run_int("fin int main() { return (2 + 3) * 4; }"), 20);
        assert_eq!(run_int("fin int main() { return 7 / 2 - 10 % 3; }"), 2);
        assert_eq!(run_int("fin int main() { return -(3) + ~0; }"), -4);
    }

    #[test]
    fn program_without_main_returns_zero() {
        assert_eq!(run("int x = 1;").unwrap().as_int().unwrap(), 0);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        assert!(matches!(
            run("fin int main() { return 1 / 0; }"),
            Err(LumError::Runtime { .. })
        ));
        assert!(matches!(
            run("fin int main() { return 1 % 0; }"),
            Err(LumError::Runtime { .. })
        ));
    }

    #[test]
    fn integer_overflow_is_fatal() {
        assert!(matches!(
            run("fin int main() { return 9223372036854775807 + 1; }"),
            Err(LumError::Runtime { .. })
        ));
    }

    #[test]
    fn scoping_get_and_modify() {
        // The inner block shadows with its own declaration; mutation reaches
        // the outer binding.
        assert_eq!(
            run_int(
                "fin int main() {
                     int x = 1;
                     { int x = 5; x = 6; }
                     { x = 2; }
                     return x;
                 }"
            ),
            2
        );
    }

    #[test]
    fn self_update_sugar_executes() {
        assert_eq!(run_int("fin int main() { int x = 4; x++; x += 3; return x; }"), 8);
        assert_eq!(run_int("fin int main() { int x = 4; x--; x -= 2; return x; }"), 1);
    }

    #[test]
    fn array_range_literal() {
        assert_eq!(
            run_int("fin int main() { int a[] = [1..5]; return a[0] + a[1] + a[2] + a[3] + a[4]; }"),
            15
        );
        assert_eq!(run_int("fin int main() { int a[] = [1..5]; return a.length; }"), 5);
    }

    #[test]
    fn array_indexing_and_mutation() {
        assert_eq!(
            run_int("fin int main() { int a[3] = [10, 20, 30]; return a[1]; }"),
            20
        );
        assert_eq!(
            run_int("fin int main() { int a[3] = [10, 20, 30]; a[1] = 7; return a[1]; }"),
            7
        );
    }

    #[test]
    fn slice_gather_preserves_order() {
        assert_eq!(
            run_int(
                "fin int main() {
                     int a[] = [0, 10, 20, 30, 40];
                     int b[] = a[0, 2, 4];
                     return b[0] * 100 + b[1] + b[2] / 10;
                 }"
            ),
            24
        );
    }

    #[test]
    fn range_assignment_broadcasts_elementwise() {
        assert_eq!(
            run_int(
                "fin int main() {
                     int a[5];
                     a[0..2] = [10, 20, 30];
                     return a[0] + a[1] + a[2] + a[3];
                 }"
            ),
            60
        );
    }

    #[test]
    fn scalar_broadcast_repeats_last() {
        assert_eq!(
            run_int("fin int main() { int a[4]; a[0..3] = 9; return a[0] + a[3]; }"),
            18
        );
        assert_eq!(
            run_int(
                "fin int main() { int a[4]; a[0..3] = [5, 6]; return a[2] + a[3]; }"
            ),
            12
        );
    }

    #[test]
    fn sized_array_self_reference_counts_up() {
        // Each element sees its destination slot's default as @.
        for i in 0..5 {
            assert_eq!(
                run_int(&format!(
                    "fin int main() {{ int a[5] = [@, @+1, @+2, @+3, @+4]; return a[{i}]; }}"
                )),
                i
            );
        }
    }

    #[test]
    fn array_element_type_is_enforced() {
        assert!(matches!(
            run("fin main() { int a[2]; a[0] = true; }"),
            Err(LumError::Type { .. })
        ));
        assert!(matches!(
            run("fin main() { int a[] = [1, true]; }"),
            Err(LumError::Type { .. })
        ));
    }

    #[test]
    fn assignment_type_is_enforced() {
        assert!(matches!(
            run("fin main() { int x = \"hi\"; }"),
            Err(LumError::Type { .. })
        ));
        assert!(matches!(
            run("fin main() { int x = 1; x = \"hi\"; }"),
            Err(LumError::Type { .. })
        ));
    }

    #[test]
    fn index_out_of_range_is_fatal() {
        assert!(matches!(
            run("fin main() { int a[2]; int x = a[5]; }"),
            Err(LumError::Runtime { .. })
        ));
    }

    #[test]
    fn while_and_for_loops() {
        assert_eq!(
            run_int(
                "fin int main() {
                     int s = 0;
                     int i = 0;
                     while (i < 5) { s = s + i; i++; }
                     return s;
                 }"
            ),
            10
        );
        assert_eq!(
            run_int(
                "fin int main() {
                     int s = 0;
                     for (int i = 0; i < 5; i = i + 1) s = s + i;
                     return s;
                 }"
            ),
            10
        );
    }

    #[test]
    fn for_in_iterates_elements() {
        assert_eq!(
            run_int(
                "fin int main() {
                     int s = 0;
                     for (int x : [1..4]) s = s + x;
                     return s;
                 }"
            ),
            10
        );
    }

    #[test]
    fn return_propagates_through_loops() {
        assert_eq!(
            run_int(
                "fin int main() {
                     for (int i = 0; i < 10; i++) { if (i == 3) return i; }
                     return -1;
                 }"
            ),
            3
        );
    }

    #[test]
    fn functions_and_recursion() {
        assert_eq!(
            run_int(
                "fin int fact(int n) { if (n < 2) return 1; return n * fact(n - 1); }
                 fin int main() { return fact(5); }"
            ),
            120
        );
    }

    #[test]
    fn closures_capture_their_environment() {
        assert_eq!(
            run_int(
                "int base = 10;
                 fin int addBase(int n) { return base + n; }
                 fin int main() { base = 20; return addBase(5); }"
            ),
            25
        );
    }

    #[test]
    fn varargs_collect_into_array() {
        assert_eq!(
            run_int(
                "fin int sum(int xs...) {
                     int s = 0;
                     for (int x : xs) s = s + x;
                     return s;
                 }
                 fin int main() { return sum(1, 2, 3, 4); }"
            ),
            10
        );
        assert_eq!(
            run_int(
                "fin int count(string first, int rest...) { return rest.length; }
                 fin int main() { return count(\"x\", 1, 2, 3); }"
            ),
            3
        );
    }

    #[test]
    fn argument_types_and_arity_are_enforced() {
        assert!(matches!(
            run("fin int id(int x) { return x; } fin main() { int y = id(true); }"),
            Err(LumError::Type { .. })
        ));
        assert!(matches!(
            run("fin int id(int x) { return x; } fin main() { int y = id(1, 2); }"),
            Err(LumError::Type { .. })
        ));
    }

    #[test]
    fn return_type_is_enforced() {
        assert!(matches!(
            run("fin int f() { return true; } fin main() { f(); }"),
            Err(LumError::Type { .. })
        ));
        // A nil function may fall off the end.
        assert!(run("fin f() { int x = 1; } fin main() { f(); }").is_ok());
    }

    #[test]
    fn calling_a_non_function_is_fatal() {
        assert!(matches!(
            run("fin main() { int x = 1; x(); }"),
            Err(LumError::Type { .. })
        ));
    }

    #[test]
    fn structs_declare_initialize_and_mutate() {
        assert_eq!(
            run_int(
                "struct P { int x; int y; };
                 fin int main() {
                     P p = {1, 2};
                     p.x = p.x + p.y;
                     return p.x;
                 }"
            ),
            3
        );
    }

    #[test]
    fn struct_named_initializers_mix_with_positional() {
        assert_eq!(
            run_int(
                "struct P { int x; int y; };
                 fin int main() { P p = {1, y: 5}; return p.y - p.x; }"
            ),
            4
        );
    }

    #[test]
    fn struct_field_types_are_nominal_and_enforced() {
        assert!(matches!(
            run("struct P { int x; }; fin main() { P p = {true}; }"),
            Err(LumError::Type { .. })
        ));
        assert!(matches!(
            run("struct P { int x; }; fin main() { P p = {1}; p.x = \"s\"; }"),
            Err(LumError::Type { .. })
        ));
        assert!(matches!(
            run("struct P { int x; }; struct Q { int x; };
                 fin P make() { P p = {1}; return p; }
                 fin main() { Q q = make(); }"),
            Err(LumError::Type { .. })
        ));
    }

    #[test]
    fn struct_missing_field_is_fatal() {
        assert!(matches!(
            run("struct P { int x; }; fin main() { P p = {1}; int y = p.z; }"),
            Err(LumError::Type { .. })
        ));
    }

    #[test]
    fn struct_default_declaration() {
        assert_eq!(
            run_int("struct P { int x; int y; }; fin int main() { P p; return p.x + p.y; }"),
            0
        );
    }

    #[test]
    fn structs_share_by_reference() {
        assert_eq!(
            run_int(
                "struct P { int x; };
                 fin bump(P p) { p.x = p.x + 1; }
                 fin int main() { P p = {1}; bump(p); bump(p); return p.x; }"
            ),
            3
        );
    }

    #[test]
    fn ndarray_fill_levels() {
        // Level 0: one evaluation, broadcast.
        assert_eq!(
            run_int("fin int main() { m{2,3} = 7; return m[0] + m[5]; }"),
            14
        );
        // Level 1: @ is the flat index.
        assert_eq!(
            run_int("fin int main() { m{2,3}! = @ * 2; return m[4]; }"),
            8
        );
        // Level 2: @ is the multi-index tuple; element (r, c) = r * c.
        assert_eq!(
            run_int("fin int main() { m{3,3}!! = @[0] * @[1]; return m[2*3+2]; }"),
            4
        );
        // Cyclic copy of an array right-hand side.
        assert_eq!(
            run_int("fin int main() { m{2,2} = [1, 2]; return m[0] + m[1] + m[2] + m[3]; }"),
            6
        );
    }

    #[test]
    fn string_operations() {
        let v = run("fin string main() { return \"ab\" + 3; }").unwrap();
        assert_eq!(v.as_str().unwrap(), "ab3");
        let v = run("fin string main() { return \"ab\" * 3; }").unwrap();
        assert_eq!(v.as_str().unwrap(), "ababab");
        let v = run("fin string main() { return \"n=\" + true; }").unwrap();
        assert_eq!(v.as_str().unwrap(), "n=true");
        assert!(matches!(
            run("fin int main() { return 1 + \"x\"; }"),
            Err(LumError::Type { .. })
        ));
    }

    #[test]
    fn logical_and_comparison_operators() {
        assert_eq!(run_int("fin int main() { if (1 < 2 && 2 <= 2) return 1; return 0; }"), 1);
        assert_eq!(run_int("fin int main() { if (1 > 2 || !false) return 1; return 0; }"), 1);
        assert_eq!(run_int("fin int main() { if (2 == 2) return 1; return 0; }"), 1);
    }

    #[test]
    fn bool_coerces_in_arithmetic() {
        assert_eq!(run_int("fin int main() { return true + true; }"), 2);
    }

    #[test]
    fn native_stub_without_registration_fails_at_call() {
        let result = run("native fin mystery(int x); fin main() { mystery(1); }");
        assert!(matches!(result, Err(LumError::Module { .. })));
    }

    #[test]
    fn undefined_variable_is_fatal() {
        assert!(matches!(
            run("fin main() { int x = missing; }"),
            Err(LumError::Runtime { .. })
        ));
    }

    #[test]
    fn unknown_module_import_is_fatal() {
        assert!(matches!(
            run("import \"nosuchmodule\"; fin main() { }"),
            Err(LumError::Module { .. })
        ));
    }

    mod modules {
        use super::*;
        use std::fs;
        use std::path::PathBuf;

        /// Materialize sources under a unique temp dir so import paths in
        /// the test programs resolve on disk.
        fn temp_module_dir(tag: &str) -> PathBuf {
            let dir = std::env::temp_dir().join(format!(
                "lum-test-{tag}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            dir
        }

        fn run_entry(dir: &PathBuf, entry: &str) -> LumResult<Value> {
            let path = dir.join(entry);
            let source = fs::read_to_string(&path).unwrap();
            let program = parse_program(&source, path.to_str().unwrap())?;
            Executor::new(program).run()
        }

        #[test]
        fn import_reads_exported_value() {
            let dir = temp_module_dir("export");
            let a = dir.join("a.lum");
            fs::write(&a, "export int K = 7;").unwrap();
            fs::write(
                dir.join("b.lum"),
                format!(
                    "import \"{}\" as A;\nfin int main() {{ return A.K; }}",
                    a.display()
                ),
            )
            .unwrap();

            let result = run_entry(&dir, "b.lum").unwrap();
            assert_eq!(result.as_int().unwrap(), 7);
            let _ = fs::remove_dir_all(&dir);
        }

        #[test]
        fn exported_functions_are_callable() {
            let dir = temp_module_dir("fn-export");
            let a = dir.join("a.lum");
            fs::write(&a, "export fin int twice(int n) { return n * 2; }").unwrap();
            fs::write(
                dir.join("b.lum"),
                format!(
                    "import \"{}\" as A;\nfin int main() {{ return A.twice(21); }}",
                    a.display()
                ),
            )
            .unwrap();

            let result = run_entry(&dir, "b.lum").unwrap();
            assert_eq!(result.as_int().unwrap(), 42);
            let _ = fs::remove_dir_all(&dir);
        }

        #[test]
        fn circular_import_is_fatal() {
            let dir = temp_module_dir("cycle");
            let a = dir.join("a.lum");
            let b = dir.join("b.lum");
            fs::write(
                &a,
                format!("import \"{}\" as B;\nexport int X = 1;", b.display()),
            )
            .unwrap();
            fs::write(
                &b,
                format!(
                    "import \"{}\" as A;\nexport int Y = 2;\nfin main() {{ }}",
                    a.display()
                ),
            )
            .unwrap();

            let err = run_entry(&dir, "b.lum").unwrap_err();
            match err {
                LumError::Module { message } => assert!(message.contains("Circular import")),
                other => panic!("expected module error, got {other}"),
            }
            let _ = fs::remove_dir_all(&dir);
        }

        #[test]
        fn exporting_undefined_variable_is_fatal() {
            use crate::ast::{Node, NodeKind};

            // The parser can't produce this shape, but a hand-built (or
            // decoded) pragma can export a name its body never defines.
            let mut pragma = Node::leaf(NodeKind::Pragma, "ghost.lum");
            pragma.push(Node::new(NodeKind::ImportBlock));
            let mut exports = Node::new(NodeKind::ImportBlock);
            exports.push(Node::leaf(NodeKind::Identifier, "ghost"));
            pragma.push(exports);

            let mut program = Node::new(NodeKind::Program);
            program.push(pragma);

            let err = Executor::new(program).run().unwrap_err();
            match err {
                LumError::Module { message } => {
                    assert!(message.contains("Cannot export undefined variable"))
                }
                other => panic!("expected module error, got {other}"),
            }
        }
    }
}
