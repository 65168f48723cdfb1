//! Runtime values and the nominal type system.
//!
//! Every value can answer its `TypeDesc`; assignments, calls and returns all
//! gate on descriptor matches. Heap values (arrays, structs, functions,
//! export handles) are reference counted and shared, so mutations are
//! visible through every alias.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Primitive;
use crate::env::EnvRef;
use crate::error::{LumError, LumResult};
use crate::executor::Executor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Int,
    Bool,
    String,
    Array,
    Function,
    Struct,
    ExportData,
    Nil,
}

/// Nominal type descriptor. Structs match by name, arrays recursively by
/// element type, everything else by base kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDesc {
    pub kind: BaseType,
    pub name: String,
    pub elem: Option<Box<TypeDesc>>,
}

impl TypeDesc {
    pub fn base(kind: BaseType) -> Self {
        TypeDesc {
            kind,
            name: String::new(),
            elem: None,
        }
    }

    pub fn structure(name: impl Into<String>) -> Self {
        TypeDesc {
            kind: BaseType::Struct,
            name: name.into(),
            elem: None,
        }
    }

    pub fn array(elem: TypeDesc) -> Self {
        TypeDesc {
            kind: BaseType::Array,
            name: String::new(),
            elem: Some(Box::new(elem)),
        }
    }

    pub fn from_primitive(p: Primitive) -> Option<Self> {
        match p {
            Primitive::Int => Some(TypeDesc::base(BaseType::Int)),
            Primitive::Bool => Some(TypeDesc::base(BaseType::Bool)),
            Primitive::String => Some(TypeDesc::base(BaseType::String)),
            Primitive::None => None,
        }
    }

    /// Resolve a written type name: a primitive name, `nil`/`void`, or a
    /// nominal struct name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "int" => TypeDesc::base(BaseType::Int),
            "bool" => TypeDesc::base(BaseType::Bool),
            "string" => TypeDesc::base(BaseType::String),
            "nil" | "void" | "" => TypeDesc::base(BaseType::Nil),
            other => TypeDesc::structure(other),
        }
    }

    pub fn matches(&self, other: &TypeDesc) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match self.kind {
            BaseType::Struct => self.name == other.name,
            BaseType::Array => match (&self.elem, &other.elem) {
                (Some(a), Some(b)) => a.matches(b),
                _ => false,
            },
            _ => true,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BaseType::Int => write!(f, "int"),
            BaseType::Bool => write!(f, "bool"),
            BaseType::String => write!(f, "string"),
            BaseType::Nil => write!(f, "nil"),
            BaseType::Function => write!(f, "function"),
            BaseType::ExportData => write!(f, "file data"),
            BaseType::Struct => write!(f, "struct {}", self.name),
            BaseType::Array => match &self.elem {
                Some(elem) => write!(f, "{elem}[]"),
                None => write!(f, "[]"),
            },
        }
    }
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Nil,
    Str(String),
    Array(Rc<RefCell<LumArray>>),
    Function(Rc<LumFunction>),
    Struct(Rc<RefCell<StructInstance>>),
    Export(Rc<RefCell<ExportData>>),
}

impl Value {
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            Value::Int(_) => TypeDesc::base(BaseType::Int),
            Value::Bool(_) => TypeDesc::base(BaseType::Bool),
            Value::Nil => TypeDesc::base(BaseType::Nil),
            Value::Str(_) => TypeDesc::base(BaseType::String),
            Value::Array(arr) => TypeDesc::array(arr.borrow().elem.clone()),
            Value::Function(_) => TypeDesc::base(BaseType::Function),
            Value::Struct(s) => TypeDesc::structure(s.borrow().name.clone()),
            Value::Export(_) => TypeDesc::base(BaseType::ExportData),
        }
    }

    /// Integer read; booleans coerce to 0/1, nothing else converts.
    pub fn as_int(&self) -> LumResult<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Bool(b) => Ok(i64::from(*b)),
            other => Err(LumError::type_error(format!(
                "Expected integer value, got {}",
                other.type_desc()
            ))),
        }
    }

    pub fn as_bool(&self) -> LumResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(LumError::type_error(format!(
                "Expected boolean value, got {}",
                other.type_desc()
            ))),
        }
    }

    pub fn as_str(&self) -> LumResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(LumError::type_error(format!(
                "Expected string value, got {}",
                other.type_desc()
            ))),
        }
    }

    pub fn as_function(&self) -> LumResult<Rc<LumFunction>> {
        match self {
            Value::Function(f) => Ok(f.clone()),
            other => Err(LumError::type_error(format!(
                "Attempted to call a non-function value of type {}",
                other.type_desc()
            ))),
        }
    }

    pub fn as_struct(&self) -> LumResult<Rc<RefCell<StructInstance>>> {
        match self {
            Value::Struct(s) => Ok(s.clone()),
            other => Err(LumError::type_error(format!(
                "Expected struct value, got {}",
                other.type_desc()
            ))),
        }
    }

    /// Default value for a declared type.
    pub fn default_of(desc: &TypeDesc) -> LumResult<Value> {
        Ok(match desc.kind {
            BaseType::Int => Value::Int(0),
            BaseType::Bool => Value::Bool(false),
            BaseType::String => Value::Str(String::new()),
            BaseType::Nil => Value::Nil,
            BaseType::Array => {
                let elem = desc
                    .elem
                    .as_deref()
                    .cloned()
                    .unwrap_or(TypeDesc::base(BaseType::Nil));
                Value::Array(Rc::new(RefCell::new(LumArray::new(elem))))
            }
            _ => {
                return Err(LumError::type_error(format!(
                    "No default value for type {desc}"
                )))
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Nil => write!(f, "nil"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(arr) => {
                let arr = arr.borrow();
                write!(f, "[")?;
                for (i, item) in arr.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Function(_) => write!(f, "[function]"),
            Value::Struct(s) => {
                let s = s.borrow();
                write!(f, "{}{{", s.name)?;
                for (i, (name, val)) in s.fields().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {val}")?;
                }
                write!(f, "}}")
            }
            Value::Export(e) => write!(f, "[file data of {}]", e.borrow().file),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A mutable, homogeneously typed array.
#[derive(Debug)]
pub struct LumArray {
    pub elem: TypeDesc,
    pub items: Vec<Value>,
}

impl LumArray {
    pub fn new(elem: TypeDesc) -> Self {
        LumArray {
            elem,
            items: Vec::new(),
        }
    }

    pub fn filled(elem: TypeDesc, len: usize, value: Value) -> Self {
        LumArray {
            elem,
            items: vec![value; len],
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: i64) -> LumResult<Value> {
        self.items
            .get(usize::try_from(idx).map_err(|_| out_of_range(idx))?)
            .cloned()
            .ok_or_else(|| out_of_range(idx))
    }

    pub fn set(&mut self, idx: i64, value: Value) -> LumResult<()> {
        if !value.type_desc().matches(&self.elem) {
            return Err(LumError::type_error(format!(
                "Cannot store {} in an array of {}",
                value.type_desc(),
                self.elem
            )));
        }
        let slot = usize::try_from(idx).map_err(|_| out_of_range(idx))?;
        match self.items.get_mut(slot) {
            Some(item) => {
                *item = value;
                Ok(())
            }
            None => Err(out_of_range(idx)),
        }
    }

    /// Append with the same type gate as `set`.
    pub fn push(&mut self, value: Value) -> LumResult<()> {
        if !value.type_desc().matches(&self.elem) {
            return Err(LumError::type_error(format!(
                "Cannot store {} in an array of {}",
                value.type_desc(),
                self.elem
            )));
        }
        self.items.push(value);
        Ok(())
    }
}

fn out_of_range(idx: i64) -> LumError {
    LumError::runtime(format!("Index out of range: {idx}"))
}

/// A declared record type: nominal name plus ordered field descriptors.
#[derive(Debug, Clone)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<(String, TypeDesc)>,
}

impl StructType {
    pub fn new(name: impl Into<String>) -> Self {
        StructType {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&TypeDesc> {
        self.fields
            .iter()
            .find(|(f, _)| f == name)
            .map(|(_, d)| d)
    }
}

/// A record instance. Field order is declaration order; lookup goes through
/// a side index. Hidden fields hold host-owned handles invisible to Lum.
pub struct StructInstance {
    pub name: String,
    pub ty: Rc<StructType>,
    fields: Vec<(String, Value)>,
    index: HashMap<String, usize>,
    hidden: HashMap<String, Box<dyn Any>>,
}

impl StructInstance {
    pub fn new(name: impl Into<String>, ty: Rc<StructType>) -> Self {
        StructInstance {
            name: name.into(),
            ty,
            fields: Vec::new(),
            index: HashMap::new(),
            hidden: HashMap::new(),
        }
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.index.insert(name.clone(), self.fields.len());
        self.fields.push((name, value));
    }

    pub fn field(&self, name: &str) -> LumResult<Value> {
        self.index
            .get(name)
            .map(|&i| self.fields[i].1.clone())
            .ok_or_else(|| LumError::type_error(format!("Struct does not have field: {name}")))
    }

    /// Overwrite a field in place, enforcing the declared field type.
    pub fn set_field(&mut self, name: &str, value: Value) -> LumResult<()> {
        if let Some(declared) = self.ty.field(name) {
            if !value.type_desc().matches(declared) {
                return Err(LumError::type_error(format!(
                    "Incompatible types for assignment to field {name}: expected {declared}, got {}",
                    value.type_desc()
                )));
            }
        }
        let slot = self
            .index
            .get(name)
            .copied()
            .ok_or_else(|| LumError::type_error(format!("Struct does not have field: {name}")))?;
        self.fields[slot].1 = value;
        Ok(())
    }

    pub fn set_hidden(&mut self, name: impl Into<String>, value: Box<dyn Any>) {
        self.hidden.insert(name.into(), value);
    }

    pub fn hidden(&self, name: &str) -> Option<&dyn Any> {
        self.hidden.get(name).map(|b| b.as_ref())
    }

    pub fn take_hidden(&mut self, name: &str) -> Option<Box<dyn Any>> {
        self.hidden.remove(name)
    }
}

/// A callable value. Lum functions, built-in module functions and `native
/// fin` stubs all live behind the same closure; the closure owns parameter
/// binding and return-type checking.
pub struct LumFunction {
    pub call: Box<dyn Fn(&mut Executor, Vec<Value>) -> LumResult<Value>>,
}

impl LumFunction {
    pub fn new(call: impl Fn(&mut Executor, Vec<Value>) -> LumResult<Value> + 'static) -> Value {
        Value::Function(Rc::new(LumFunction {
            call: Box::new(call),
        }))
    }
}

/// The exported surface of one executed pragma: a map from exported name to
/// the environment that holds it.
pub struct ExportData {
    pub file: String,
    exports: HashMap<String, (EnvRef, String)>,
}

impl ExportData {
    pub fn new(file: impl Into<String>) -> Self {
        ExportData {
            file: file.into(),
            exports: HashMap::new(),
        }
    }

    pub fn add_export(&mut self, name: impl Into<String>, env: EnvRef) {
        let name = name.into();
        self.exports.insert(name.clone(), (env, name));
    }

    pub fn exported_value(&self, name: &str) -> LumResult<Value> {
        let (env, var) = self
            .exports
            .get(name)
            .ok_or_else(|| LumError::module(format!("Export not found: {name}")))?;
        env.borrow().get(var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_match_structurally() {
        let int = TypeDesc::base(BaseType::Int);
        assert!(int.matches(&TypeDesc::base(BaseType::Int)));
        assert!(!int.matches(&TypeDesc::base(BaseType::Bool)));

        let ints = TypeDesc::array(int.clone());
        assert!(ints.matches(&TypeDesc::array(TypeDesc::base(BaseType::Int))));
        assert!(!ints.matches(&TypeDesc::array(TypeDesc::base(BaseType::String))));

        assert!(TypeDesc::structure("P").matches(&TypeDesc::structure("P")));
        assert!(!TypeDesc::structure("P").matches(&TypeDesc::structure("Q")));
    }

    #[test]
    fn array_set_enforces_element_type() {
        let mut arr = LumArray::filled(TypeDesc::base(BaseType::Int), 2, Value::Int(0));
        assert!(arr.set(0, Value::Int(5)).is_ok());
        assert!(matches!(
            arr.set(1, Value::Bool(true)),
            Err(LumError::Type { .. })
        ));
        assert!(matches!(
            arr.set(9, Value::Int(1)),
            Err(LumError::Runtime { .. })
        ));
    }

    #[test]
    fn rendering() {
        let arr = LumArray {
            elem: TypeDesc::base(BaseType::Int),
            items: vec![Value::Int(1), Value::Int(2)],
        };
        assert_eq!(Value::Array(Rc::new(RefCell::new(arr))).to_string(), "[1, 2]");
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }
}
