//! Dynamic value model and class runtime.
//!
//! Values are tagged variants over the closed kind set; instances are shared
//! through `Rc<RefCell<...>>` handles so field mutation is visible across
//! every reference. Comparisons and printing dispatch to the special methods
//! `__eq__`, `__lt__` and `__str__` when a left-hand instance defines them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use crate::ast::Statement;
use crate::interpreter::{self, ExecResult};

pub mod error;

use self::error::RuntimeError;

pub(crate) const INIT_METHOD: &str = "__init__";
pub(crate) const STR_METHOD: &str = "__str__";
pub(crate) const EQUAL_METHOD: &str = "__eq__";
pub(crate) const LESS_THAN_METHOD: &str = "__lt__";
pub(crate) const ADD_METHOD: &str = "__add__";

/// Mapping from identifier to value, used for globals, method-call frames
/// and instance fields.
pub type Scope = HashMap<String, Value>;

/// Execution context wrapping the output stream exclusively. Every `print`
/// writes through immediately, so output produced before a runtime error
/// survives it.
pub struct Context<'a> {
    output: &'a mut dyn io::Write,
}

impl<'a> Context<'a> {
    pub fn new(output: &'a mut dyn io::Write) -> Self {
        Self { output }
    }

    pub(crate) fn write_output(&mut self, text: &str) -> Result<(), RuntimeError> {
        self.output
            .write_all(text.as_bytes())
            .map_err(|error| RuntimeError::OutputWrite {
                message: error.to_string(),
            })
    }
}

/// A parsed method: formal parameter names (the implicit receiver excluded)
/// and the statement list of its body.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub formal_params: Vec<String>,
    pub body: Vec<Statement>,
}

/// A user-defined class: ordered methods, a name index over them and an
/// optional parent. Classes are immutable once built by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    name: String,
    methods: Vec<Method>,
    method_index: HashMap<String, usize>,
    parent: Option<Rc<Class>>,
}

impl Class {
    pub fn new(name: String, methods: Vec<Method>, parent: Option<Rc<Class>>) -> Self {
        let method_index = methods
            .iter()
            .enumerate()
            .map(|(index, method)| (method.name.clone(), index))
            .collect();
        Self {
            name,
            methods,
            method_index,
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks a method up in this class, then along the parent chain.
    pub fn get_method(&self, name: &str) -> Option<&Method> {
        if let Some(&index) = self.method_index.get(name) {
            return Some(&self.methods[index]);
        }
        self.parent.as_deref()?.get_method(name)
    }

    /// A method matches only when both its name and its arity do.
    pub fn has_method(&self, name: &str, argument_count: usize) -> bool {
        self.get_method(name)
            .is_some_and(|method| method.formal_params.len() == argument_count)
    }
}

/// An instance: its own field scope plus a handle to the class it was
/// constructed from.
#[derive(Debug)]
pub struct ClassInstance {
    class: Rc<Class>,
    fields: Scope,
}

impl ClassInstance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: Scope::new(),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn fields(&self) -> &Scope {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Scope {
        &mut self.fields
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Number(i64),
    String(Rc<str>),
    Bool(bool),
    Class(Rc<Class>),
    Instance(Rc<RefCell<ClassInstance>>),
}

impl Value {
    pub fn string(value: &str) -> Self {
        Value::String(Rc::from(value))
    }

    pub fn new_instance(class: Rc<Class>) -> Self {
        Value::Instance(Rc::new(RefCell::new(ClassInstance::new(class))))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Bool(_) => "Bool",
            Value::Class(_) => "Class",
            Value::Instance(_) => "ClassInstance",
        }
    }

    /// Non-zero numbers, `True` and non-empty strings are true; everything
    /// else, instances and classes included, is false.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Number(value) => *value != 0,
            Value::Bool(value) => *value,
            Value::String(value) => !value.is_empty(),
            Value::None | Value::Class(_) | Value::Instance(_) => false,
        }
    }

    /// Renders the value into the context output. Instances defining
    /// `__str__` with no parameters print its result; other instances print
    /// their address. `None` prints nothing.
    pub fn print(&self, context: &mut Context<'_>) -> Result<(), RuntimeError> {
        match self {
            Value::None => Ok(()),
            Value::Number(value) => context.write_output(&value.to_string()),
            Value::String(value) => context.write_output(value),
            Value::Bool(value) => context.write_output(if *value { "True" } else { "False" }),
            Value::Class(class) => context.write_output(&format!("Class {}", class.name())),
            Value::Instance(instance) => {
                let has_str = instance.borrow().class().has_method(STR_METHOD, 0);
                if has_str {
                    let rendered = call_method(instance, STR_METHOD, Vec::new(), context)?;
                    rendered.print(context)
                } else {
                    context.write_output(&format!("{:p}", Rc::as_ptr(instance)))
                }
            }
        }
    }
}

/// True when both sides are `None`, when a left-hand instance's `__eq__`
/// says so, or when two values of the same scalar kind are equal.
pub fn equal(lhs: &Value, rhs: &Value, context: &mut Context<'_>) -> Result<bool, RuntimeError> {
    if let (Value::None, Value::None) = (lhs, rhs) {
        return Ok(true);
    }
    if let Value::Instance(instance) = lhs {
        let has_eq = instance.borrow().class().has_method(EQUAL_METHOD, 1);
        if has_eq {
            let result = call_method(instance, EQUAL_METHOD, vec![rhs.clone()], context)?;
            return Ok(result.is_true());
        }
    }
    match (lhs, rhs) {
        (Value::Number(left), Value::Number(right)) => Ok(left == right),
        (Value::String(left), Value::String(right)) => Ok(left == right),
        (Value::Bool(left), Value::Bool(right)) => Ok(left == right),
        _ => Err(RuntimeError::IncomparableTypes {
            operation: "equality",
            lhs_type: lhs.type_name(),
            rhs_type: rhs.type_name(),
        }),
    }
}

/// `<` over same-kind scalars, or a left-hand instance's `__lt__` coerced
/// through truthiness.
pub fn less(lhs: &Value, rhs: &Value, context: &mut Context<'_>) -> Result<bool, RuntimeError> {
    if let Value::Instance(instance) = lhs {
        let has_lt = instance.borrow().class().has_method(LESS_THAN_METHOD, 1);
        if has_lt {
            let result = call_method(instance, LESS_THAN_METHOD, vec![rhs.clone()], context)?;
            return Ok(result.is_true());
        }
    }
    match (lhs, rhs) {
        (Value::Number(left), Value::Number(right)) => Ok(left < right),
        (Value::String(left), Value::String(right)) => Ok(left < right),
        (Value::Bool(left), Value::Bool(right)) => Ok(left < right),
        _ => Err(RuntimeError::IncomparableTypes {
            operation: "ordering",
            lhs_type: lhs.type_name(),
            rhs_type: rhs.type_name(),
        }),
    }
}

pub fn not_equal(lhs: &Value, rhs: &Value, context: &mut Context<'_>) -> Result<bool, RuntimeError> {
    Ok(!equal(lhs, rhs, context)?)
}

pub fn greater(lhs: &Value, rhs: &Value, context: &mut Context<'_>) -> Result<bool, RuntimeError> {
    Ok(!(less(lhs, rhs, context)? || equal(lhs, rhs, context)?))
}

pub fn less_or_equal(
    lhs: &Value,
    rhs: &Value,
    context: &mut Context<'_>,
) -> Result<bool, RuntimeError> {
    Ok(!greater(lhs, rhs, context)?)
}

pub fn greater_or_equal(
    lhs: &Value,
    rhs: &Value,
    context: &mut Context<'_>,
) -> Result<bool, RuntimeError> {
    Ok(!less(lhs, rhs, context)?)
}

/// Invokes `method_name` on the instance. Dispatch is arity-strict: the
/// resolved method's parameter count must match the argument count. The body
/// runs in a fresh scope seeded with `self` and the bound parameters, so
/// names never resolve through an enclosing scope.
pub fn call_method(
    instance: &Rc<RefCell<ClassInstance>>,
    method_name: &str,
    args: Vec<Value>,
    context: &mut Context<'_>,
) -> Result<Value, RuntimeError> {
    let class = Rc::clone(instance.borrow().class());
    let Some(method) = class.get_method(method_name) else {
        return Err(RuntimeError::UnknownMethod {
            method: method_name.to_string(),
            class: class.name().to_string(),
        });
    };
    if method.formal_params.len() != args.len() {
        return Err(RuntimeError::MethodArityMismatch {
            method: method_name.to_string(),
            class: class.name().to_string(),
            expected: method.formal_params.len(),
            found: args.len(),
        });
    }
    let mut scope = Scope::new();
    scope.insert("self".to_string(), Value::Instance(Rc::clone(instance)));
    for (param, arg) in method.formal_params.iter().zip(args) {
        scope.insert(param.clone(), arg);
    }
    match interpreter::exec_block(&method.body, &mut scope, context)? {
        ExecResult::Return(value) => Ok(value),
        ExecResult::Continue => Ok(Value::None),
    }
}
