use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Unknown field '{field}' on an instance of class {class}")]
    UnknownField { field: String, class: String },
    #[error("Unknown method '{method}' for class {class}")]
    UnknownMethod { method: String, class: String },
    #[error("Method '{method}' of class {class} expected {expected} arguments, got {found}")]
    MethodArityMismatch {
        method: String,
        class: String,
        expected: usize,
        found: usize,
    },
    #[error("Operation '{operation}' is not supported for {type_name}")]
    UnsupportedOperand {
        operation: &'static str,
        type_name: &'static str,
    },
    #[error("Operation '{operation}' is not supported for {lhs_type} and {rhs_type}")]
    InvalidOperands {
        operation: &'static str,
        lhs_type: &'static str,
        rhs_type: &'static str,
    },
    #[error("Cannot compare {lhs_type} and {rhs_type} for {operation}")]
    IncomparableTypes {
        operation: &'static str,
        lhs_type: &'static str,
        rhs_type: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Cannot read field '{field}' of a value of type {type_name}")]
    FieldAccessOnValue {
        field: String,
        type_name: &'static str,
    },
    #[error("Cannot call method '{method}' on a value of type {type_name}")]
    MethodCallOnValue {
        method: String,
        type_name: &'static str,
    },
    #[error("Return outside of a method body")]
    ReturnOutsideMethod,
    #[error("Failed to write output: {message}")]
    OutputWrite { message: String },
}
