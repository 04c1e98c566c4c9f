//! Tree-walking evaluator.
//!
//! Statements execute against a scope and a context; `return` travels as an
//! explicit `ExecResult` sentinel that method calls absorb, so the signal
//! never crosses a method boundary.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{
    AssignTarget, BinaryOperator, Expression, Program, Statement, UnaryOperator,
};
use crate::runtime::error::RuntimeError;
use crate::runtime::{self, Class, ClassInstance, Context, Scope, Value};

/// Control-flow marker for statement execution.
pub(crate) enum ExecResult {
    Continue,
    Return(Value),
}

/// Executes a parsed program against a fresh global scope.
pub fn execute_program(program: &Program, context: &mut Context<'_>) -> Result<(), RuntimeError> {
    let mut globals = Scope::new();
    match exec_block(&program.statements, &mut globals, context)? {
        ExecResult::Continue => Ok(()),
        ExecResult::Return(_) => Err(RuntimeError::ReturnOutsideMethod),
    }
}

pub(crate) fn exec_block(
    body: &[Statement],
    scope: &mut Scope,
    context: &mut Context<'_>,
) -> Result<ExecResult, RuntimeError> {
    for statement in body {
        match exec_statement(statement, scope, context)? {
            ExecResult::Continue => {}
            ExecResult::Return(value) => return Ok(ExecResult::Return(value)),
        }
    }
    Ok(ExecResult::Continue)
}

fn exec_statement(
    statement: &Statement,
    scope: &mut Scope,
    context: &mut Context<'_>,
) -> Result<ExecResult, RuntimeError> {
    match statement {
        Statement::ClassDef(class) => {
            scope.insert(class.name().to_string(), Value::Class(Rc::clone(class)));
            Ok(ExecResult::Continue)
        }
        Statement::Assign { targets, value } => {
            let value = eval_expression(value, scope, context)?;
            for target in targets {
                match target {
                    AssignTarget::Name(name) => {
                        scope.insert(name.clone(), value.clone());
                    }
                    AssignTarget::Field { object, name } => {
                        let object = eval_expression(object, scope, context)?;
                        let Value::Instance(instance) = &object else {
                            return Err(RuntimeError::FieldAccessOnValue {
                                field: name.clone(),
                                type_name: object.type_name(),
                            });
                        };
                        instance
                            .borrow_mut()
                            .fields_mut()
                            .insert(name.clone(), value.clone());
                    }
                }
            }
            Ok(ExecResult::Continue)
        }
        Statement::If {
            condition,
            then_body,
            else_body,
        } => {
            let condition = eval_expression(condition, scope, context)?;
            let body = if condition.is_true() {
                then_body
            } else {
                else_body
            };
            exec_block(body, scope, context)
        }
        Statement::Print(args) => {
            for (index, arg) in args.iter().enumerate() {
                let value = eval_expression(arg, scope, context)?;
                if index > 0 {
                    context.write_output(" ")?;
                }
                value.print(context)?;
            }
            context.write_output("\n")?;
            Ok(ExecResult::Continue)
        }
        Statement::Return(value) => {
            let value = match value {
                Some(expr) => eval_expression(expr, scope, context)?,
                None => Value::None,
            };
            Ok(ExecResult::Return(value))
        }
        Statement::Expr(expr) => {
            eval_expression(expr, scope, context)?;
            Ok(ExecResult::Continue)
        }
    }
}

fn eval_expression(
    expr: &Expression,
    scope: &mut Scope,
    context: &mut Context<'_>,
) -> Result<Value, RuntimeError> {
    match expr {
        Expression::Number(value) => Ok(Value::Number(*value)),
        Expression::String(value) => Ok(Value::string(value)),
        Expression::Boolean(value) => Ok(Value::Bool(*value)),
        Expression::None => Ok(Value::None),
        Expression::Identifier(name) => {
            // Plain scope lookup; there is no fallback into any enclosing
            // scope at evaluation time.
            scope
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })
        }
        Expression::FieldAccess { object, name } => {
            let object = eval_expression(object, scope, context)?;
            let Value::Instance(instance) = &object else {
                return Err(RuntimeError::FieldAccessOnValue {
                    field: name.clone(),
                    type_name: object.type_name(),
                });
            };
            let instance = instance.borrow();
            instance
                .fields()
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UnknownField {
                    field: name.clone(),
                    class: instance.class().name().to_string(),
                })
        }
        Expression::MethodCall {
            object,
            method,
            args,
        } => {
            let object = eval_expression(object, scope, context)?;
            let Value::Instance(instance) = &object else {
                return Err(RuntimeError::MethodCallOnValue {
                    method: method.clone(),
                    type_name: object.type_name(),
                });
            };
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval_expression(arg, scope, context)?);
            }
            runtime::call_method(instance, method, evaluated, context)
        }
        Expression::NewInstance { class, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval_expression(arg, scope, context)?);
            }
            instantiate(class, evaluated, context)
        }
        Expression::UnaryOp { op, operand } => {
            let value = eval_expression(operand, scope, context)?;
            match op {
                UnaryOperator::Not => Ok(Value::Bool(!value.is_true())),
                UnaryOperator::Neg => match value {
                    Value::Number(number) => Ok(Value::Number(number.wrapping_neg())),
                    other => Err(RuntimeError::UnsupportedOperand {
                        operation: "-",
                        type_name: other.type_name(),
                    }),
                },
            }
        }
        Expression::BinaryOp { left, op, right } => {
            eval_binary_op(left, *op, right, scope, context)
        }
    }
}

fn eval_binary_op(
    left: &Expression,
    op: BinaryOperator,
    right: &Expression,
    scope: &mut Scope,
    context: &mut Context<'_>,
) -> Result<Value, RuntimeError> {
    // and/or decide on the left value before the right operand is even
    // evaluated; the result is the last-evaluated operand, uncoerced.
    match op {
        BinaryOperator::And => {
            let left = eval_expression(left, scope, context)?;
            if !left.is_true() {
                return Ok(left);
            }
            return eval_expression(right, scope, context);
        }
        BinaryOperator::Or => {
            let left = eval_expression(left, scope, context)?;
            if left.is_true() {
                return Ok(left);
            }
            return eval_expression(right, scope, context);
        }
        _ => {}
    }

    let lhs = eval_expression(left, scope, context)?;
    let rhs = eval_expression(right, scope, context)?;
    match op {
        BinaryOperator::Add => eval_add(lhs, rhs, context),
        BinaryOperator::Sub => eval_number_op(lhs, rhs, "-", i64::wrapping_sub),
        BinaryOperator::Mul => eval_number_op(lhs, rhs, "*", i64::wrapping_mul),
        BinaryOperator::Div => match (&lhs, &rhs) {
            (Value::Number(_), Value::Number(0)) => Err(RuntimeError::DivisionByZero),
            (Value::Number(left), Value::Number(right)) => {
                Ok(Value::Number(left.wrapping_div(*right)))
            }
            _ => Err(invalid_operands("/", &lhs, &rhs)),
        },
        BinaryOperator::Eq => Ok(Value::Bool(runtime::equal(&lhs, &rhs, context)?)),
        BinaryOperator::NotEq => Ok(Value::Bool(runtime::not_equal(&lhs, &rhs, context)?)),
        BinaryOperator::Less => Ok(Value::Bool(runtime::less(&lhs, &rhs, context)?)),
        BinaryOperator::Greater => Ok(Value::Bool(runtime::greater(&lhs, &rhs, context)?)),
        BinaryOperator::LessOrEq => Ok(Value::Bool(runtime::less_or_equal(&lhs, &rhs, context)?)),
        BinaryOperator::GreaterOrEq => {
            Ok(Value::Bool(runtime::greater_or_equal(&lhs, &rhs, context)?))
        }
        BinaryOperator::And | BinaryOperator::Or => unreachable!("handled before evaluation"),
    }
}

// `+` is the one overloaded operator: numbers add (two's-complement wrap),
// strings concatenate, and a left-hand instance may define `__add__`.
fn eval_add(lhs: Value, rhs: Value, context: &mut Context<'_>) -> Result<Value, RuntimeError> {
    match (&lhs, &rhs) {
        (Value::Number(left), Value::Number(right)) => {
            Ok(Value::Number(left.wrapping_add(*right)))
        }
        (Value::String(left), Value::String(right)) => {
            let mut combined = String::with_capacity(left.len() + right.len());
            combined.push_str(left);
            combined.push_str(right);
            Ok(Value::String(Rc::from(combined)))
        }
        (Value::Instance(instance), _) => {
            let has_add = instance.borrow().class().has_method(runtime::ADD_METHOD, 1);
            if has_add {
                runtime::call_method(instance, runtime::ADD_METHOD, vec![rhs.clone()], context)
            } else {
                Err(invalid_operands("+", &lhs, &rhs))
            }
        }
        _ => Err(invalid_operands("+", &lhs, &rhs)),
    }
}

fn eval_number_op(
    lhs: Value,
    rhs: Value,
    operation: &'static str,
    apply: fn(i64, i64) -> i64,
) -> Result<Value, RuntimeError> {
    match (&lhs, &rhs) {
        (Value::Number(left), Value::Number(right)) => Ok(Value::Number(apply(*left, *right))),
        _ => Err(invalid_operands(operation, &lhs, &rhs)),
    }
}

fn invalid_operands(operation: &'static str, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::InvalidOperands {
        operation,
        lhs_type: lhs.type_name(),
        rhs_type: rhs.type_name(),
    }
}

// Constructing an instance runs `__init__` when the class defines one; the
// argument count must match it, and a class without `__init__` accepts no
// arguments.
fn instantiate(
    class: &Rc<Class>,
    args: Vec<Value>,
    context: &mut Context<'_>,
) -> Result<Value, RuntimeError> {
    let init = class.get_method(runtime::INIT_METHOD);
    if init.is_none() && args.is_empty() {
        return Ok(Value::new_instance(Rc::clone(class)));
    }
    let expected = init.map(|method| method.formal_params.len()).unwrap_or(0);
    if expected != args.len() {
        return Err(RuntimeError::MethodArityMismatch {
            method: runtime::INIT_METHOD.to_string(),
            class: class.name().to_string(),
            expected,
            found: args.len(),
        });
    }
    let instance = Rc::new(RefCell::new(ClassInstance::new(Rc::clone(class))));
    runtime::call_method(&instance, runtime::INIT_METHOD, args, context)?;
    Ok(Value::Instance(instance))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::Error;

    fn run_source(source: &str) -> Result<String, Error> {
        let mut output = Vec::new();
        crate::run(source, &mut output)?;
        Ok(String::from_utf8(output).expect("interpreter output is UTF-8"))
    }

    fn output_of(source: &str) -> String {
        run_source(source).expect("program should run")
    }

    fn runtime_error_of(source: &str) -> RuntimeError {
        match run_source(source) {
            Err(Error::Runtime(error)) => error,
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        assert_eq!(output_of("print 1+2*3\n"), "7\n");
    }

    #[test]
    fn executes_if_else_branches() {
        let source = indoc! {r#"
            x = 10
            if x > 5:
              print "big"
            else:
              print "small"
        "#};
        assert_eq!(output_of(source), "big\n");
    }

    #[test]
    fn concatenates_strings() {
        assert_eq!(output_of("s = \"he\" + \"llo\"\nprint s\n"), "hello\n");
    }

    #[test]
    fn print_dispatches_str_method() {
        let source = indoc! {r#"
            class A:
              def __str__(self):
                return "A!"
            print A()
        "#};
        assert_eq!(output_of(source), "A!\n");
    }

    #[test]
    fn derived_method_overrides_and_base_method_is_inherited() {
        let source = indoc! {"
            class A:
              def f(self):
                return 1
            class B(A):
              def f(self):
                return 2
            print B().f(), A().f()
        "};
        assert_eq!(output_of(source), "2 1\n");

        let source = indoc! {"
            class A:
              def f(self):
                return 1
            class B(A):
              def g(self):
                return 2
            print B().f()
        "};
        assert_eq!(output_of(source), "1\n");
    }

    #[test]
    fn compares_scalars_and_none() {
        assert_eq!(
            output_of("print 1 == 1, 1 == 2, None == None\n"),
            "True False True\n"
        );
    }

    #[test]
    fn comparison_operators_cover_both_directions() {
        assert_eq!(
            output_of("print 1 < 2, 2 <= 2, 3 > 2, 3 >= 4, 1 != 2\n"),
            "True True True False True\n"
        );
        assert_eq!(output_of("print \"abc\" < \"abd\"\n"), "True\n");
    }

    #[test]
    fn logic_operators_return_operand_values() {
        assert_eq!(output_of("print 1 and 2\n"), "2\n");
        assert_eq!(output_of("print 0 and 2\n"), "0\n");
        assert_eq!(output_of("print 0 or 3\n"), "3\n");
        assert_eq!(output_of("print \"x\" or \"y\"\n"), "x\n");
        assert_eq!(output_of("print not 0, not \"x\"\n"), "True False\n");
    }

    #[test]
    fn logic_operators_short_circuit() {
        let source = indoc! {r#"
            class Probe:
              def touch(self):
                print "touched"
                return 1
            p = Probe()
            x = 1 or p.touch()
            y = 0 and p.touch()
            print x, y
        "#};
        assert_eq!(output_of(source), "1 0\n");
    }

    #[test]
    fn constructor_runs_init_and_fields_are_shared_across_references() {
        let source = indoc! {"
            class Box:
              def __init__(self, value):
                self.value = value
            a = Box(7)
            b = a
            b.value = 9
            print a.value
        "};
        assert_eq!(output_of(source), "9\n");
    }

    #[test]
    fn assignment_chains_bind_every_target() {
        let source = indoc! {"
            x = y = 5
            print x, y
        "};
        assert_eq!(output_of(source), "5 5\n");
    }

    #[test]
    fn field_chains_require_intermediate_instances() {
        let source = indoc! {"
            class Node:
              def __init__(self):
                self.next = None
            a = Node()
            a.next = Node()
            a.next.tag = 7
            print a.next.tag
        "};
        assert_eq!(output_of(source), "7\n");

        let error = runtime_error_of(indoc! {"
            x = 5
            x.field = 1
        "});
        assert!(matches!(error, RuntimeError::FieldAccessOnValue { .. }));
    }

    #[test]
    fn fields_shadow_methods_in_reads_but_calls_still_dispatch() {
        let source = indoc! {"
            class A:
              def tag(self):
                return 1
            a = A()
            a.tag = 2
            print a.tag, a.tag()
        "};
        assert_eq!(output_of(source), "2 1\n");
    }

    #[test]
    fn print_joins_arguments_and_renders_none_empty() {
        assert_eq!(output_of("print None\n"), "\n");
        assert_eq!(output_of("print None, 1\n"), " 1\n");
        assert_eq!(output_of("print\n"), "\n");
        assert_eq!(output_of("print 1, \"a\", True\n"), "1 a True\n");
    }

    #[test]
    fn printed_lines_are_identical_for_identical_values() {
        let source = indoc! {"
            x = 41 + 1
            print x
            print x
        "};
        assert_eq!(output_of(source), "42\n42\n");
    }

    #[test]
    fn class_value_prints_its_name() {
        let source = indoc! {"
            class Widget:
              def f(self):
                return 1
            print Widget
        "};
        assert_eq!(output_of(source), "Class Widget\n");
    }

    #[test]
    fn instance_add_dispatches_to_add_method() {
        let source = indoc! {"
            class Accum:
              def __init__(self, value):
                self.value = value
              def __add__(self, other):
                return self.value + other
            print Accum(40) + 2
        "};
        assert_eq!(output_of(source), "42\n");
    }

    #[test]
    fn instance_ordering_dispatches_to_lt_method() {
        let source = indoc! {"
            class Ranked:
              def __init__(self, rank):
                self.rank = rank
              def __lt__(self, other):
                return self.rank < other.rank
            print Ranked(1) < Ranked(2), Ranked(2) < Ranked(1)
        "};
        assert_eq!(output_of(source), "True False\n");
    }

    #[test]
    fn methods_see_only_their_call_scope() {
        let source = indoc! {"
            class A:
              def f(self):
                return hidden
            hidden = 1
            print A().f()
        "};
        let error = runtime_error_of(source);
        assert_eq!(
            error,
            RuntimeError::UndefinedVariable {
                name: "hidden".to_string()
            }
        );
    }

    #[test]
    fn method_call_arity_is_strict() {
        let source = indoc! {"
            class A:
              def f(self, x):
                return x
            print A().f(1, 2)
        "};
        let error = runtime_error_of(source);
        assert_eq!(
            error,
            RuntimeError::MethodArityMismatch {
                method: "f".to_string(),
                class: "A".to_string(),
                expected: 1,
                found: 2,
            }
        );
    }

    #[test]
    fn constructor_arity_is_strict() {
        let source = indoc! {"
            class A:
              def __init__(self, x):
                self.x = x
            A()
        "};
        let error = runtime_error_of(source);
        assert_eq!(
            error,
            RuntimeError::MethodArityMismatch {
                method: "__init__".to_string(),
                class: "A".to_string(),
                expected: 1,
                found: 0,
            }
        );

        let source = indoc! {"
            class B:
              def f(self):
                return 1
            B(5)
        "};
        let error = runtime_error_of(source);
        assert_eq!(
            error,
            RuntimeError::MethodArityMismatch {
                method: "__init__".to_string(),
                class: "B".to_string(),
                expected: 0,
                found: 1,
            }
        );
    }

    #[test]
    fn errors_on_undefined_variable() {
        let error = runtime_error_of("print missing\n");
        assert_eq!(
            error,
            RuntimeError::UndefinedVariable {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn errors_on_unknown_field() {
        let source = indoc! {"
            class A:
              def f(self):
                return 1
            print A().x
        "};
        let error = runtime_error_of(source);
        assert_eq!(
            error,
            RuntimeError::UnknownField {
                field: "x".to_string(),
                class: "A".to_string(),
            }
        );
    }

    #[test]
    fn errors_on_division_by_zero() {
        assert_eq!(runtime_error_of("print 1 / 0\n"), RuntimeError::DivisionByZero);
        assert_eq!(output_of("print 7 / 2, -7 / 2\n"), "3 -3\n");
    }

    #[test]
    fn errors_on_mixed_operand_arithmetic() {
        let error = runtime_error_of("print 1 + \"a\"\n");
        assert_eq!(
            error,
            RuntimeError::InvalidOperands {
                operation: "+",
                lhs_type: "Number",
                rhs_type: "String",
            }
        );
        let error = runtime_error_of("print \"a\" * 2\n");
        assert!(matches!(error, RuntimeError::InvalidOperands { .. }));
        let error = runtime_error_of("print -\"a\"\n");
        assert!(matches!(error, RuntimeError::UnsupportedOperand { .. }));
    }

    #[test]
    fn number_arithmetic_wraps_on_overflow() {
        assert_eq!(
            output_of("print 9223372036854775807 + 1\n"),
            "-9223372036854775808\n"
        );
    }

    #[test]
    fn output_written_before_a_runtime_error_is_kept() {
        let source = indoc! {r#"
            print "before"
            print missing
        "#};
        let mut output = Vec::new();
        let error = crate::run(source, &mut output).expect_err("expected runtime error");
        assert!(matches!(
            error,
            Error::Runtime(RuntimeError::UndefinedVariable { .. })
        ));
        assert_eq!(
            String::from_utf8(output).expect("interpreter output is UTF-8"),
            "before\n"
        );
    }

    #[test]
    fn errors_on_top_level_return() {
        assert_eq!(
            runtime_error_of("return 1\n"),
            RuntimeError::ReturnOutsideMethod
        );
    }

    #[test]
    fn instance_truthiness_is_false_in_conditions() {
        let source = indoc! {r#"
            class A:
              def f(self):
                return 1
            if A():
              print "truthy"
            else:
              print "falsy"
        "#};
        assert_eq!(output_of(source), "falsy\n");
    }

    #[test]
    fn method_recursion_carries_fresh_scopes() {
        let source = indoc! {"
            class Math:
              def fact(self, n):
                if n < 2:
                  return 1
                return n * self.fact(n - 1)
            print Math().fact(10)
        "};
        assert_eq!(output_of(source), "3628800\n");
    }

    #[test]
    fn class_can_be_defined_inside_a_suite() {
        let source = indoc! {r#"
            if True:
              class A:
                def f(self):
                  return "nested"
            print A().f()
        "#};
        assert_eq!(output_of(source), "nested\n");
    }
}
