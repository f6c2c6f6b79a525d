//! Formula strings from the configuration, evaluated with `evalexpr`.
//!
//! Built-in `evalexpr` functions are disabled. Only the math functions in
//! [`UNARY`] and [`BINARY`] can be called, and only `t`, `y1`..`yN`, `pi`
//! and `e` can be read. Numbers without a decimal point are integers, so
//! `1 / 2` is `0`; write `1.0 / 2`.

use std::f64::consts;

use evalexpr::{
    Context, ContextWithMutableFunctions, ContextWithMutableVariables, DefaultNumericTypes,
    EvalexprError, Function, HashMapContext, Node, Value, build_operator_tree,
};
use thiserror::Error;

use crate::sim::driver::{MAX_GRID_SAMPLES, arange, linspace};

type Numeric = DefaultNumericTypes;

/// Error raised while compiling or evaluating a formula.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("`{expression}`: {message}")]
pub struct ExprError {
    pub expression: String,
    pub message: String,
}

impl ExprError {
    fn new(expression: &str, message: impl ToString) -> Self {
        Self {
            expression: expression.to_string(),
            message: message.to_string(),
        }
    }
}

const UNARY: &[(&str, fn(f64) -> f64)] = &[
    ("sin", f64::sin),
    ("cos", f64::cos),
    ("tan", f64::tan),
    ("asin", f64::asin),
    ("acos", f64::acos),
    ("atan", f64::atan),
    ("sinh", f64::sinh),
    ("cosh", f64::cosh),
    ("tanh", f64::tanh),
    ("exp", f64::exp),
    ("ln", f64::ln),
    ("log", f64::ln),
    ("log10", f64::log10),
    ("sqrt", f64::sqrt),
    ("abs", f64::abs),
    ("floor", f64::floor),
    ("ceil", f64::ceil),
];

const BINARY: &[(&str, fn(f64, f64) -> f64)] = &[
    ("atan2", f64::atan2),
    ("min", f64::min),
    ("max", f64::max),
    ("pow", f64::powf),
];

fn unary(f: fn(f64) -> f64) -> Function<Numeric> {
    Function::new(move |arg: &Value<Numeric>| Ok(Value::Float(f(arg.as_number()?))))
}

fn binary(f: fn(f64, f64) -> f64) -> Function<Numeric> {
    Function::new(move |arg: &Value<Numeric>| {
        let args = arg.as_fixed_len_tuple(2)?;
        Ok(Value::Float(f(args[0].as_number()?, args[1].as_number()?)))
    })
}

/// Context with the allowed functions and the constants `pi` and `e`.
fn math_context() -> Result<HashMapContext<Numeric>, EvalexprError<Numeric>> {
    let mut context = HashMapContext::<Numeric>::new();
    context.set_builtin_functions_disabled(true)?;
    for &(name, f) in UNARY {
        context.set_function(name.to_string(), unary(f))?;
    }
    for &(name, f) in BINARY {
        context.set_function(name.to_string(), binary(f))?;
    }
    context.set_value("pi".into(), Value::Float(consts::PI))?;
    context.set_value("e".into(), Value::Float(consts::E))?;
    Ok(context)
}

fn is_allowed_function(name: &str) -> bool {
    UNARY.iter().any(|(n, _)| *n == name) || BINARY.iter().any(|(n, _)| *n == name)
}

/// 0-based segment index of `yK`, if `name` has that form.
fn state_index(name: &str) -> Option<usize> {
    let k: usize = name.strip_prefix('y')?.parse().ok()?;
    k.checked_sub(1)
}

fn parse(text: &str) -> Result<Node<Numeric>, ExprError> {
    if text.trim().is_empty() {
        return Err(ExprError::new(text, "empty expression"));
    }
    build_operator_tree::<Numeric>(text).map_err(|e| ExprError::new(text, e))
}

fn check_functions(text: &str, node: &Node<Numeric>, extra: &[&str]) -> Result<(), ExprError> {
    for name in node.iter_function_identifiers() {
        if !is_allowed_function(name) && !extra.contains(&name) {
            return Err(ExprError::new(text, format!("function `{name}` is not allowed")));
        }
    }
    Ok(())
}

fn number(text: &str, value: Value<Numeric>) -> Result<f64, ExprError> {
    match value {
        Value::Float(v) => Ok(v),
        Value::Int(v) => Ok(v as f64),
        other => Err(ExprError::new(text, format!("expected a number, got {other}"))),
    }
}

/// Formula of `t` and the segment temperatures `y1`..`yN`.
#[derive(Debug, Clone)]
pub struct Formula {
    text: String,
    node: Node<Numeric>,
}

impl Formula {
    /// Compiles `text` for a state of `state_len` segments.
    ///
    /// Unknown names, disallowed functions and non-numeric results are
    /// rejected here rather than during integration.
    pub fn compile(text: &str, state_len: usize) -> Result<Self, ExprError> {
        let node = parse(text)?;
        check_functions(text, &node, &[])?;
        for name in node.iter_variable_identifiers() {
            match (name, state_index(name)) {
                ("t" | "pi" | "e", _) => {}
                (_, Some(i)) if i < state_len => {}
                (_, Some(_)) => {
                    return Err(ExprError::new(
                        text,
                        format!("`{name}` is out of range, segments are y1..y{state_len}"),
                    ));
                }
                (_, None) => {
                    return Err(ExprError::new(text, format!("unknown variable `{name}`")));
                }
            }
        }

        let formula = Self {
            text: text.to_string(),
            node,
        };
        // Trial run catches arity and type errors
        let mut context = StateContext::new(state_len)?;
        formula.eval(&mut context, 0.0, &vec![1.0; state_len])?;
        Ok(formula)
    }

    /// Evaluates the formula at time `t` and state `y`.
    pub fn eval(&self, context: &mut StateContext, t: f64, y: &[f64]) -> Result<f64, ExprError> {
        context.bind(t, y).map_err(|e| ExprError::new(&self.text, e))?;
        let value = self
            .node
            .eval_with_context(&context.inner)
            .map_err(|e| ExprError::new(&self.text, e))?;
        number(&self.text, value)
    }
}

/// Evaluation context holding `t` and `y1`..`yN`.
#[derive(Debug)]
pub struct StateContext {
    inner: HashMapContext<Numeric>,
    names: Vec<String>,
}

impl StateContext {
    pub fn new(state_len: usize) -> Result<Self, ExprError> {
        let inner = math_context().map_err(|e| ExprError::new("", e))?;
        Ok(Self {
            inner,
            names: (1..=state_len).map(|k| format!("y{k}")).collect(),
        })
    }

    fn bind(&mut self, t: f64, y: &[f64]) -> Result<(), EvalexprError<Numeric>> {
        self.inner.set_value("t".into(), Value::Float(t))?;
        for (name, &v) in self.names.iter().zip(y) {
            self.inner.set_value(name.clone(), Value::Float(v))?;
        }
        Ok(())
    }
}

type RangeFn = fn(&[f64]) -> Result<Vec<f64>, String>;

fn range_function(f: RangeFn) -> Function<Numeric> {
    Function::new(move |arg: &Value<Numeric>| {
        let args = match arg {
            Value::Tuple(values) => values
                .iter()
                .map(|v| v.as_number())
                .collect::<Result<Vec<f64>, _>>()?,
            single => vec![single.as_number()?],
        };
        let grid = f(&args).map_err(EvalexprError::CustomMessage)?;
        Ok(Value::Tuple(grid.into_iter().map(Value::Float).collect()))
    })
}

fn linspace_args(args: &[f64]) -> Result<Vec<f64>, String> {
    let &[start, stop, samples] = args else {
        return Err("linspace takes (start, stop, samples)".to_string());
    };
    if samples.fract() != 0.0 || !(1.0..=MAX_GRID_SAMPLES as f64).contains(&samples) {
        return Err(format!(
            "linspace sample count must be an integer in 1..={MAX_GRID_SAMPLES}, got {samples}"
        ));
    }
    Ok(linspace(start, stop, samples as usize))
}

fn arange_args(args: &[f64]) -> Result<Vec<f64>, String> {
    let (start, stop, step) = match *args {
        [start, stop] => (start, stop, 1.0),
        [start, stop, step] => (start, stop, step),
        _ => return Err("arange takes (start, stop[, step])".to_string()),
    };
    arange(start, stop, step).map_err(|e| e.to_string())
}

/// Evaluates a time grid written as `linspace(start, stop, samples)` or
/// `arange(start, stop[, step])`. Arguments may be constant expressions.
pub fn eval_range(text: &str) -> Result<Vec<f64>, ExprError> {
    let node = parse(text)?;
    check_functions(text, &node, &["linspace", "arange"])?;
    if let Some(name) = node
        .iter_variable_identifiers()
        .find(|name| !matches!(*name, "pi" | "e"))
    {
        return Err(ExprError::new(text, format!("`{name}` is not allowed in a time grid")));
    }

    let mut context = math_context().map_err(|e| ExprError::new(text, e))?;
    for (name, f) in [("linspace", linspace_args as RangeFn), ("arange", arange_args)] {
        context
            .set_function(name.to_string(), range_function(f))
            .map_err(|e| ExprError::new(text, e))?;
    }

    match node.eval_with_context(&context) {
        Ok(Value::Tuple(values)) => values.into_iter().map(|v| number(text, v)).collect(),
        Ok(other) => Err(ExprError::new(
            text,
            format!("expected linspace(...) or arange(...), got {other}"),
        )),
        Err(e) => Err(ExprError::new(text, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(src: &str) -> f64 {
        let formula = Formula::compile(src, 3).unwrap();
        let mut context = StateContext::new(3).unwrap();
        formula.eval(&mut context, 2.0, &[300.0, 310.0, 320.0]).unwrap()
    }

    #[test]
    fn test_arithmetic() {
        assert_relative_eq!(eval("1 + 2 * 3"), 7.0);
        assert_relative_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_relative_eq!(eval("2 ^ 3"), 8.0);
        assert_relative_eq!(eval("10.0 - 4 - 3"), 3.0);
        assert_relative_eq!(eval("1.0 / 4"), 0.25);
    }

    #[test]
    fn test_variables_and_functions() {
        assert_relative_eq!(eval("t"), 2.0);
        assert_relative_eq!(eval("y1 + y3"), 620.0);
        assert_relative_eq!(eval("10 * (1 + sin(pi / 2))"), 20.0);
        assert_relative_eq!(eval("max(y1, y2) - min(t, 1)"), 309.0);
        assert_relative_eq!(eval("exp(0) + ln(e) + sqrt(16)"), 6.0);
        assert_relative_eq!(eval("pow(2, 10)"), 1024.0);
    }

    #[test]
    fn test_state_is_rebound_on_every_call() -> anyhow::Result<()> {
        let formula = Formula::compile("y2 - y1 + t", 2)?;
        let mut context = StateContext::new(2)?;
        assert_relative_eq!(formula.eval(&mut context, 0.0, &[1.0, 5.0])?, 4.0);
        assert_relative_eq!(formula.eval(&mut context, 1.0, &[2.0, 2.0])?, 1.0);
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_names() {
        let err = Formula::compile("import(os)", 3).unwrap_err();
        assert!(err.message.contains("not allowed"), "{err}");
        let err = Formula::compile("z + 1", 3).unwrap_err();
        assert!(err.message.contains("unknown variable `z`"), "{err}");
        let err = Formula::compile("y4", 3).unwrap_err();
        assert!(err.message.contains("out of range"), "{err}");
        assert!(Formula::compile("y0", 3).is_err());
        // Built-in evalexpr functions are disabled
        assert!(Formula::compile("if(t > 1, 1, 0)", 3).is_err());
        assert!(Formula::compile("str::to_lowercase(\"A\")", 3).is_err());
    }

    #[test]
    fn test_rejects_bad_syntax_and_types() {
        assert!(Formula::compile("", 1).is_err());
        assert!(Formula::compile("1 +", 1).is_err());
        assert!(Formula::compile("(1 + 2", 1).is_err());
        assert!(Formula::compile("sin(1, 2)", 1).is_err());
        assert!(Formula::compile("\"hot\"", 1).is_err());
        assert!(Formula::compile("t > 1", 1).is_err());
        assert!(Formula::compile("y1 = 3", 1).is_err());
    }

    #[test]
    fn test_ranges() -> anyhow::Result<()> {
        let grid = eval_range("linspace(0, 2 * 5, 11)")?;
        assert_eq!(grid.len(), 11);
        assert_eq!(grid[10], 10.0);
        assert_eq!(eval_range("arange(0, 1, 0.25)")?, vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(eval_range("arange(0, 3)")?, vec![0.0, 1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_ranges() {
        assert!(eval_range("linspace(0, t, 2)").is_err());
        assert!(eval_range("linspace(0, 1, 2.5)").is_err());
        assert!(eval_range("linspace(0, 1)").is_err());
        assert!(eval_range("logspace(0, 1, 3)").is_err());
        assert!(eval_range("42").is_err());
        assert!(eval_range("sin(1)").is_err());
    }

    #[test]
    fn test_huge_ranges_are_refused() {
        let err = eval_range("linspace(0, 1, 1000000000000)").unwrap_err();
        assert!(err.message.contains("sample count"), "{err}");
        assert!(eval_range("arange(0, 1000000000, 0.000000001)").is_err());
    }
}
