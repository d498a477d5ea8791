//! Expression runtime for mapping functions, CUSTOM_FUNCTION steps and
//! FILTER conditions.
//!
//! Expressions are JEXL. A function may declare positional parameters with
//! an arrow prefix, e.g. `(first, last) => first + ' ' + last`; without one
//! the arguments are available as `value` (the first) and `args`.

use anyhow::anyhow;
use flowbridge_core::CoreError;
use jexl_eval::Evaluator;
use serde_json::{Map, Number, Value};

/// A parsed function body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    params: Vec<String>,
    body: String,
}

impl Function {
    /// Parse `(a, b) => expr` or a bare expression
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if let Some((head, body)) = source.split_once("=>") {
            let head = head.trim();
            if let Some(list) = head.strip_prefix('(').and_then(|h| h.strip_suffix(')')) {
                let params: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
                if params.iter().all(|p| is_identifier(p)) {
                    return Function {
                        params,
                        body: body.trim().to_string(),
                    };
                }
            }
        }
        Function {
            params: Vec::new(),
            body: source.to_string(),
        }
    }

    /// Declared parameter names
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Evaluate with positional `args` on top of `context`
    pub fn call(&self, args: &[Value], context: &Value) -> Result<Value, CoreError> {
        let mut scope = match context {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        scope.insert("args".to_string(), Value::Array(args.to_vec()));
        if let Some(first) = args.first() {
            scope.insert("value".to_string(), first.clone());
        }
        for (index, name) in self.params.iter().enumerate() {
            scope.insert(name.clone(), args.get(index).cloned().unwrap_or(Value::Null));
        }
        evaluate(&self.body, &Value::Object(scope))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .map_or(false, |c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Evaluate a JEXL expression with the standard transforms
pub fn evaluate(expression: &str, context: &Value) -> Result<Value, CoreError> {
    let evaluator = Evaluator::new()
        .with_transform("upper", |args: &[Value]| Ok(Value::String(text_arg(args, 0).to_uppercase())))
        .with_transform("lower", |args: &[Value]| Ok(Value::String(text_arg(args, 0).to_lowercase())))
        .with_transform("trim", |args: &[Value]| Ok(Value::String(text_arg(args, 0).trim().to_string())))
        .with_transform("string", |args: &[Value]| Ok(Value::String(text_arg(args, 0))))
        .with_transform("length", |args: &[Value]| {
            let len = match args.first() {
                Some(Value::Array(items)) => items.len(),
                Some(Value::Object(map)) => map.len(),
                Some(Value::Null) | None => 0,
                Some(other) => stringify(other).chars().count(),
            };
            Ok(Value::from(len))
        })
        .with_transform("number", |args: &[Value]| match args.first() {
            Some(Value::Number(n)) => Ok(Value::Number(n.clone())),
            Some(other) => {
                let text = stringify(other);
                text.trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| anyhow!("'{}' is not a number", text))
            }
            None => Err(anyhow!("number expects an argument")),
        })
        .with_transform("join", |args: &[Value]| {
            let separator = args.get(1).map(stringify).unwrap_or_else(|| ",".to_string());
            let joined = match args.first() {
                Some(Value::Array(items)) => items.iter().map(stringify).collect::<Vec<_>>().join(&separator),
                Some(other) => stringify(other),
                None => String::new(),
            };
            Ok(Value::String(joined))
        })
        .with_transform("substring", |args: &[Value]| {
            let text = text_arg(args, 0);
            let start = index_arg(args, 1).unwrap_or(0);
            let taken: String = match index_arg(args, 2) {
                Some(len) => text.chars().skip(start).take(len).collect(),
                None => text.chars().skip(start).collect(),
            };
            Ok(Value::String(taken))
        });

    evaluator
        .eval_in_context(expression, context)
        .map_err(|e| CoreError::TransformationConfigError(format!("Failed to evaluate '{}': {}", expression, e)))
}

fn text_arg(args: &[Value], index: usize) -> String {
    args.get(index).map(stringify).unwrap_or_default()
}

fn index_arg(args: &[Value], index: usize) -> Option<usize> {
    args.get(index)
        .and_then(Value::as_f64)
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize)
}

/// JEXL truthiness
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text rendering of a result. Integral floats lose their `.0`; objects
/// and arrays render as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
