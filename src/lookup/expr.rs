//! A small, sandboxed expression language for custom lookup rendering and summarizing.
//!
//! Expressions are compiled once into an [Expr] tree and evaluated against a [Scope] holding
//! `page` (custom list expressions) or `pages` (summarizing expressions). There is no assignment,
//! no loops and no access to anything but the scope and a fixed function table. Parsing is done
//! with chumsky combinators straight over the source characters.
//!
//! ```rust
//! use fieldnote_core::lookup::expr::{compile, Scope, Value};
//! use std::collections::BTreeMap;
//!
//! let expr = compile(r#"upper(page.title) + " (" + page.year + ")""#).unwrap();
//! let mut page = BTreeMap::new();
//! page.insert("title".to_string(), Value::Str("dune".to_string()));
//! page.insert("year".to_string(), Value::Number(1965.0));
//! let scope = Scope::new().with("page", Value::Object(page));
//! assert_eq!(expr.eval(&scope).unwrap().render(), "DUNE (1965)");
//! ```
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use chumsky::{extra, prelude::*};

use crate::{error::FieldnoteError, paths::DocPath};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl Value {
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Str(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Object(_) => true,
        }
    }

    /// Numeric reading of the value; numeric strings count.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Str(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Value::Bool(_) | Value::Null | Value::List(_) | Value::Object(_) => None,
        }
    }

    /// The plain string written into a document.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::render)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(_) => self.to_json().to_string(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Variables visible to an expression.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: BTreeMap<String, Value>,
    markdown_links: bool,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    pub fn with(mut self, name: &str, value: Value) -> Scope {
        self.vars.insert(name.to_string(), value);
        self
    }

    pub fn with_markdown_links(mut self, markdown_links: bool) -> Scope {
        self.markdown_links = markdown_links;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Link,
    Len,
    Upper,
    Lower,
    Trim,
    Concat,
    Join,
    Round,
    Floor,
    Ceil,
    Sum,
    Min,
    Max,
    Avg,
    Count,
    MapField,
    Default,
    String,
    Number,
    Contains,
}

impl Function {
    fn lookup(name: &str) -> Option<Function> {
        Some(match name {
            "link" => Function::Link,
            "len" => Function::Len,
            "upper" => Function::Upper,
            "lower" => Function::Lower,
            "trim" => Function::Trim,
            "concat" => Function::Concat,
            "join" => Function::Join,
            "round" => Function::Round,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "sum" => Function::Sum,
            "min" => Function::Min,
            "max" => Function::Max,
            "avg" => Function::Avg,
            "count" => Function::Count,
            "map_field" => Function::MapField,
            "default" => Function::Default,
            "string" => Function::String,
            "number" => Function::Number,
            "contains" => Function::Contains,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
    List(Vec<Expr>),
}

type Extra<'src> = extra::Err<Rich<'src, char>>;

enum Postfix {
    Member(String),
    Index(Expr),
}

fn ident<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_alphabetic() || matches!(*c, '_' | '$'))
        .then(
            any()
                .filter(|c: &char| c.is_alphanumeric() || matches!(*c, '_' | '$'))
                .repeated(),
        )
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("identifier")
}

fn number<'src>() -> impl Parser<'src, &'src str, f64, Extra<'src>> + Clone {
    let digits = any().filter(|c: &char| c.is_ascii_digit()).repeated().at_least(1);
    digits
        .clone()
        .then(just('.').then(digits).or_not())
        .to_slice()
        .try_map(|s: &str, span| {
            s.parse::<f64>()
                .map_err(|_| Rich::custom(span, "invalid number literal"))
        })
        .labelled("number")
}

/// Single or double quoted, with `\n`, `\t` and `\<char>` escapes.
fn string_literal<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    let escape = just('\\').ignore_then(any().map(|c| match c {
        'n' => '\n',
        't' => '\t',
        other => other,
    }));
    let quoted = |quote: char| {
        just(quote)
            .ignore_then(
                none_of([quote, '\\'])
                    .or(escape.clone())
                    .repeated()
                    .collect::<String>(),
            )
            .then_ignore(just(quote))
    };
    quoted('"').or(quoted('\'')).labelled("string literal")
}

fn fold_binary(lhs: Expr, (op, rhs): (BinaryOp, Expr)) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

fn parser<'src>() -> impl Parser<'src, &'src str, Expr, Extra<'src>> {
    recursive(|expr| {
        let list = |open: char, close: char| {
            expr.clone()
                .separated_by(just(',').padded())
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(open).padded(), just(close).padded())
        };

        let call_or_var = ident()
            .then(list('(', ')').or_not())
            .try_map(|(name, args), span| match args {
                Some(args) => Function::lookup(&name)
                    .map(|function| Expr::Call(function, args))
                    .ok_or_else(|| Rich::custom(span, format!("unknown function '{name}'"))),
                None => Ok(match name.as_str() {
                    "true" => Expr::Literal(Value::Bool(true)),
                    "false" => Expr::Literal(Value::Bool(false)),
                    "null" | "undefined" => Expr::Literal(Value::Null),
                    _ => Expr::Var(name),
                }),
            });

        let atom = choice((
            number().map(|n| Expr::Literal(Value::Number(n))),
            string_literal().map(|s| Expr::Literal(Value::Str(s))),
            call_or_var,
            expr.clone()
                .delimited_by(just('(').padded(), just(')').padded()),
            list('[', ']').map(Expr::List),
        ))
        .padded();

        let postfix = atom
            .foldl(
                choice((
                    just('.')
                        .padded()
                        .ignore_then(ident())
                        .map(Postfix::Member),
                    expr.clone()
                        .delimited_by(just('[').padded(), just(']').padded())
                        .map(Postfix::Index),
                ))
                .repeated(),
                |target, op| match op {
                    Postfix::Member(name) => Expr::Member(Box::new(target), name),
                    Postfix::Index(index) => Expr::Index(Box::new(target), Box::new(index)),
                },
            )
            .padded();

        let unary = one_of("!-")
            .padded()
            .repeated()
            .foldr(postfix, |op, operand| match op {
                '!' => Expr::Not(Box::new(operand)),
                _ => Expr::Neg(Box::new(operand)),
            })
            .boxed();

        let op = |symbol: &'static str, op: BinaryOp| just(symbol).padded().to(op);

        let product = unary
            .clone()
            .foldl(
                choice((
                    op("*", BinaryOp::Mul),
                    op("/", BinaryOp::Div),
                    op("%", BinaryOp::Rem),
                ))
                .then(unary)
                .repeated(),
                fold_binary,
            )
            .boxed();
        let sum = product
            .clone()
            .foldl(
                choice((op("+", BinaryOp::Add), op("-", BinaryOp::Sub)))
                    .then(product)
                    .repeated(),
                fold_binary,
            )
            .boxed();
        // Two character operators first so `<=` never parses as `<`
        let comparison = sum
            .clone()
            .foldl(
                choice((
                    op("<=", BinaryOp::Le),
                    op(">=", BinaryOp::Ge),
                    op("<", BinaryOp::Lt),
                    op(">", BinaryOp::Gt),
                ))
                .then(sum)
                .repeated(),
                fold_binary,
            )
            .boxed();
        let equality = comparison
            .clone()
            .foldl(
                choice((op("==", BinaryOp::Eq), op("!=", BinaryOp::Ne)))
                    .then(comparison)
                    .repeated(),
                fold_binary,
            )
            .boxed();
        let and = equality
            .clone()
            .foldl(
                op("&&", BinaryOp::And).then(equality).repeated(),
                fold_binary,
            )
            .boxed();
        let or = and
            .clone()
            .foldl(op("||", BinaryOp::Or).then(and).repeated(), fold_binary)
            .boxed();

        or.then(
            just('?')
                .padded()
                .ignore_then(expr.clone())
                .then_ignore(just(':').padded())
                .then(expr.clone())
                .or_not(),
        )
        .map(|(condition, branches)| match branches {
            Some((then, otherwise)) => Expr::Conditional(
                Box::new(condition),
                Box::new(then),
                Box::new(otherwise),
            ),
            None => condition,
        })
    })
}

fn format_errors(errs: &[Rich<'_, char>]) -> String {
    errs.iter()
        .map(|e| {
            let found = e
                .found()
                .map_or("end of expression".to_string(), |c| format!("'{c}'"));
            format!("{} at {} (found {})", e.reason(), e.span().start, found)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Compile an expression source string.
pub fn compile(source: &str) -> Result<Expr, FieldnoteError> {
    parser()
        .then_ignore(end())
        .parse(source)
        .into_result()
        .map_err(|errs| FieldnoteError::Expression(format_errors(&errs)))
}

fn type_error(what: &str, value: &Value) -> FieldnoteError {
    FieldnoteError::Expression(format!("{what} is not defined for {}", value.type_name()))
}

fn numbers(values: &[Value]) -> Vec<f64> {
    values.iter().filter_map(Value::as_number).collect()
}

/// A list argument, optionally projected onto one field of each element.
fn projected(args: &[Value]) -> Result<Vec<Value>, FieldnoteError> {
    let items = match args.first() {
        Some(Value::List(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    };
    match args.get(1) {
        Some(Value::Str(field)) => Ok(items
            .iter()
            .map(|item| match item {
                Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            })
            .collect()),
        Some(other) => Err(type_error("field projection", other)),
        None => Ok(items),
    }
}

fn arg(args: &[Value], idx: usize) -> &Value {
    args.get(idx).unwrap_or(&Value::Null)
}

impl Expr {
    pub fn eval(&self, scope: &Scope) -> Result<Value, FieldnoteError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(name) => scope
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| FieldnoteError::Expression(format!("'{name}' is not defined"))),
            Expr::Member(target, name) => match target.eval(scope)? {
                Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
                Value::List(items) if name == "length" => Ok(Value::Number(items.len() as f64)),
                Value::Str(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
                Value::Null => Err(FieldnoteError::Expression(format!(
                    "cannot read '{name}' of null"
                ))),
                _ => Ok(Value::Null),
            },
            Expr::Index(target, index) => {
                let target = target.eval(scope)?;
                let index = index.eval(scope)?;
                match (&target, &index) {
                    (Value::Null, _) => Err(FieldnoteError::Expression(format!(
                        "cannot read '{}' of null",
                        index.render()
                    ))),
                    (Value::Object(map), Value::Str(key)) => {
                        Ok(map.get(key).cloned().unwrap_or(Value::Null))
                    }
                    (Value::List(items), Value::Number(n)) if *n >= 0.0 => {
                        Ok(items.get(*n as usize).cloned().unwrap_or(Value::Null))
                    }
                    _ => Ok(Value::Null),
                }
            }
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval(scope)?.truthy())),
            Expr::Neg(inner) => match inner.eval(scope)? {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(type_error("negation", &other)),
            },
            Expr::Conditional(condition, then, otherwise) => {
                if condition.eval(scope)?.truthy() {
                    then.eval(scope)
                } else {
                    otherwise.eval(scope)
                }
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                let left = lhs.eval(scope)?;
                if left.truthy() {
                    rhs.eval(scope)
                } else {
                    Ok(left)
                }
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                let left = lhs.eval(scope)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    rhs.eval(scope)
                }
            }
            Expr::Binary(op, lhs, rhs) => binary(*op, lhs.eval(scope)?, rhs.eval(scope)?),
            Expr::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| item.eval(scope))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Expr::Call(function, args) => {
                let args = args
                    .iter()
                    .map(|a| a.eval(scope))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*function, &args, scope)
            }
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, FieldnoteError> {
    match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::List(a), Value::List(b)) => Ok(Value::List(a.iter().chain(b.iter()).cloned().collect())),
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Ok(Value::Str(format!("{}{}", left.render(), right.render())))
            }
            _ => Err(FieldnoteError::Expression(format!(
                "cannot add {} and {}",
                left.type_name(),
                right.type_name()
            ))),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                return Err(FieldnoteError::Expression(format!(
                    "arithmetic on {} and {}",
                    left.type_name(),
                    right.type_name()
                )));
            };
            if matches!(op, BinaryOp::Div | BinaryOp::Rem) && *b == 0.0 {
                return Err(FieldnoteError::Expression("division by zero".to_string()));
            }
            Ok(Value::Number(match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(|| {
                FieldnoteError::Expression(format!(
                    "cannot compare {} and {}",
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::And => Ok(if left.truthy() { right } else { left }),
        BinaryOp::Or => Ok(if left.truthy() { left } else { right }),
    }
}

fn call(function: Function, args: &[Value], scope: &Scope) -> Result<Value, FieldnoteError> {
    let string_fn = |f: fn(&str) -> String| -> Result<Value, FieldnoteError> {
        match arg(args, 0) {
            Value::Null => Ok(Value::Null),
            Value::Str(s) => Ok(Value::Str(f(s))),
            other => Ok(Value::Str(f(&other.render()))),
        }
    };
    let rounding = |f: fn(f64) -> f64| -> Result<Value, FieldnoteError> {
        match arg(args, 0).as_number() {
            Some(n) => Ok(Value::Number(f(n))),
            None => Err(type_error("rounding", arg(args, 0))),
        }
    };
    match function {
        Function::Link => match arg(args, 0) {
            Value::Object(page) => match page.get("file") {
                Some(Value::Object(file)) => Ok(file.get("link").cloned().unwrap_or(Value::Null)),
                _ => page
                    .get("link")
                    .cloned()
                    .ok_or_else(|| type_error("link", arg(args, 0))),
            },
            Value::Str(path) => Ok(Value::Str(DocPath::from(path).to_link(scope.markdown_links))),
            other => Err(type_error("link", other)),
        },
        Function::Len => match arg(args, 0) {
            Value::List(items) => Ok(Value::Number(items.len() as f64)),
            Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
            Value::Object(map) => Ok(Value::Number(map.len() as f64)),
            Value::Null => Ok(Value::Number(0.0)),
            other => Err(type_error("len", other)),
        },
        Function::Upper => string_fn(|s| s.to_uppercase()),
        Function::Lower => string_fn(|s| s.to_lowercase()),
        Function::Trim => string_fn(|s| s.trim().to_string()),
        Function::Concat => Ok(Value::Str(args.iter().map(Value::render).collect())),
        Function::Join => {
            let separator = match args.get(1) {
                Some(Value::Str(sep)) => sep.clone(),
                _ => ", ".to_string(),
            };
            let items = projected(&args[..args.len().min(1)])?;
            Ok(Value::Str(
                items
                    .iter()
                    .map(Value::render)
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(&separator),
            ))
        }
        Function::Round => {
            let digits = arg(args, 1).as_number().unwrap_or(0.0) as i32;
            match arg(args, 0).as_number() {
                Some(n) => {
                    let factor = 10f64.powi(digits);
                    Ok(Value::Number((n * factor).round() / factor))
                }
                None => Err(type_error("round", arg(args, 0))),
            }
        }
        Function::Floor => rounding(f64::floor),
        Function::Ceil => rounding(f64::ceil),
        Function::Sum => Ok(Value::Number(numbers(&projected(args)?).iter().sum())),
        Function::Min => Ok(numbers(&projected(args)?)
            .into_iter()
            .reduce(f64::min)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        Function::Max => Ok(numbers(&projected(args)?)
            .into_iter()
            .reduce(f64::max)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        Function::Avg => {
            let values = numbers(&projected(args)?);
            if values.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::Number(values.iter().sum::<f64>() / values.len() as f64))
            }
        }
        Function::Count => Ok(Value::Number(
            projected(args)?.iter().filter(|v| !v.is_empty()).count() as f64,
        )),
        Function::MapField => Ok(Value::List(projected(args)?)),
        Function::Default => {
            let value = arg(args, 0);
            if value.is_empty() {
                Ok(arg(args, 1).clone())
            } else {
                Ok(value.clone())
            }
        }
        Function::String => Ok(Value::Str(arg(args, 0).render())),
        Function::Number => arg(args, 0)
            .as_number()
            .map(Value::Number)
            .ok_or_else(|| type_error("number", arg(args, 0))),
        Function::Contains => match (arg(args, 0), arg(args, 1)) {
            (Value::List(items), needle) => Ok(Value::Bool(items.contains(needle))),
            (Value::Str(haystack), needle) => Ok(Value::Bool(haystack.contains(&needle.render()))),
            (Value::Null, _) => Ok(Value::Bool(false)),
            (other, _) => Err(type_error("contains", other)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str, price: Option<f64>) -> Value {
        let mut file = BTreeMap::new();
        file.insert("path".to_string(), Value::Str(format!("books/{title}.md")));
        file.insert("name".to_string(), Value::Str(title.to_string()));
        file.insert("link".to_string(), Value::Str(format!("[[books/{title}|{title}]]")));
        let mut map = BTreeMap::new();
        map.insert("file".to_string(), Value::Object(file));
        map.insert("title".to_string(), Value::Str(title.to_string()));
        if let Some(price) = price {
            map.insert("price".to_string(), Value::Number(price));
        }
        Value::Object(map)
    }

    fn eval(source: &str, scope: &Scope) -> Result<Value, FieldnoteError> {
        compile(source)?.eval(scope)
    }

    #[test]
    fn test_precedence_and_arithmetic() {
        let scope = Scope::new();
        assert_eq!(eval("1 + 2 * 3", &scope).unwrap(), Value::Number(7.0));
        assert_eq!(eval("(1 + 2) * 3", &scope).unwrap(), Value::Number(9.0));
        assert_eq!(eval("-2 + 10 % 4", &scope).unwrap(), Value::Number(0.0));
        assert_eq!(eval("1 < 2 && 3 >= 3", &scope).unwrap(), Value::Bool(true));
        assert_eq!(eval("null || 'fallback'", &scope).unwrap().render(), "fallback");
        assert_eq!(eval("2 > 1 ? 'yes' : 'no'", &scope).unwrap().render(), "yes");
        assert_eq!(eval("'a' + 1.5", &scope).unwrap().render(), "a1.5");
        assert!(eval("1 / 0", &scope).is_err());
    }

    #[test]
    fn test_page_access_and_functions() {
        let scope = Scope::new().with("page", page("Dune", Some(12.5)));
        assert_eq!(eval("link(page)", &scope).unwrap().render(), "[[books/Dune|Dune]]");
        assert_eq!(eval("page.file.name", &scope).unwrap().render(), "Dune");
        assert_eq!(eval("page[\"title\"]", &scope).unwrap().render(), "Dune");
        assert_eq!(eval("upper(page.title) + ': ' + round(page.price)", &scope).unwrap().render(), "DUNE: 13");
        assert_eq!(eval("default(page.missing, 'n/a')", &scope).unwrap().render(), "n/a");
        assert_eq!(eval("link('notes/Idea.md')", &scope).unwrap().render(), "[[notes/Idea|Idea]]");
        assert!(eval("page.missing.deeper", &scope).is_err());
    }

    #[test]
    fn test_summaries_over_pages() {
        let pages = Value::List(vec![page("A", Some(2.0)), page("B", None), page("C", Some(4.0))]);
        let scope = Scope::new().with("pages", pages);
        assert_eq!(eval("sum(pages, 'price')", &scope).unwrap().render(), "6");
        assert_eq!(eval("avg(pages, 'price')", &scope).unwrap().render(), "3");
        assert_eq!(eval("count(pages, 'price')", &scope).unwrap().render(), "2");
        assert_eq!(eval("len(pages)", &scope).unwrap().render(), "3");
        assert_eq!(eval("max(map_field(pages, 'price'))", &scope).unwrap().render(), "4");
        assert_eq!(eval("join(map_field(pages, 'title'), ' | ')", &scope).unwrap().render(), "A | B | C");
        assert_eq!(eval("contains(map_field(pages, 'title'), 'B')", &scope).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_literals_whitespace_and_postfix_chains() {
        let scope = Scope::new().with("page", page("Dune", Some(3.0)));
        assert_eq!(eval(r#"  'it\'s' +   "\tx"  "#, &scope).unwrap().render(), "it's\tx");
        assert_eq!(eval("[1, 2, 3,][1]", &scope).unwrap(), Value::Number(2.0));
        assert_eq!(eval("!!true && !false", &scope).unwrap(), Value::Bool(true));
        assert_eq!(eval("page . file . name", &scope).unwrap().render(), "Dune");
        assert_eq!(eval("1 <= 1 == true", &scope).unwrap(), Value::Bool(true));
        assert_eq!(
            eval("page.price > 2 ? page.title : 'cheap'", &scope).unwrap().render(),
            "Dune"
        );
        let err = compile("upper(").unwrap_err();
        assert!(matches!(err, FieldnoteError::Expression(ref msg) if msg.contains("end of expression")));
    }

    #[test]
    fn test_compile_errors() {
        assert!(compile("1 +").is_err());
        assert!(compile("eval('x')").is_err());
        assert!(compile("'unterminated").is_err());
        assert!(compile("a b").is_err());
        assert!(compile("page.#").is_err());
    }
}
