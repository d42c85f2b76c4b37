//! Eval expression compilation and the eval function table.

use super::dialect::Dialect;
use super::fields::map_field;
use super::ip::{cidr_bounds, IpAnswer, IpFunction, IP_RANGES};
use crate::query::{EvalExpr, Value};
use std::net::Ipv4Addr;

/// Eval functions with a dedicated translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum EvalFunction {
    If,
    Case,
    Coalesce,
    Concat,
    Round,
    Abs,
    Ceil,
    Floor,
    Sqrt,
    Pow,
    Exp,
    Ln,
    Log10,
    Len,
    Lower,
    Upper,
    Substr,
    Trim,
    Ltrim,
    Rtrim,
    Replace,
    ToString,
    ToNumber,
    Now,
    IsNull,
    IsNotNull,
    Match,
    Like,
    CidrMatch,
    Ip(IpFunction),
}

/// Known eval functions with their accepted argument counts (`None` = unbounded).
const FUNCTIONS: &[(&str, EvalFunction, usize, Option<usize>)] = &[
    ("if", EvalFunction::If, 3, Some(3)),
    ("case", EvalFunction::Case, 2, None),
    ("coalesce", EvalFunction::Coalesce, 1, None),
    ("concat", EvalFunction::Concat, 1, None),
    ("round", EvalFunction::Round, 1, Some(2)),
    ("abs", EvalFunction::Abs, 1, Some(1)),
    ("ceil", EvalFunction::Ceil, 1, Some(1)),
    ("ceiling", EvalFunction::Ceil, 1, Some(1)),
    ("floor", EvalFunction::Floor, 1, Some(1)),
    ("sqrt", EvalFunction::Sqrt, 1, Some(1)),
    ("pow", EvalFunction::Pow, 2, Some(2)),
    ("exp", EvalFunction::Exp, 1, Some(1)),
    ("ln", EvalFunction::Ln, 1, Some(1)),
    ("log10", EvalFunction::Log10, 1, Some(1)),
    ("len", EvalFunction::Len, 1, Some(1)),
    ("lower", EvalFunction::Lower, 1, Some(1)),
    ("upper", EvalFunction::Upper, 1, Some(1)),
    ("substr", EvalFunction::Substr, 2, Some(3)),
    ("trim", EvalFunction::Trim, 1, Some(1)),
    ("ltrim", EvalFunction::Ltrim, 1, Some(1)),
    ("rtrim", EvalFunction::Rtrim, 1, Some(1)),
    ("replace", EvalFunction::Replace, 3, Some(3)),
    ("tostring", EvalFunction::ToString, 1, Some(1)),
    ("tonumber", EvalFunction::ToNumber, 1, Some(1)),
    ("now", EvalFunction::Now, 0, Some(0)),
    ("isnull", EvalFunction::IsNull, 1, Some(1)),
    ("isnotnull", EvalFunction::IsNotNull, 1, Some(1)),
    ("match", EvalFunction::Match, 2, Some(2)),
    ("like", EvalFunction::Like, 2, Some(2)),
    ("cidrmatch", EvalFunction::CidrMatch, 2, Some(2)),
];

impl EvalFunction {
    /// Looks up a function by lowercased name and argument count.
    ///
    /// Returns `None` for unknown names and for known names called with the wrong
    /// number of arguments; both are passed through verbatim.
    #[must_use]
    pub fn resolve(name: &str, arity: usize) -> Option<Self> {
        if let Some(ip) = IpFunction::from_name(name) {
            return (arity == 1).then_some(Self::Ip(ip));
        }
        FUNCTIONS
            .iter()
            .find(|(n, ..)| *n == name)
            .filter(|(_, _, min, max)| arity >= *min && max.map_or(true, |max| arity <= max))
            .map(|(_, function, ..)| *function)
    }
}

/// Compiles an eval expression to SQL.
pub fn compile_expr<D: Dialect>(dialect: &D, expr: &EvalExpr) -> String {
    match expr {
        EvalExpr::Literal { value } => dialect.literal(value),
        EvalExpr::FieldRef { name } => dialect.identifier(map_field(name)),
        EvalExpr::BinaryOp { op, left, right } => format!(
            "({} {} {})",
            compile_expr(dialect, left),
            op.as_sql(),
            compile_expr(dialect, right)
        ),
        EvalExpr::FunctionCall { name, args } => compile_call(dialect, name, args),
    }
}

fn compile_call<D: Dialect>(dialect: &D, name: &str, args: &[EvalExpr]) -> String {
    let Some(function) = EvalFunction::resolve(name, args.len()) else {
        let compiled: Vec<String> = args.iter().map(|a| compile_expr(dialect, a)).collect();
        tracing::debug!(function = name, arity = args.len(), "Passing eval function through");
        return format!("{name}({})", compiled.join(", "));
    };

    let a: Vec<String> = args.iter().map(|a| compile_expr(dialect, a)).collect();
    match function {
        EvalFunction::If => {
            dialect.conditional(&[(a[0].clone(), a[1].clone())], &a[2])
        }
        EvalFunction::Case => {
            let branches: Vec<(String, String)> = a
                .chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect();
            let otherwise = if a.len() % 2 == 1 {
                a[a.len() - 1].as_str()
            } else {
                "NULL"
            };
            dialect.conditional(&branches, otherwise)
        }
        EvalFunction::Concat => dialect.concat(&a),
        EvalFunction::Coalesce => format!("coalesce({})", a.join(", ")),
        EvalFunction::Round => format!("round({})", a.join(", ")),
        EvalFunction::Abs => format!("abs({})", a[0]),
        EvalFunction::Ceil => format!("ceil({})", a[0]),
        EvalFunction::Floor => format!("floor({})", a[0]),
        EvalFunction::Sqrt => format!("sqrt({})", a[0]),
        EvalFunction::Pow => format!("pow({}, {})", a[0], a[1]),
        EvalFunction::Exp => format!("exp({})", a[0]),
        EvalFunction::Ln => dialect.natural_log(&a[0]),
        EvalFunction::Log10 => format!("log10({})", a[0]),
        EvalFunction::Len => format!("length({})", a[0]),
        EvalFunction::Lower => format!("lower({})", a[0]),
        EvalFunction::Upper => format!("upper({})", a[0]),
        EvalFunction::Substr => dialect.substring(&a),
        EvalFunction::Trim => format!("trim({})", a[0]),
        EvalFunction::Ltrim => format!("ltrim({})", a[0]),
        EvalFunction::Rtrim => format!("rtrim({})", a[0]),
        EvalFunction::Replace => format!("replace({}, {}, {})", a[0], a[1], a[2]),
        EvalFunction::ToString => dialect.to_text(&a[0]),
        EvalFunction::ToNumber => dialect.to_number(&a[0]),
        EvalFunction::Now => dialect.now(),
        EvalFunction::IsNull => format!("({} IS NULL)", a[0]),
        EvalFunction::IsNotNull => format!("({} IS NOT NULL)", a[0]),
        EvalFunction::Match => match &args[1] {
            EvalExpr::Literal {
                value: Value::String(p) | Value::Regex(p),
            } => dialect.regex_match(&a[0], p),
            _ => format!("match({}, {})", a[0], a[1]),
        },
        EvalFunction::Like => format!("({} LIKE {})", a[0], a[1]),
        EvalFunction::CidrMatch => compile_cidr_match(dialect, &args[0], &args[1])
            .unwrap_or_else(|| format!("cidrmatch({}, {})", a[0], a[1])),
        EvalFunction::Ip(ip) => compile_ip_function(dialect, ip, &args[0]),
    }
}

/// Folds or expands one of the IP taxonomy functions.
fn compile_ip_function<D: Dialect>(dialect: &D, function: IpFunction, arg: &EvalExpr) -> String {
    if let EvalExpr::Literal {
        value: Value::String(text),
    } = arg
    {
        if let Ok(addr) = text.trim().parse::<Ipv4Addr>() {
            return match function.evaluate(addr) {
                IpAnswer::Label(label) => dialect.quote_string(label),
                IpAnswer::Flag(flag) => u8::from(flag).to_string(),
            };
        }
    }

    let ip = compile_expr(dialect, arg);
    let test = |start, end| dialect.ipv4_in_range(&ip, start, end);

    match function {
        IpFunction::Classify => {
            let branches: Vec<(String, String)> = IP_RANGES
                .iter()
                .map(|range| {
                    (
                        test(range.start, range.end),
                        dialect.quote_string(range.class.label()),
                    )
                })
                .collect();
            dialect.conditional(&branches, &dialect.quote_string("public"))
        }
        IpFunction::IsPublic => {
            let tests: Vec<String> = IP_RANGES
                .iter()
                .map(|range| test(range.start, range.end))
                .collect();
            format!("NOT ({})", tests.join(" OR "))
        }
        _ => {
            let classes = function.classes();
            let tests: Vec<String> = IP_RANGES
                .iter()
                .filter(|range| classes.contains(&range.class))
                .map(|range| test(range.start, range.end))
                .collect();
            format!("({})", tests.join(" OR "))
        }
    }
}

/// `cidrmatch(cidr, ip)` with a literal CIDR becomes a range test.
fn compile_cidr_match<D: Dialect>(dialect: &D, cidr: &EvalExpr, ip: &EvalExpr) -> Option<String> {
    let EvalExpr::Literal {
        value: Value::String(cidr),
    } = cidr
    else {
        return None;
    };
    let (start, end) = cidr_bounds(cidr)?;
    Some(dialect.ipv4_in_range(&compile_expr(dialect, ip), start, end))
}
