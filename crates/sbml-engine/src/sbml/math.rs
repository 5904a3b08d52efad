//! MathML content trees and their SBML Level 3 infix rendering.

use super::xml::{XmlElement, XmlNode};
use crate::error::ModelError;

pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
const SYMBOLS: &str = "http://www.sbml.org/sbml/symbols/";

#[derive(Debug, Clone, PartialEq)]
pub enum MathExpr {
    Integer(i64),
    Real(f64),
    Rational(i64, i64),
    Name(String),
    Constant(Constant),
    /// `time`, `avogadro`: a csymbol with its display name.
    Symbol { url: String, name: String },
    /// A MathML operator element applied to operands. `root`/`log` carry
    /// their degree/base as the first of two operands.
    Apply { op: String, args: Vec<MathExpr> },
    /// User function (`url` empty) or csymbol function such as `delay`.
    Call { name: String, url: Option<String>, args: Vec<MathExpr> },
    Lambda { bvars: Vec<String>, body: Box<MathExpr> },
    Piecewise { pieces: Vec<(MathExpr, MathExpr)>, otherwise: Option<Box<MathExpr>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    True,
    False,
    Pi,
    ExponentialE,
    Infinity,
    NotANumber,
}

impl Constant {
    fn element(self) -> &'static str {
        match self {
            Constant::True => "true",
            Constant::False => "false",
            Constant::Pi => "pi",
            Constant::ExponentialE => "exponentiale",
            Constant::Infinity => "infinity",
            Constant::NotANumber => "notanumber",
        }
    }

    fn formula(self) -> &'static str {
        match self {
            Constant::True => "true",
            Constant::False => "false",
            Constant::Pi => "pi",
            Constant::ExponentialE => "exponentiale",
            Constant::Infinity => "INF",
            Constant::NotANumber => "NaN",
        }
    }

    fn from_element(name: &str) -> Option<Self> {
        Some(match name {
            "true" => Constant::True,
            "false" => Constant::False,
            "pi" => Constant::Pi,
            "exponentiale" => Constant::ExponentialE,
            "infinity" => Constant::Infinity,
            "notanumber" => Constant::NotANumber,
            _ => return None,
        })
    }

    fn from_word(word: &str) -> Option<Self> {
        Some(match word.to_ascii_lowercase().as_str() {
            "true" => Constant::True,
            "false" => Constant::False,
            "pi" => Constant::Pi,
            "exponentiale" => Constant::ExponentialE,
            "inf" | "infinity" => Constant::Infinity,
            "nan" | "notanumber" => Constant::NotANumber,
            _ => return None,
        })
    }
}

const RELATIONS: &[(&str, &str)] = &[
    ("eq", "=="),
    ("neq", "!="),
    ("gt", ">"),
    ("lt", "<"),
    ("geq", ">="),
    ("leq", "<="),
];

/// Operators written in function form, with the name the formula uses.
const FUNCTIONS: &[(&str, &str)] = &[
    ("abs", "abs"),
    ("exp", "exp"),
    ("ln", "ln"),
    ("floor", "floor"),
    ("ceiling", "ceil"),
    ("factorial", "factorial"),
    ("quotient", "quotient"),
    ("rem", "rem"),
    ("max", "max"),
    ("min", "min"),
    ("xor", "xor"),
    ("implies", "implies"),
    ("sin", "sin"),
    ("cos", "cos"),
    ("tan", "tan"),
    ("sec", "sec"),
    ("csc", "csc"),
    ("cot", "cot"),
    ("sinh", "sinh"),
    ("cosh", "cosh"),
    ("tanh", "tanh"),
    ("sech", "sech"),
    ("csch", "csch"),
    ("coth", "coth"),
    ("arcsin", "asin"),
    ("arccos", "acos"),
    ("arctan", "atan"),
    ("arcsec", "arcsec"),
    ("arccsc", "arccsc"),
    ("arccot", "arccot"),
    ("arcsinh", "arcsinh"),
    ("arccosh", "arccosh"),
    ("arctanh", "arctanh"),
    ("arcsech", "arcsech"),
    ("arccsch", "arccsch"),
    ("arccoth", "arccoth"),
];

fn relation_symbol(op: &str) -> Option<&'static str> {
    RELATIONS.iter().find(|(o, _)| *o == op).map(|(_, s)| *s)
}

fn function_name(op: &str) -> &str {
    FUNCTIONS
        .iter()
        .find(|(o, _)| *o == op)
        .map(|(_, f)| *f)
        .unwrap_or(op)
}

fn operator_for_function(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    FUNCTIONS
        .iter()
        .find(|(o, f)| *f == lower || *o == lower)
        .map(|(o, _)| *o)
        .or_else(|| RELATIONS.iter().find(|(o, _)| *o == lower).map(|(o, _)| *o))
        .or(match lower.as_str() {
            "and" => Some("and"),
            "or" => Some("or"),
            "not" => Some("not"),
            "plus" => Some("plus"),
            "times" => Some("times"),
            "minus" => Some("minus"),
            "divide" => Some("divide"),
            "pow" | "power" => Some("power"),
            "ceiling" => Some("ceiling"),
            _ => None,
        })
}

fn symbol_url(name: &str) -> Option<String> {
    match name {
        "time" | "avogadro" | "delay" | "rateOf" => Some(format!("{SYMBOLS}{name}")),
        _ => None,
    }
}

// Binding strength used by both the renderer and the parser.
const P_OR: u8 = 1;
const P_AND: u8 = 2;
const P_REL: u8 = 3;
const P_SUM: u8 = 4;
const P_PRODUCT: u8 = 5;
const P_UNARY: u8 = 6;
const P_POWER: u8 = 7;
const P_ATOM: u8 = 8;

impl MathExpr {
    pub fn apply(op: &str, args: Vec<MathExpr>) -> Self {
        MathExpr::Apply {
            op: op.to_string(),
            args,
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            MathExpr::Integer(i) if *i < 0 => P_UNARY,
            MathExpr::Real(r) if *r < 0.0 => P_UNARY,
            MathExpr::Apply { op, args } => match (op.as_str(), args.len()) {
                ("or", n) if n >= 2 => P_OR,
                ("and", n) if n >= 2 => P_AND,
                (op, 2) if relation_symbol(op).is_some() => P_REL,
                ("plus", n) if n >= 2 => P_SUM,
                ("minus", 2) => P_SUM,
                ("minus", 1) | ("not", 1) => P_UNARY,
                ("times", n) if n >= 2 => P_PRODUCT,
                ("divide", 2) => P_PRODUCT,
                ("power", 2) => P_POWER,
                _ => P_ATOM,
            },
            _ => P_ATOM,
        }
    }

    /// Render as an SBML Level 3 infix formula.
    pub fn to_formula(&self) -> String {
        match self {
            MathExpr::Integer(i) => i.to_string(),
            MathExpr::Real(r) => format_real(*r),
            MathExpr::Rational(n, d) => format!("({n}/{d})"),
            MathExpr::Name(n) => n.clone(),
            MathExpr::Constant(c) => c.formula().to_string(),
            MathExpr::Symbol { name, .. } => name.clone(),
            MathExpr::Call { name, args, .. } => call(name, args),
            MathExpr::Lambda { bvars, body } => {
                let mut parts: Vec<String> = bvars.clone();
                parts.push(body.to_formula());
                format!("lambda({})", parts.join(", "))
            }
            MathExpr::Piecewise { pieces, otherwise } => {
                let mut parts = Vec::new();
                for (value, condition) in pieces {
                    parts.push(value.to_formula());
                    parts.push(condition.to_formula());
                }
                if let Some(o) = otherwise {
                    parts.push(o.to_formula());
                }
                format!("piecewise({})", parts.join(", "))
            }
            MathExpr::Apply { op, args } => self.render_apply(op, args),
        }
    }

    fn render_apply(&self, op: &str, args: &[MathExpr]) -> String {
        let own = self.precedence();
        let wrap = |arg: &MathExpr, strict: bool| {
            let p = arg.precedence();
            if p < own || (strict && p == own) {
                format!("({})", arg.to_formula())
            } else {
                arg.to_formula()
            }
        };
        let join = |sep: &str| {
            args.iter()
                .map(|a| wrap(a, false))
                .collect::<Vec<_>>()
                .join(sep)
        };

        match (op, args.len()) {
            ("plus", 0) => "0".into(),
            ("times", 0) => "1".into(),
            ("plus", 1) | ("times", 1) => args[0].to_formula(),
            ("and", 0) => "true".into(),
            ("or", 0) => "false".into(),
            ("plus", _) => join(" + "),
            ("times", _) => join(" * "),
            ("and", _) => join(" && "),
            ("or", _) => join(" || "),
            ("minus", 1) => format!("-{}", wrap(&args[0], false)),
            ("not", 1) => format!("!{}", wrap(&args[0], false)),
            ("minus", 2) => format!("{} - {}", wrap(&args[0], false), wrap(&args[1], true)),
            ("divide", 2) => format!("{} / {}", wrap(&args[0], false), wrap(&args[1], true)),
            ("power", 2) => format!("{}^{}", wrap(&args[0], true), wrap(&args[1], false)),
            (op, 2) if relation_symbol(op).is_some() => format!(
                "{} {} {}",
                wrap(&args[0], true),
                relation_symbol(op).unwrap_or("=="),
                wrap(&args[1], true)
            ),
            ("root", 1) => call("sqrt", args),
            ("root", 2) if args[0] == MathExpr::Integer(2) => call("sqrt", &args[1..]),
            ("log", 1) => call("log10", args),
            ("log", 2) if args[0] == MathExpr::Integer(10) => call("log10", &args[1..]),
            (op, _) => call(function_name(op), args),
        }
    }

    pub fn from_mathml(math: &XmlElement) -> Result<Self, ModelError> {
        let node = if math.local_name() == "math" {
            math.first_element()
                .ok_or_else(|| ModelError::Formula("empty <math> element".into()))?
        } else {
            math
        };
        read_node(node)
    }

    /// Wrap in a `<math>` element carrying the MathML namespace.
    pub fn to_mathml(&self) -> XmlElement {
        XmlElement::new("math")
            .with_attribute("xmlns", MATHML_NS)
            .with_child(write_node(self))
    }

    pub fn parse_formula(formula: &str) -> Result<Self, ModelError> {
        let tokens = tokenize(formula)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression(0)?;
        match parser.peek() {
            None => Ok(expr),
            Some(t) => Err(ModelError::Formula(format!(
                "unexpected `{}` in `{formula}`",
                t.describe()
            ))),
        }
    }
}

fn format_real(r: f64) -> String {
    if r.is_nan() {
        "NaN".into()
    } else if r.is_infinite() {
        if r > 0.0 { "INF".into() } else { "-INF".into() }
    } else {
        r.to_string()
    }
}

fn call(name: &str, args: &[MathExpr]) -> String {
    let rendered: Vec<String> = args.iter().map(MathExpr::to_formula).collect();
    format!("{}({})", name, rendered.join(", "))
}

fn read_cn(el: &XmlElement) -> Result<MathExpr, ModelError> {
    let parts: Vec<String> = el
        .children
        .iter()
        .filter_map(|c| match c {
            XmlNode::Text(t) => Some(t.trim().to_string()),
            XmlNode::Element(_) => None,
        })
        .filter(|t| !t.is_empty())
        .collect();
    let bad = || ModelError::Formula(format!("invalid <cn> content: {}", parts.join(" ")));
    let first = parts.first().ok_or_else(bad)?;
    match el.attribute("type").unwrap_or("real") {
        "integer" => first.parse().map(MathExpr::Integer).map_err(|_| bad()),
        "rational" => {
            let n = first.parse().map_err(|_| bad())?;
            let d = parts.get(1).ok_or_else(bad)?.parse().map_err(|_| bad())?;
            Ok(MathExpr::Rational(n, d))
        }
        "e-notation" => {
            let m: f64 = first.parse().map_err(|_| bad())?;
            let e: i32 = parts.get(1).ok_or_else(bad)?.parse().map_err(|_| bad())?;
            Ok(MathExpr::Real(m * 10f64.powi(e)))
        }
        _ => first.parse().map(MathExpr::Real).map_err(|_| bad()),
    }
}

fn read_node(el: &XmlElement) -> Result<MathExpr, ModelError> {
    let name = el.local_name();
    if let Some(c) = Constant::from_element(name) {
        return Ok(MathExpr::Constant(c));
    }
    match name {
        "cn" => read_cn(el),
        "ci" => Ok(MathExpr::Name(el.text().trim().to_string())),
        "csymbol" => Ok(MathExpr::Symbol {
            url: el.attribute("definitionURL").unwrap_or_default().to_string(),
            name: el.text().trim().to_string(),
        }),
        "semantics" => read_node(
            el.first_element()
                .ok_or_else(|| ModelError::Formula("empty <semantics>".into()))?,
        ),
        "lambda" => {
            let mut bvars = Vec::new();
            let mut body = None;
            for child in el.elements() {
                if child.local_name() == "bvar" {
                    let ci = child
                        .first_element()
                        .ok_or_else(|| ModelError::Formula("empty <bvar>".into()))?;
                    bvars.push(ci.text().trim().to_string());
                } else {
                    body = Some(read_node(child)?);
                }
            }
            let body = body.ok_or_else(|| ModelError::Formula("lambda without body".into()))?;
            Ok(MathExpr::Lambda {
                bvars,
                body: Box::new(body),
            })
        }
        "piecewise" => {
            let mut pieces = Vec::new();
            let mut otherwise = None;
            for child in el.elements() {
                match child.local_name() {
                    "piece" => {
                        let mut parts = child.elements();
                        let (Some(value), Some(condition)) = (parts.next(), parts.next()) else {
                            return Err(ModelError::Formula("incomplete <piece>".into()));
                        };
                        pieces.push((read_node(value)?, read_node(condition)?));
                    }
                    "otherwise" => {
                        let inner = child
                            .first_element()
                            .ok_or_else(|| ModelError::Formula("empty <otherwise>".into()))?;
                        otherwise = Some(Box::new(read_node(inner)?));
                    }
                    other => {
                        return Err(ModelError::Formula(format!("unexpected <{other}> in piecewise")))
                    }
                }
            }
            Ok(MathExpr::Piecewise { pieces, otherwise })
        }
        "apply" => {
            let mut children = el.elements();
            let head = children
                .next()
                .ok_or_else(|| ModelError::Formula("empty <apply>".into()))?;
            let mut args = Vec::new();
            for child in children {
                match child.local_name() {
                    "degree" | "logbase" => {
                        let inner = child
                            .first_element()
                            .ok_or_else(|| ModelError::Formula("empty qualifier".into()))?;
                        args.insert(0, read_node(inner)?);
                    }
                    _ => args.push(read_node(child)?),
                }
            }
            match head.local_name() {
                "ci" => Ok(MathExpr::Call {
                    name: head.text().trim().to_string(),
                    url: None,
                    args,
                }),
                "csymbol" => Ok(MathExpr::Call {
                    name: head.text().trim().to_string(),
                    url: head.attribute("definitionURL").map(str::to_string),
                    args,
                }),
                op => Ok(MathExpr::Apply {
                    op: op.to_string(),
                    args,
                }),
            }
        }
        other => Err(ModelError::Formula(format!("unsupported MathML element <{other}>"))),
    }
}

fn leaf(name: &str, text: String) -> XmlElement {
    XmlElement::new(name).with_text(format!(" {text} "))
}

fn csymbol(url: &str, name: &str) -> XmlElement {
    XmlElement::new("csymbol")
        .with_attribute("encoding", "text")
        .with_attribute("definitionURL", url)
        .with_text(format!(" {name} "))
}

fn write_node(expr: &MathExpr) -> XmlElement {
    match expr {
        MathExpr::Integer(i) => leaf("cn", i.to_string()).with_attribute("type", "integer"),
        MathExpr::Real(r) if r.is_nan() => XmlElement::new("notanumber"),
        MathExpr::Real(r) if r.is_infinite() && *r > 0.0 => XmlElement::new("infinity"),
        MathExpr::Real(r) if r.is_infinite() => {
            XmlElement::new("apply")
                .with_child(XmlElement::new("minus"))
                .with_child(XmlElement::new("infinity"))
        }
        MathExpr::Real(r) => leaf("cn", r.to_string()),
        MathExpr::Rational(n, d) => XmlElement::new("cn")
            .with_attribute("type", "rational")
            .with_text(format!(" {n} "))
            .with_child(XmlElement::new("sep"))
            .with_text(format!(" {d} ")),
        MathExpr::Name(n) => leaf("ci", n.clone()),
        MathExpr::Constant(c) => XmlElement::new(c.element()),
        MathExpr::Symbol { url, name } => csymbol(url, name),
        MathExpr::Call { name, url, args } => {
            let head = match url {
                Some(url) => csymbol(url, name),
                None => leaf("ci", name.clone()),
            };
            args.iter()
                .fold(XmlElement::new("apply").with_child(head), |el, a| {
                    el.with_child(write_node(a))
                })
        }
        MathExpr::Lambda { bvars, body } => {
            let el = bvars.iter().fold(XmlElement::new("lambda"), |el, b| {
                el.with_child(XmlElement::new("bvar").with_child(leaf("ci", b.clone())))
            });
            el.with_child(write_node(body))
        }
        MathExpr::Piecewise { pieces, otherwise } => {
            let mut el = XmlElement::new("piecewise");
            for (value, condition) in pieces {
                el = el.with_child(
                    XmlElement::new("piece")
                        .with_child(write_node(value))
                        .with_child(write_node(condition)),
                );
            }
            if let Some(o) = otherwise {
                el = el.with_child(XmlElement::new("otherwise").with_child(write_node(o)));
            }
            el
        }
        MathExpr::Apply { op, args } => {
            let mut el = XmlElement::new("apply").with_child(XmlElement::new(op.as_str()));
            let mut rest = args.as_slice();
            let qualifier = match op.as_str() {
                "root" => Some("degree"),
                "log" => Some("logbase"),
                _ => None,
            };
            if let (Some(q), 2) = (qualifier, args.len()) {
                el = el.with_child(XmlElement::new(q).with_child(write_node(&args[0])));
                rest = &args[1..];
            }
            rest.iter().fold(el, |el, a| el.with_child(write_node(a)))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) | Token::Ident(n) => n.clone(),
            Token::Op(o) => o.to_string(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

const OPERATORS: &[&str] = &[
    "&&", "||", "==", "!=", ">=", "<=", "+", "-", "*", "/", "^", "<", ">", "!",
];

fn tokenize(input: &str) -> Result<Vec<Token>, ModelError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == ',' {
            tokens.push(Token::Comma);
            i += 1;
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op: &'static str = *OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| ModelError::Formula(format!("unexpected character `{c}` in `{input}`")))?;
            tokens.push(Token::Op(op));
            i += op.len();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn infix(op: &str) -> Option<(u8, u8, &'static str)> {
    // (left binding power, right binding power, MathML operator)
    Some(match op {
        "||" => (2 * P_OR, 2 * P_OR + 1, "or"),
        "&&" => (2 * P_AND, 2 * P_AND + 1, "and"),
        "==" => (2 * P_REL, 2 * P_REL + 1, "eq"),
        "!=" => (2 * P_REL, 2 * P_REL + 1, "neq"),
        ">" => (2 * P_REL, 2 * P_REL + 1, "gt"),
        "<" => (2 * P_REL, 2 * P_REL + 1, "lt"),
        ">=" => (2 * P_REL, 2 * P_REL + 1, "geq"),
        "<=" => (2 * P_REL, 2 * P_REL + 1, "leq"),
        "+" => (2 * P_SUM, 2 * P_SUM + 1, "plus"),
        "-" => (2 * P_SUM, 2 * P_SUM + 1, "minus"),
        "*" => (2 * P_PRODUCT, 2 * P_PRODUCT + 1, "times"),
        "/" => (2 * P_PRODUCT, 2 * P_PRODUCT + 1, "divide"),
        "^" => (2 * P_POWER + 1, 2 * P_POWER, "power"),
        _ => return None,
    })
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ModelError> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(ModelError::Formula(format!(
                "expected `{}`, found `{}`",
                expected.describe(),
                t.describe()
            ))),
            None => Err(ModelError::Formula(format!(
                "expected `{}`, found end of formula",
                expected.describe()
            ))),
        }
    }

    fn expression(&mut self, min_bp: u8) -> Result<MathExpr, ModelError> {
        let mut lhs = self.prefix()?;
        loop {
            let Some(Token::Op(op)) = self.peek().cloned() else {
                break;
            };
            let Some((left_bp, right_bp, mathml)) = infix(op) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            self.next();
            let rhs = self.expression(right_bp)?;
            lhs = match lhs {
                MathExpr::Apply { op, mut args }
                    if op == mathml && matches!(mathml, "plus" | "times" | "and" | "or") =>
                {
                    args.push(rhs);
                    MathExpr::Apply { op, args }
                }
                other => MathExpr::apply(mathml, vec![other, rhs]),
            };
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<MathExpr, ModelError> {
        let unary_bp = 2 * P_UNARY;
        match self.next() {
            Some(Token::Number(n)) => {
                if n.contains(['.', 'e', 'E']) {
                    n.parse()
                        .map(MathExpr::Real)
                        .map_err(|_| ModelError::Formula(format!("invalid number `{n}`")))
                } else {
                    match n.parse() {
                        Ok(i) => Ok(MathExpr::Integer(i)),
                        Err(_) => n
                            .parse()
                            .map(MathExpr::Real)
                            .map_err(|_| ModelError::Formula(format!("invalid number `{n}`"))),
                    }
                }
            }
            Some(Token::Op("-")) => {
                let operand = self.expression(unary_bp)?;
                Ok(match operand {
                    MathExpr::Integer(i) => MathExpr::Integer(-i),
                    MathExpr::Real(r) => MathExpr::Real(-r),
                    other => MathExpr::apply("minus", vec![other]),
                })
            }
            Some(Token::Op("+")) => self.expression(unary_bp),
            Some(Token::Op("!")) => Ok(MathExpr::apply("not", vec![self.expression(unary_bp)?])),
            Some(Token::LParen) => {
                let inner = self.expression(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.next();
                    let args = self.arguments()?;
                    return function(&name, args);
                }
                if let Some(c) = Constant::from_word(&name) {
                    return Ok(MathExpr::Constant(c));
                }
                match symbol_url(&name) {
                    Some(url) if name == "time" || name == "avogadro" => {
                        Ok(MathExpr::Symbol { url, name })
                    }
                    _ => Ok(MathExpr::Name(name)),
                }
            }
            Some(t) => Err(ModelError::Formula(format!("unexpected `{}`", t.describe()))),
            None => Err(ModelError::Formula("unexpected end of formula".into())),
        }
    }

    fn arguments(&mut self) -> Result<Vec<MathExpr>, ModelError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(t) => {
                    return Err(ModelError::Formula(format!(
                        "expected `,` or `)`, found `{}`",
                        t.describe()
                    )))
                }
                None => return Err(ModelError::Formula("unclosed argument list".into())),
            }
        }
    }
}

fn function(name: &str, mut args: Vec<MathExpr>) -> Result<MathExpr, ModelError> {
    match name {
        "lambda" => {
            let body = args
                .pop()
                .ok_or_else(|| ModelError::Formula("lambda without body".into()))?;
            let bvars = args
                .into_iter()
                .map(|a| match a {
                    MathExpr::Name(n) => Ok(n),
                    other => Err(ModelError::Formula(format!(
                        "lambda argument `{}` is not a name",
                        other.to_formula()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(MathExpr::Lambda {
                bvars,
                body: Box::new(body),
            })
        }
        "piecewise" => {
            let otherwise = if args.len() % 2 == 1 {
                args.pop().map(Box::new)
            } else {
                None
            };
            let mut pieces = Vec::new();
            let mut it = args.into_iter();
            while let (Some(value), Some(condition)) = (it.next(), it.next()) {
                pieces.push((value, condition));
            }
            Ok(MathExpr::Piecewise { pieces, otherwise })
        }
        "sqrt" => Ok(MathExpr::apply("root", args)),
        "log10" => Ok(MathExpr::apply("log", args)),
        "log" | "root" => Ok(MathExpr::apply(name, args)),
        "delay" | "rateOf" => Ok(MathExpr::Call {
            name: name.to_string(),
            url: symbol_url(name),
            args,
        }),
        _ => match operator_for_function(name) {
            Some(op) => Ok(MathExpr::apply(op, args)),
            None => Ok(MathExpr::Call {
                name: name.to_string(),
                url: None,
                args,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbml::xml;

    fn roundtrip(formula: &str) -> String {
        MathExpr::parse_formula(formula).unwrap().to_formula()
    }

    #[test]
    fn precedence_survives_rendering() {
        assert_eq!(roundtrip("k1 * S1"), "k1 * S1");
        assert_eq!(roundtrip("(a + b) * c"), "(a + b) * c");
        assert_eq!(roundtrip("a - (b - c)"), "a - (b - c)");
        assert_eq!(roundtrip("a - b - c"), "a - b - c");
        assert_eq!(roundtrip("a / (b * c)"), "a / (b * c)");
        assert_eq!(roundtrip("-x^2"), "-x^2");
        assert_eq!(roundtrip("(-x)^2"), "(-x)^2");
        assert_eq!(roundtrip("a^b^c"), "a^b^c");
        assert_eq!(roundtrip("(a^b)^c"), "(a^b)^c");
        assert_eq!(roundtrip("x > 1 && y <= 2 || !z"), "x > 1 && y <= 2 || !z");
        assert_eq!(roundtrip("a + b + c"), "a + b + c");
    }

    #[test]
    fn functions_and_special_forms() {
        assert_eq!(roundtrip("sqrt(x)"), "sqrt(x)");
        assert_eq!(roundtrip("log10(x)"), "log10(x)");
        assert_eq!(roundtrip("log(2, x)"), "log(2, x)");
        assert_eq!(roundtrip("ceil(x)"), "ceil(x)");
        assert_eq!(roundtrip("f(x, 2)"), "f(x, 2)");
        assert_eq!(roundtrip("lambda(x, y, x * y)"), "lambda(x, y, x * y)");
        assert_eq!(roundtrip("piecewise(1, x > 0, 0)"), "piecewise(1, x > 0, 0)");
        assert_eq!(roundtrip("delay(x, 1.5)"), "delay(x, 1.5)");
        assert_eq!(roundtrip("time * 2"), "time * 2");
        assert_eq!(roundtrip("INF"), "INF");
    }

    #[test]
    fn mathml_round_trip() {
        let doc = r#"<math xmlns="http://www.w3.org/1998/Math/MathML">
            <apply><times/><ci> compartment </ci><ci> k1 </ci>
              <apply><power/><ci> S1 </ci><cn type="integer"> 2 </cn></apply>
            </apply></math>"#;
        let expr = MathExpr::from_mathml(&xml::parse(doc).unwrap()).unwrap();
        assert_eq!(expr.to_formula(), "compartment * k1 * S1^2");

        let written = expr.to_mathml();
        assert_eq!(written.attribute("xmlns"), Some(MATHML_NS));
        assert_eq!(MathExpr::from_mathml(&written).unwrap(), expr);
    }

    #[test]
    fn mathml_qualifiers_and_csymbols() {
        let doc = r#"<math><apply><root/><degree><cn type="integer">3</cn></degree><ci>x</ci></apply></math>"#;
        let expr = MathExpr::from_mathml(&xml::parse(doc).unwrap()).unwrap();
        assert_eq!(expr.to_formula(), "root(3, x)");
        assert_eq!(MathExpr::from_mathml(&expr.to_mathml()).unwrap(), expr);

        let doc = r#"<math><apply><times/><csymbol encoding="text" definitionURL="http://www.sbml.org/sbml/symbols/time">t</csymbol><cn type="e-notation">1<sep/>2</cn></apply></math>"#;
        let expr = MathExpr::from_mathml(&xml::parse(doc).unwrap()).unwrap();
        assert_eq!(expr.to_formula(), "t * 100");
    }

    #[test]
    fn malformed_formula_is_an_error() {
        assert!(MathExpr::parse_formula("a +").is_err());
        assert!(MathExpr::parse_formula("f(a, b").is_err());
        assert!(MathExpr::parse_formula("a $ b").is_err());
        assert!(MathExpr::parse_formula("(a + b))").is_err());
    }
}
