//! Text format for symbolic transition systems.
//!
//! ```text
//! # a counter that never reaches 5
//! var x : int
//! init x = 0
//! trans x' = x + 1 && x < 3 || x' = x
//! prop x < 5
//! ```
//!
//! A declaration starts with one of `var`, `init`, `trans`, `invar` or `prop` at the
//! beginning of a line and extends over the following lines that do not. Repeated
//! `init`, `trans` and `invar` declarations are conjoined. Comments run from `#` to the
//! end of the line.
//!
//! Expressions use the syntax [`Expr`]'s `Display` prints. From loosest to tightest:
//! `->` (right associative), `||`, `&&`, the comparisons `= != < <= > >=`, `+ -`, `*`,
//! and the prefix operators `!` and `-`.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use log::debug;

use crate::error::{Error, Result};
use crate::expr::{Expr, Sort, Var};
use crate::sts::Sts;

pub fn parse_sts(text: &str) -> Result<Sts> {
    let mut decls: Vec<(usize, &str, String)> = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let keyword = line.split_whitespace().next().unwrap_or("");
        match keyword {
            "var" | "init" | "trans" | "invar" | "prop" => {
                decls.push((i + 1, keyword, line[keyword.len()..].trim().to_string()));
            }
            _ => match decls.last_mut() {
                Some((_, _, body)) => {
                    body.push(' ');
                    body.push_str(line);
                }
                None => {
                    return Err(Error::Parse {
                        line: i + 1,
                        msg: format!("expected a declaration, found `{keyword}`"),
                    })
                }
            },
        }
    }

    let mut vars = BTreeSet::new();
    for (line, keyword, body) in &decls {
        if *keyword == "var" {
            let var = parse_var(*line, body)?;
            if vars.iter().any(|v: &Var| v.name() == var.name()) {
                return Err(Error::Parse {
                    line: *line,
                    msg: format!("variable `{var}` declared twice"),
                });
            }
            vars.insert(var);
        }
    }

    let mut builder = Sts::builder();
    for var in &vars {
        builder = builder.var(var.clone());
    }
    for (line, keyword, body) in &decls {
        if *keyword == "var" {
            continue;
        }
        let expr = parse_expr_at(*line, body, &vars)?;
        builder = match *keyword {
            "init" => builder.init(expr),
            "trans" => builder.trans(expr),
            "invar" => builder.invar(expr),
            _ => builder.prop(expr),
        };
    }
    let sts = builder.build()?;
    debug!("parsed system over {} variables", sts.vars().len());
    Ok(sts)
}

impl FromStr for Sts {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_sts(s)
    }
}

/// Parses an expression over the declared `vars`.
pub fn parse_expr(text: &str, vars: &BTreeSet<Var>) -> Result<Expr> {
    parse_expr_at(1, text, vars)
}

fn parse_var(line: usize, body: &str) -> Result<Var> {
    let err = |msg: String| Error::Parse { line, msg };
    let (name, sort) = body
        .split_once(':')
        .ok_or_else(|| err(format!("expected `var <name> : <sort>`, found `var {body}`")))?;
    let name = name.trim();
    if !is_ident(name) {
        return Err(err(format!("invalid variable name `{name}`")));
    }
    let sort = match sort.trim() {
        "int" => Sort::Int,
        "bool" => Sort::Bool,
        other => return Err(err(format!("unknown sort `{other}`"))),
    };
    Ok(Var::new(name, sort))
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !matches!(s, "true" | "false")
}

fn parse_expr_at(line: usize, text: &str, vars: &BTreeSet<Var>) -> Result<Expr> {
    let tokens = tokenize(line, text)?;
    let vars: HashMap<&str, &Var> = vars.iter().map(|v| (v.name(), v)).collect();
    let mut parser = Parser {
        line,
        tokens,
        pos: 0,
        vars,
    };
    let expr = parser.imply()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(format!("unexpected `{token}`")));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Primed(String),
    Int(i64),
    Sym(&'static str),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{name}"),
            Token::Primed(name) => write!(f, "{name}'"),
            Token::Int(n) => write!(f, "{n}"),
            Token::Sym(s) => write!(f, "{s}"),
        }
    }
}

const SYMBOLS: [&str; 16] = [
    "->", "||", "&&", "!=", "<=", ">=", "=", "<", ">", "!", "+", "-", "*", "(", ")", "'",
];

fn tokenize(line: usize, text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let c = rest.chars().next().unwrap_or(' ');
        if c.is_ascii_digit() {
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            let n = rest[..end].parse::<i64>().map_err(|e| Error::Parse {
                line,
                msg: format!("invalid integer `{}`: {e}", &rest[..end]),
            })?;
            tokens.push(Token::Int(n));
            rest = &rest[end..];
        } else if c.is_ascii_alphabetic() || c == '_' {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                .unwrap_or(rest.len());
            let name = rest[..end].to_string();
            rest = &rest[end..];
            if let Some(after) = rest.strip_prefix('\'') {
                tokens.push(Token::Primed(name));
                rest = after;
            } else {
                tokens.push(Token::Ident(name));
            }
        } else if let Some(sym) = SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
            tokens.push(Token::Sym(sym));
            rest = &rest[sym.len()..];
        } else {
            return Err(Error::Parse {
                line,
                msg: format!("unexpected character `{c}`"),
            });
        }
        rest = rest.trim_start();
    }
    Ok(tokens)
}

struct Parser<'a> {
    line: usize,
    tokens: Vec<Token>,
    pos: usize,
    vars: HashMap<&'a str, &'a Var>,
}

impl Parser<'_> {
    fn error(&self, msg: String) -> Error {
        Error::Parse { line: self.line, msg }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn imply(&mut self) -> Result<Expr> {
        let lhs = self.or()?;
        if self.eat("->") {
            let rhs = self.imply()?;
            return Ok(Expr::imply(lhs, rhs));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut ops = vec![self.and()?];
        while self.eat("||") {
            ops.push(self.and()?);
        }
        Ok(if ops.len() == 1 { ops.remove(0) } else { Expr::Or(ops) })
    }

    fn and(&mut self) -> Result<Expr> {
        let mut ops = vec![self.cmp()?];
        while self.eat("&&") {
            ops.push(self.cmp()?);
        }
        Ok(if ops.len() == 1 { ops.remove(0) } else { Expr::And(ops) })
    }

    fn cmp(&mut self) -> Result<Expr> {
        let lhs = self.sum()?;
        let op: fn(Expr, Expr) -> Expr = match self.peek() {
            Some(Token::Sym("=")) => Expr::eq,
            Some(Token::Sym("!=")) => Expr::neq,
            Some(Token::Sym("<")) => Expr::lt,
            Some(Token::Sym("<=")) => Expr::leq,
            Some(Token::Sym(">")) => Expr::gt,
            Some(Token::Sym(">=")) => Expr::geq,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.sum()?;
        Ok(op(lhs, rhs))
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut terms = vec![self.prod()?];
        loop {
            if self.eat("+") {
                terms.push(self.prod()?);
            } else if self.eat("-") {
                let rhs = self.prod()?;
                let lhs = Expr::add(std::mem::take(&mut terms));
                terms.push(Expr::sub(lhs, rhs));
            } else {
                return Ok(Expr::add(terms));
            }
        }
    }

    fn prod(&mut self) -> Result<Expr> {
        let mut factors = vec![self.unary()?];
        while self.eat("*") {
            factors.push(self.unary()?);
        }
        Ok(Expr::mul(factors))
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat("!") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat("-") {
            if let Some(Token::Int(n)) = self.peek() {
                let n = -*n;
                self.pos += 1;
                return Ok(Expr::int(n));
            }
            return Ok(Expr::neg(self.unary()?));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression".into()))?;
        self.pos += 1;
        match token {
            Token::Int(n) => Ok(Expr::int(n)),
            Token::Ident(name) if name == "true" => Ok(Expr::bool(true)),
            Token::Ident(name) if name == "false" => Ok(Expr::bool(false)),
            Token::Ident(name) => Ok(self.var(&name)?.expr()),
            Token::Primed(name) => Ok(self.var(&name)?.prime()),
            Token::Sym("(") => {
                let inner = self.imply()?;
                if !self.eat(")") {
                    return Err(self.error("expected `)`".into()));
                }
                Ok(inner)
            }
            other => Err(self.error(format!("unexpected `{other}`"))),
        }
    }

    fn var(&self, name: &str) -> Result<&Var> {
        self.vars
            .get(name)
            .copied()
            .ok_or_else(|| self.error(format!("undeclared variable `{name}`")))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    const COUNTER: &str = "
        # two counters
        var x : int
        var y : int
        init x = 0 && y = 0
        trans x' = x + 1 && y' = y
            || x' = x && y' = y + 1
        prop !(y = 1)
    ";

    #[test]
    fn test_parse_sts() {
        let sts: Sts = COUNTER.parse().unwrap();
        let x = Var::int("x");
        let y = Var::int("y");
        assert_eq!(sts.vars().len(), 2);
        assert_eq!(
            sts.init(),
            &Expr::And(vec![Expr::eq(x.expr(), Expr::int(0)), Expr::eq(y.expr(), Expr::int(0))])
        );
        assert_eq!(sts.prop(), &Expr::not(Expr::eq(y.expr(), Expr::int(1))));
        assert!(matches!(sts.trans(), Expr::Or(ops) if ops.len() == 2));
    }

    #[test]
    fn test_display_round_trip() {
        let sts: Sts = COUNTER.parse().unwrap();
        let reparsed: Sts = sts.to_string().parse().unwrap();
        assert_eq!(reparsed.init(), sts.init());
        assert_eq!(reparsed.trans(), sts.trans());
        assert_eq!(reparsed.prop(), sts.prop());
    }

    #[test]
    fn test_precedence() {
        let x = Var::int("x");
        let b = Var::bool("b");
        let vars = BTreeSet::from([x.clone(), b.clone()]);
        let e = parse_expr("b -> x - 1 - 2 >= -3 * x", &vars).unwrap();
        let expected = Expr::imply(
            b.expr(),
            Expr::geq(
                Expr::sub(Expr::sub(x.expr(), Expr::int(1)), Expr::int(2)),
                Expr::mul([Expr::int(-3), x.expr()]),
            ),
        );
        assert_eq!(e, expected);
        assert_eq!(parse_expr("!b && x != 0", &vars).unwrap().to_string(), "!b && !(x = 0)");
    }

    #[test]
    fn test_errors() {
        let err = "var x : int\ninit y = 0".parse::<Sts>().unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
        let err = "var x : real".parse::<Sts>().unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
        let err = "x = 0".parse::<Sts>().unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
        let err = "var x : int\nprop (x = 0".parse::<Sts>().unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
        let err = "var x : int\nprop x + 1".parse::<Sts>().unwrap_err();
        assert!(matches!(err, Error::Sort(_)));
    }
}
