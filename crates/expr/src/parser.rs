use crate::error::{ErrorKind, Result};
use crate::lexer::{Token, tokenize};
use crate::re::{Pattern, ReFunction};
use exn::ResultExt;
use std::sync::Arc;
use trove_record::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub(crate) args: Vec<Expr>,
    pub(crate) kwargs: Vec<(String, Expr)>,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, [Option<Box<Expr>>; 3]),
    Call(Box<Expr>, Call),
    /// `re.<function>(<literal pattern>, ...)`, with the pattern compiled ahead of time.
    Regex(ReFunction, Arc<Pattern>, Call),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional { test: Box<Expr>, body: Box<Expr>, orelse: Box<Expr> },
}

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "is", "if", "else", "True", "False", "None"];

pub(crate) fn parse(source: &str) -> Result<Expr> {
    let mut parser = Parser { tokens: tokenize(source)?, pos: 0 };
    if parser.tokens.is_empty() {
        exn::bail!(ErrorKind::Syntax("empty expression".to_string()));
    }
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        exn::bail!(ErrorKind::Syntax(format!("unexpected {}", describe(token))));
    }
    Ok(expr)
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(i) => format!("number {i}"),
        Token::Float(f) => format!("number {f}"),
        Token::Str(s) => format!("string {s:?}"),
        Token::Name(n) => format!("name '{n}'"),
        Token::Op(op) => format!("'{op}'"),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_op(&self, op: &str) -> bool {
        matches!(self.peek(), Some(Token::Op(o)) if *o == op)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == keyword)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let found = self.peek_op(op);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            return Ok(());
        }
        let found = self.peek().map_or_else(|| "end of expression".to_string(), describe);
        exn::bail!(ErrorKind::Syntax(format!("expected '{op}', found {found}")))
    }

    fn expression(&mut self) -> Result<Expr> {
        let body = self.or_expr()?;
        if !self.eat_keyword("if") {
            return Ok(body);
        }
        let test = self.or_expr()?;
        if !self.eat_keyword("else") {
            exn::bail!(ErrorKind::Syntax("conditional expression without 'else'".to_string()));
        }
        let orelse = self.expression()?;
        Ok(Expr::Conditional { test: Box::new(test), body: Box::new(body), orelse: Box::new(orelse) })
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            left = Expr::And(Box::new(left), Box::new(self.not_expr()?));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() { Ok(first) } else { Ok(Expr::Compare(Box::new(first), rest)) }
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek()? {
            Token::Op("==") => CompareOp::Eq,
            Token::Op("!=") => CompareOp::Ne,
            Token::Op("<") => CompareOp::Lt,
            Token::Op("<=") => CompareOp::Le,
            Token::Op(">") => CompareOp::Gt,
            Token::Op(">=") => CompareOp::Ge,
            Token::Name(n) if n == "in" => CompareOp::In,
            Token::Name(n) if n == "is" => {
                self.pos += 1;
                return Some(if self.eat_keyword("not") { CompareOp::IsNot } else { CompareOp::Is });
            },
            Token::Name(n) if n == "not" => {
                if !matches!(self.tokens.get(self.pos + 1), Some(Token::Name(n)) if n == "in") {
                    return None;
                }
                self.pos += 2;
                return Some(CompareOp::NotIn);
            },
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinaryOp::Add
            } else if self.eat_op("-") {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("*")) => BinaryOp::Mul,
                Some(Token::Op("/")) => BinaryOp::Div,
                Some(Token::Op("//")) => BinaryOp::FloorDiv,
                Some(Token::Op("%")) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.factor()?));
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        if self.eat_op("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.factor()?)));
        }
        if self.eat_op("+") {
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.factor()?)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            // Right-associative, and binds tighter than a unary minus on its left.
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(self.factor()?)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                match self.tokens.get(self.pos) {
                    Some(Token::Name(name)) => {
                        expr = Expr::Attr(Box::new(expr), name.clone());
                        self.pos += 1;
                    },
                    _ => exn::bail!(ErrorKind::Syntax("expected attribute name after '.'".to_string())),
                }
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else if self.eat_op("(") {
                let call = self.call_args()?;
                expr = precompile_regex(expr, call)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn subscript(&mut self, target: Expr) -> Result<Expr> {
        let mut parts: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut index = 0;
        let mut is_slice = false;
        loop {
            if self.eat_op("]") {
                break;
            }
            if self.eat_op(":") {
                is_slice = true;
                index += 1;
                if index > 2 {
                    exn::bail!(ErrorKind::Syntax("too many ':' in slice".to_string()));
                }
                continue;
            }
            if parts[index].is_some() {
                exn::bail!(ErrorKind::Syntax("expected ']' or ':' in subscript".to_string()));
            }
            parts[index] = Some(Box::new(self.expression()?));
        }
        if is_slice {
            return Ok(Expr::Slice(Box::new(target), parts));
        }
        match parts {
            [Some(key), None, None] => Ok(Expr::Index(Box::new(target), key)),
            _ => exn::bail!(ErrorKind::Syntax("empty subscript".to_string())),
        }
    }

    fn call_args(&mut self) -> Result<Call> {
        let mut call = Call { args: Vec::new(), kwargs: Vec::new() };
        while !self.eat_op(")") {
            let keyword = match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
                (Some(Token::Name(name)), Some(Token::Op("="))) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.pos += 2;
                call.kwargs.push((name, self.expression()?));
            } else if call.kwargs.is_empty() {
                call.args.push(self.expression()?);
            } else {
                exn::bail!(ErrorKind::Syntax("positional argument follows keyword argument".to_string()));
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok(call)
    }

    /// Parses comma-separated items up to `close`, returning them and whether
    /// a comma was seen (which distinguishes `(a,)` from `(a)`).
    fn sequence(&mut self, close: &str) -> Result<(Vec<Expr>, bool)> {
        let mut items = Vec::new();
        let mut comma = false;
        while !self.eat_op(close) {
            items.push(self.expression()?);
            if self.eat_op(",") {
                comma = true;
            } else {
                self.expect_op(close)?;
                break;
            }
        }
        Ok((items, comma))
    }

    fn atom(&mut self) -> Result<Expr> {
        let Some(token) = self.tokens.get(self.pos).cloned() else {
            exn::bail!(ErrorKind::Syntax("unexpected end of expression".to_string()));
        };
        self.pos += 1;
        match token {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(mut s) => {
                // Adjacent string literals concatenate.
                while let Some(Token::Str(next)) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::String(s)))
            },
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Literal(Value::Bool(true))),
                "False" => Ok(Expr::Literal(Value::Bool(false))),
                "None" => Ok(Expr::Literal(Value::Null)),
                keyword if KEYWORDS.contains(&keyword) => {
                    exn::bail!(ErrorKind::Syntax(format!("unexpected keyword '{keyword}'")))
                },
                _ => Ok(Expr::Name(name)),
            },
            Token::Op("(") => {
                let (mut items, comma) = self.sequence(")")?;
                if items.len() == 1 && !comma {
                    return Ok(items.remove(0));
                }
                Ok(Expr::List(items))
            },
            Token::Op("[") => Ok(Expr::List(self.sequence("]")?.0)),
            other => exn::bail!(ErrorKind::Syntax(format!("unexpected {}", describe(&other)))),
        }
    }
}

/// Turns `re.func('literal', ...)` into a call with a pre-built pattern, so
/// the regex is compiled once instead of on every evaluation.
fn precompile_regex(callee: Expr, mut call: Call) -> Result<Expr> {
    let function = match &callee {
        Expr::Attr(module, name) if matches!(module.as_ref(), Expr::Name(m) if m == "re") => ReFunction::from_name(name),
        _ => None,
    };
    let source = match call.args.first() {
        Some(Expr::Literal(Value::String(source))) => Some(source.clone()),
        _ => None,
    };
    match (function, source) {
        (Some(function), Some(source)) => {
            call.args.remove(0);
            let pattern =
                Pattern::new(&source).or_raise(|| ErrorKind::Syntax(format!("invalid regular expression {source:?}")))?;
            Ok(Expr::Regex(function, Arc::new(pattern), call))
        },
        _ => Ok(Expr::Call(Box::new(callee), call)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a and b or c")]
    #[case("not a == 1")]
    #[case("x if y else z")]
    #[case("a[1:2]")]
    #[case("a[::-1]")]
    #[case("f(1, b=2)")]
    #[case("(1,)")]
    #[case("'a' 'b'")]
    #[case("x not in y")]
    #[case("x is not None")]
    fn test_parse_ok(#[case] source: &str) {
        assert!(parse(source).is_ok(), "{source}");
    }

    #[rstest]
    #[case("")]
    #[case("a +")]
    #[case("(a")]
    #[case("a b")]
    #[case("x if y")]
    #[case("f(a=1, 2)")]
    #[case("a[]")]
    #[case("re.search('(', s)")]
    fn test_parse_error(#[case] source: &str) {
        let err = parse(source).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Syntax(_)), "{source}");
    }

    #[test]
    fn test_regex_literal_precompiled() {
        assert!(matches!(parse(r"re.match(r'\d+', title)").unwrap(), Expr::Regex(ReFunction::Match, _, _)));
        assert!(matches!(parse("re.match(pattern, title)").unwrap(), Expr::Call(_, _)));
    }

    #[test]
    fn test_power_binds_tighter_than_negation() {
        let Expr::Unary(UnaryOp::Neg, inner) = parse("-2 ** 2").unwrap() else {
            panic!("expected negation at the root");
        };
        assert!(matches!(*inner, Expr::Binary(BinaryOp::Pow, _, _)));
    }
}
