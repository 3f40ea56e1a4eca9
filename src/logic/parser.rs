use super::lexer::{tokenize, Token, TokenKind};
use crate::error::{GradeError, GradeResult};
use crate::model::{AssessmentKind, Term};
use std::fmt;

pub const MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Avg,
    Min,
    Max,
    Sum,
}

impl Aggregate {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "avg" => Some(Aggregate::Avg),
            "min" => Some(Aggregate::Min),
            "max" => Some(Aggregate::Max),
            "sum" => Some(Aggregate::Sum),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

/// A parsed `@...` token. Unset fields are taken from the requesting assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub raw: String,
    pub term: Option<Term>,
    pub subject: Option<String>,
    pub kind: Option<AssessmentKind>,
    pub number: i64,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.raw)
    }
}

impl Reference {
    pub fn parse(body: &str) -> GradeResult<Self> {
        let parts: Vec<&str> = body.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(GradeError::invalid(format!("malformed reference @{}", body)));
        }

        let parse_number = |s: &str| -> GradeResult<i64> {
            s.parse::<i64>()
                .ok()
                .filter(|n| *n >= 0)
                .ok_or_else(|| {
                    GradeError::invalid(format!("bad assessment number '{}' in @{}", s, body))
                })
        };
        let parse_kind = |s: &str| -> GradeResult<AssessmentKind> {
            AssessmentKind::parse(s).ok_or_else(|| {
                GradeError::invalid(format!("unknown assessment type '{}' in @{}", s, body))
            })
        };
        let parse_term = |s: &str| -> GradeResult<Term> {
            Term::parse(s)
                .ok_or_else(|| GradeError::invalid(format!("unknown term '{}' in @{}", s, body)))
        };

        let (term, subject, kind, number) = match parts.as_slice() {
            [n] => (None, None, None, parse_number(*n)?),
            [k, n] => (None, None, Some(parse_kind(*k)?), parse_number(*n)?),
            [t, k, n] => (
                Some(parse_term(*t)?),
                None,
                Some(parse_kind(*k)?),
                parse_number(*n)?,
            ),
            [t, s, k, n] => (
                Some(parse_term(*t)?),
                Some((*s).to_string()),
                Some(parse_kind(*k)?),
                parse_number(*n)?,
            ),
            _ => {
                return Err(GradeError::invalid(format!(
                    "reference @{} has more than four parts",
                    body
                )))
            }
        };

        Ok(Reference {
            raw: body.to_string(),
            term,
            subject,
            kind,
            number,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Reference(Reference),
    Call { func: Aggregate, args: Vec<Expr> },
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Expr::Number(_) => {}
            Expr::Reference(r) => out.push(r),
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_references(out)),
            Expr::Neg(e) => e.collect_references(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_references(out);
                rhs.collect_references(out);
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

pub fn parse(input: &str) -> GradeResult<Expr> {
    let tokens = tokenize(input)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    if p.peek() == &TokenKind::Eof {
        return Err(GradeError::invalid("empty expression"));
    }
    let expr = p.expression()?;
    if p.peek() != &TokenKind::Eof {
        return Err(p.unexpected("end of expression"));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn unexpected(&self, expected: &str) -> GradeError {
        GradeError::invalid(format!(
            "expected {}, found {:?} at offset {}",
            expected,
            self.peek(),
            self.offset()
        ))
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> GradeResult<()> {
        if *self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn enter(&mut self) -> GradeResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(GradeError::invalid(format!(
                "expression nested deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> GradeResult<Expr> {
        self.enter()?;
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.leave();
        Ok(lhs)
    }

    // term := unary (('*' | '/' | '//' | '%') unary)*
    fn term(&mut self) -> GradeResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // unary := ('+' | '-') unary | power
    fn unary(&mut self) -> GradeResult<Expr> {
        match self.peek() {
            TokenKind::Minus => {
                self.advance();
                self.enter()?;
                let inner = self.unary()?;
                self.leave();
                Ok(Expr::Neg(Box::new(inner)))
            }
            TokenKind::Plus => {
                self.advance();
                self.enter()?;
                let inner = self.unary()?;
                self.leave();
                Ok(inner)
            }
            _ => self.power(),
        }
    }

    // power := primary ('**' unary)?
    // Right-associative; binds tighter than a unary minus on its left.
    fn power(&mut self) -> GradeResult<Expr> {
        let base = self.primary()?;
        if *self.peek() == TokenKind::DoubleStar {
            self.advance();
            self.enter()?;
            let exponent = self.unary()?;
            self.leave();
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    // primary := NUMBER | REFERENCE | call | '(' expression ')'
    fn primary(&mut self) -> GradeResult<Expr> {
        match self.advance() {
            TokenKind::Number(v) => Ok(Expr::Number(v)),
            TokenKind::Reference(body) => Ok(Expr::Reference(Reference::parse(&body)?)),
            TokenKind::Ident(name) => self.call(&name),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(GradeError::invalid(format!(
                "unexpected {:?} at offset {}",
                other,
                self.offset()
            ))),
        }
    }

    fn call(&mut self, name: &str) -> GradeResult<Expr> {
        let Some(func) = Aggregate::parse(name) else {
            return Err(GradeError::invalid(format!("unknown function '{}'", name)));
        };
        self.expect(TokenKind::LParen, "'(' after function name")?;
        self.enter()?;
        let mut args = vec![self.argument()?];
        while *self.peek() == TokenKind::Comma {
            self.advance();
            args.push(self.argument()?);
        }
        self.expect(TokenKind::RParen, "')' closing function call")?;
        self.leave();
        Ok(Expr::Call { func, args })
    }

    // argument := ['+' | '-'] NUMBER | REFERENCE | call
    fn argument(&mut self) -> GradeResult<Expr> {
        match self.advance() {
            TokenKind::Minus => match self.advance() {
                TokenKind::Number(v) => Ok(Expr::Number(-v)),
                _ => Err(GradeError::invalid(
                    "function arguments must be references or numbers",
                )),
            },
            TokenKind::Plus => match self.advance() {
                TokenKind::Number(v) => Ok(Expr::Number(v)),
                _ => Err(GradeError::invalid(
                    "function arguments must be references or numbers",
                )),
            },
            TokenKind::Number(v) => Ok(Expr::Number(v)),
            TokenKind::Reference(body) => Ok(Expr::Reference(Reference::parse(&body)?)),
            TokenKind::Ident(name) => self.call(&name),
            TokenKind::RParen => Err(GradeError::invalid(
                "function call needs at least one argument",
            )),
            _ => Err(GradeError::invalid(
                "function arguments must be references or numbers",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Box<Expr> {
        Box::new(Expr::Number(v))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let e = parse("1 + 2 * 3").expect("parse");
        assert_eq!(
            e,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: num(1.0),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: num(2.0),
                    rhs: num(3.0),
                }),
            }
        );
    }

    #[test]
    fn power_is_right_associative_and_beats_unary_minus() {
        let e = parse("-2 ** 3 ** 2").expect("parse");
        assert_eq!(
            e,
            Expr::Neg(Box::new(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: num(2.0),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Pow,
                    lhs: num(3.0),
                    rhs: num(2.0),
                }),
            }))
        );
    }

    #[test]
    fn reference_forms_map_to_fields() {
        let r = Reference::parse("7").expect("1 part");
        assert_eq!((r.term, r.kind, r.number), (None, None, 7));

        let r = Reference::parse("exam:2").expect("2 parts");
        assert_eq!(r.kind, Some(AssessmentKind::Exam));
        assert_eq!(r.number, 2);

        let r = Reference::parse("Second:Test:1").expect("3 parts");
        assert_eq!(r.term, Some(Term::Second));

        let r = Reference::parse("Third:Basic_Science:Assignment:3").expect("4 parts");
        assert_eq!(r.subject.as_deref(), Some("Basic_Science"));
        assert_eq!(r.kind, Some(AssessmentKind::Assignment));

        assert!(Reference::parse("Quiz:1").is_err());
        assert!(Reference::parse("Test:x").is_err());
        assert!(Reference::parse("a:b:c:d:e").is_err());
        assert!(Reference::parse("Test:").is_err());
    }

    #[test]
    fn nested_aggregates_parse() {
        let e = parse("sum(avg(@1, @2), 5) / 2").expect("parse");
        assert_eq!(e.references().len(), 2);
    }

    #[test]
    fn rejects_non_grammar_input() {
        for bad in [
            "",
            "1 +",
            "(1 + 2",
            "1 + 2)",
            "avg()",
            "avg(@1 + @2)",
            "eval(1)",
            "open(1)",
            "avg",
            "1 2",
            "@1 @2",
        ] {
            assert!(
                matches!(parse(bad), Err(GradeError::InvalidLogicExpression(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn rejects_excessive_nesting() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(matches!(
            parse(&deep),
            Err(GradeError::InvalidLogicExpression(_))
        ));
    }
}
