//! Precedence-climbing parser for the textual expression form.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | power
//! power   := primary ('**' unary)?
//! primary := number | name | name '(' args ')' | '(' expr ')'
//! cond    := expr ('<' | '<=' | '>' | '>=') expr ('&&' cond)?
//! ```
//!
//! `pi` and `I` are constants. `if(cond, then, else)` builds a piecewise
//! branch; `min`/`max` take two arguments and the remaining functions one.
use num::complex::Complex64;

use super::{
    BinaryOp, CmpOp, Cond, Error, Expr, Result, UnaryOp,
    lexer::{SpannedToken, Token, tokenize},
};

pub fn parse(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(parser.error(format!("unexpected trailing token '{token}'"))),
    }
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self> {
        let tokens = tokenize(source).map_err(|position| Error::Parse {
            position,
            message: "unrecognized character".into(),
        })?;
        Ok(Self {
            tokens,
            pos: 0,
            len: source.len(),
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos)?.token.clone();
        self.pos += 1;
        Some(token)
    }

    fn consume(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.consume(expected) {
            Ok(())
        } else {
            let found = self
                .peek()
                .map_or_else(|| "end of input".to_string(), |t| format!("'{t}'"));
            Err(self.error(format!("expected '{expected}', found {found}")))
        }
    }

    fn error(&self, message: String) -> Error {
        let position = self.tokens.get(self.pos).map_or(self.len, |t| t.span.start);
        Error::Parse { position, message }
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_binary_expr(0)
    }

    fn parse_binary_expr(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.parse_unary_expr()?;

        while let Some(op) = self.peek_binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();

            let right = self.parse_binary_expr(prec + 1)?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        if self.consume(&Token::Minus) {
            let expr = self.parse_unary_expr()?;
            return Ok(Expr::unary(UnaryOp::Neg, expr));
        }
        self.parse_power_expr()
    }

    fn parse_power_expr(&mut self) -> Result<Expr> {
        let base = self.parse_primary_expr()?;
        if self.consume(&Token::Power) {
            let exponent = self.parse_unary_expr()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("unexpected end of input".into()))?;

        match token {
            Token::Number(v) => {
                self.advance();
                Ok(Expr::Const(Complex64::new(v, 0.0)))
            }
            Token::Identifier(name) => {
                self.advance();
                if self.consume(&Token::LParen) {
                    self.parse_call(&name)
                } else {
                    Ok(match name.as_str() {
                        "pi" => Expr::Const(Complex64::new(std::f64::consts::PI, 0.0)),
                        "I" => Expr::Const(Complex64::i()),
                        _ => Expr::Var(name.into()),
                    })
                }
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            _ => Err(self.error(format!("unexpected token '{token}'"))),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr> {
        let expr = if name == "if" {
            let cond = self.parse_condition()?;
            self.expect(&Token::Comma)?;
            let then = self.parse_expression()?;
            self.expect(&Token::Comma)?;
            let otherwise = self.parse_expression()?;
            Expr::piecewise(cond, then, otherwise)
        } else if let Some(op) = binary_function(name) {
            let lhs = self.parse_expression()?;
            self.expect(&Token::Comma)?;
            let rhs = self.parse_expression()?;
            Expr::binary(op, lhs, rhs)
        } else if let Some(op) = unary_function(name) {
            let arg = self.parse_expression()?;
            Expr::unary(op, arg)
        } else {
            return Err(self.error(format!("unknown function '{name}'")));
        };
        self.expect(&Token::RParen)?;
        Ok(expr)
    }

    fn parse_condition(&mut self) -> Result<Cond> {
        let lhs = self.parse_expression()?;
        let op = match self.peek() {
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::LtEq) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::GtEq) => CmpOp::Ge,
            _ => return Err(self.error("expected comparison operator".into())),
        };
        self.advance();
        let rhs = self.parse_expression()?;
        let cond = Cond::compare(op, lhs, rhs);
        if self.consume(&Token::And) {
            let rest = self.parse_condition()?;
            return Ok(cond.and(rest));
        }
        Ok(cond)
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        match self.peek()? {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            _ => None,
        }
    }
}

fn unary_function(name: &str) -> Option<UnaryOp> {
    match name {
        "exp" => Some(UnaryOp::Exp),
        "log" => Some(UnaryOp::Log),
        "sqrt" => Some(UnaryOp::Sqrt),
        "sin" => Some(UnaryOp::Sin),
        "cos" => Some(UnaryOp::Cos),
        "abs" => Some(UnaryOp::Abs),
        _ => None,
    }
}

fn binary_function(name: &str) -> Option<BinaryOp> {
    match name {
        "min" => Some(BinaryOp::Min),
        "max" => Some(BinaryOp::Max),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.into()))
    }

    fn num(v: f64) -> Box<Expr> {
        Box::new(Expr::Const(Complex64::new(v, 0.0)))
    }

    #[test]
    fn left_associative() {
        let expr = parse("a - b - c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(BinaryOp::Sub, var("a"), var("b"))),
                var("c"),
            )
        );
    }

    #[test]
    fn power_binds_tighter_than_negation() {
        let expr = parse("-t**2").unwrap();
        assert_eq!(
            expr,
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(Expr::Binary(BinaryOp::Pow, var("t"), num(2.0))),
            )
        );
    }

    #[test]
    fn power_is_right_associative() {
        let expr = parse("a ** b ** c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Pow,
                var("a"),
                Box::new(Expr::Binary(BinaryOp::Pow, var("b"), var("c"))),
            )
        );
    }

    #[test]
    fn piecewise() {
        let expr = parse("if(0 < t && t < w, a, 0)").unwrap();
        let Expr::Piecewise(cond, then, otherwise) = expr else {
            panic!("expected piecewise");
        };
        assert!(matches!(*cond, Cond::And(_, _)));
        assert_eq!(then, var("a"));
        assert_eq!(otherwise, num(0.0));
    }

    #[test]
    fn constants() {
        assert_eq!(parse("I").unwrap(), Expr::Const(Complex64::i()));
        assert_eq!(parse("pi").unwrap(), *num(std::f64::consts::PI));
    }

    #[test_case("a +"; "dangling operator")]
    #[test_case("(a"; "unclosed paren")]
    #[test_case("foo(a)"; "unknown function")]
    #[test_case("min(a)"; "missing argument")]
    #[test_case("if(a, b, c)"; "missing comparison")]
    #[test_case("a b"; "trailing token")]
    #[test_case("a # b"; "bad character")]
    fn rejects(source: &str) {
        assert!(matches!(parse(source), Err(Error::Parse { .. })));
    }
}
