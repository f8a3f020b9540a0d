//! Pratt parser (precedence climbing) for model formulas.
//!
//! Identifiers are resolved while parsing: variables become input slots,
//! `pi` and `e` become literals, anything else is an error. A formula that
//! parses can therefore never hit an unresolved reference at evaluation time.

use super::lexer::{tokenize, Spanned, Token};
use super::{BinaryOp, Expr, Function, ParseError, UnaryOp};

/// Maximum nesting depth of parentheses, calls and unary operators.
pub const MAX_DEPTH: usize = 64;

/// Binding power of unary minus: tighter than `*`, looser than `^`.
const UNARY_PREC: u8 = 40;

/// Operator associativity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

/// Binary operator metadata: (precedence, associativity, op).
///
/// Higher precedence binds tighter.
fn binary_op_info(token: &Token) -> Option<(u8, Assoc, BinaryOp)> {
    match token {
        Token::Lt => Some((10, Assoc::Left, BinaryOp::Lt)),
        Token::LtEq => Some((10, Assoc::Left, BinaryOp::Le)),
        Token::Gt => Some((10, Assoc::Left, BinaryOp::Gt)),
        Token::GtEq => Some((10, Assoc::Left, BinaryOp::Ge)),
        Token::EqEq => Some((10, Assoc::Left, BinaryOp::Eq)),
        Token::BangEq => Some((10, Assoc::Left, BinaryOp::Ne)),
        Token::Plus => Some((20, Assoc::Left, BinaryOp::Add)),
        Token::Minus => Some((20, Assoc::Left, BinaryOp::Sub)),
        Token::Star => Some((30, Assoc::Left, BinaryOp::Mul)),
        Token::Slash => Some((30, Assoc::Left, BinaryOp::Div)),
        Token::Percent => Some((30, Assoc::Left, BinaryOp::Mod)),
        Token::Caret => Some((50, Assoc::Right, BinaryOp::Pow)),
        _ => None,
    }
}

/// Parse `source`, resolving identifiers against `variables` (slot = index).
///
/// # Errors
///
/// Returns a [`ParseError`] describing the first problem found.
///
/// # Example
///
/// ```rust
/// use mcsim::model::expr::parse;
///
/// let expr = parse("price * quantity - 100", &["price", "quantity"]).unwrap();
/// assert_eq!(expr.eval(&[5.0, 30.0]).unwrap(), 50.0);
/// ```
pub fn parse<S: AsRef<str>>(source: &str, variables: &[S]) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut stream = TokenStream {
        tokens,
        pos: 0,
        depth: 0,
        variables: variables.iter().map(|v| v.as_ref()).collect(),
    };

    let expr = stream.parse_pratt(0)?;
    match stream.peek_spanned() {
        None => Ok(expr),
        Some(extra) => Err(ParseError::UnexpectedToken {
            expected: "operator or end of formula".to_string(),
            found: extra.token.to_string(),
            pos: extra.pos,
        }),
    }
}

struct TokenStream<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    variables: Vec<&'a str>,
}

impl TokenStream<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn expect(&mut self, want: &Token, expected: &str) -> Result<(), ParseError> {
        match self.advance() {
            Some(s) if &s.token == want => Ok(()),
            Some(s) => Err(ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: s.token.to_string(),
                pos: s.pos,
            }),
            None => Err(ParseError::UnexpectedEnd {
                expected: expected.to_string(),
            }),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Binary operators with precedence climbing.
    fn parse_pratt(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix()?;

        while let Some((prec, assoc, op)) = self.peek().and_then(binary_op_info) {
            if prec < min_prec {
                break;
            }
            self.advance();

            let next_prec = if assoc == Assoc::Left { prec + 1 } else { prec };
            self.enter()?;
            let right = self.parse_pratt(next_prec)?;
            self.leave();

            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            self.enter()?;
            let operand = self.parse_pratt(UNARY_PREC)?;
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let Some(Spanned { token, pos }) = self.advance() else {
            return Err(ParseError::UnexpectedEnd {
                expected: "expression".to_string(),
            });
        };

        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::LParen => {
                self.enter()?;
                let inner = self.parse_pratt(0)?;
                self.expect(&Token::RParen, "')'")?;
                self.leave();
                Ok(inner)
            }
            Token::Ident(name) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.parse_call(&name, pos)
                } else {
                    self.resolve(&name, pos)
                }
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: other.to_string(),
                pos,
            }),
        }
    }

    fn resolve(&self, name: &str, pos: usize) -> Result<Expr, ParseError> {
        if let Some(slot) = self.variables.iter().position(|v| *v == name) {
            return Ok(Expr::Var(slot));
        }
        match name {
            "pi" => Ok(Expr::Number(std::f64::consts::PI)),
            "e" => Ok(Expr::Number(std::f64::consts::E)),
            _ => Err(ParseError::UnknownVariable {
                name: name.to_string(),
                pos,
            }),
        }
    }

    fn parse_call(&mut self, name: &str, pos: usize) -> Result<Expr, ParseError> {
        let func = Function::from_name(name).ok_or_else(|| ParseError::UnknownFunction {
            name: name.to_string(),
            pos,
        })?;

        self.expect(&Token::LParen, "'('")?;
        self.enter()?;
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.advance();
        } else {
            loop {
                args.push(self.parse_pratt(0)?);
                match self.advance() {
                    Some(Spanned {
                        token: Token::Comma,
                        ..
                    }) => {}
                    Some(Spanned {
                        token: Token::RParen,
                        ..
                    }) => break,
                    Some(s) => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "',' or ')'".to_string(),
                            found: s.token.to_string(),
                            pos: s.pos,
                        })
                    }
                    None => {
                        return Err(ParseError::UnexpectedEnd {
                            expected: "',' or ')'".to_string(),
                        })
                    }
                }
            }
        }
        self.leave();

        func.check_arity(args.len())?;
        Ok(Expr::Call { func, args })
    }
}
