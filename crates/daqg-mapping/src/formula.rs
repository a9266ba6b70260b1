//! Restricted single-variable arithmetic expression parser (§9 "Formula
//! transform"). Grammar: literals, `+ - * / ( )`, and exactly one variable
//! name. No host-language evaluator, no other identifiers, no side effects.

use crate::error::MappingError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, MappingError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| MappingError::InvalidFormula(format!("bad number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            }
            other => {
                return Err(MappingError::InvalidFormula(format!(
                    "unexpected character '{other}'"
                )))
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(f64),
    Var,
    BinOp(Box<Expr>, Op, Box<Expr>),
    Neg(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// A parsed, validated formula. Construction (`parse`) is the place where
/// "reject anything else at rule-load time" (§9) happens.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expr,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    var_name: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    // expr := term (( '+' | '-' ) term)*
    fn parse_expr(&mut self) -> Result<Expr, MappingError> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    let rhs = self.parse_term()?;
                    lhs = Expr::BinOp(Box::new(lhs), Op::Add, Box::new(rhs));
                }
                Some(Token::Minus) => {
                    self.next();
                    let rhs = self.parse_term()?;
                    lhs = Expr::BinOp(Box::new(lhs), Op::Sub, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    // term := factor (( '*' | '/' ) factor)*
    fn parse_term(&mut self) -> Result<Expr, MappingError> {
        let mut lhs = self.parse_factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    let rhs = self.parse_factor()?;
                    lhs = Expr::BinOp(Box::new(lhs), Op::Mul, Box::new(rhs));
                }
                Some(Token::Slash) => {
                    self.next();
                    let rhs = self.parse_factor()?;
                    lhs = Expr::BinOp(Box::new(lhs), Op::Div, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    // factor := '-' factor | number | ident | '(' expr ')'
    fn parse_factor(&mut self) -> Result<Expr, MappingError> {
        match self.next().cloned() {
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.parse_factor()?))),
            Some(Token::Number(n)) => Ok(Expr::Literal(n)),
            Some(Token::Ident(name)) => {
                if name == self.var_name {
                    Ok(Expr::Var)
                } else {
                    Err(MappingError::InvalidFormula(format!(
                        "unknown identifier '{name}'"
                    )))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(MappingError::InvalidFormula("expected ')'".into())),
                }
            }
            other => Err(MappingError::InvalidFormula(format!(
                "unexpected token: {other:?}"
            ))),
        }
    }
}

impl Formula {
    /// Parses `src` treating `var_name` as the single permitted identifier.
    pub fn parse(src: &str, var_name: &str) -> Result<Self, MappingError> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(MappingError::InvalidFormula("empty expression".into()));
        }
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            var_name,
        };
        let expr = parser.parse_expr()?;
        if parser.pos != tokens.len() {
            return Err(MappingError::InvalidFormula(
                "trailing tokens after expression".into(),
            ));
        }
        Ok(Formula { expr })
    }

    pub fn eval(&self, x: f64) -> f64 {
        eval_expr(&self.expr, x)
    }
}

fn eval_expr(expr: &Expr, x: f64) -> f64 {
    match expr {
        Expr::Literal(n) => *n,
        Expr::Var => x,
        Expr::Neg(inner) => -eval_expr(inner, x),
        Expr::BinOp(lhs, op, rhs) => {
            let l = eval_expr(lhs, x);
            let r = eval_expr(rhs, x);
            match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => l / r,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fahrenheit_formula_matches_expected_value() {
        let formula = Formula::parse("x * 9/5 + 32", "x").unwrap();
        assert!((formula.eval(100.0) - 212.0).abs() < 1e-9);
    }

    #[test]
    fn parenthesized_expression_respects_precedence() {
        let formula = Formula::parse("(x + 2) * 3", "x").unwrap();
        assert!((formula.eval(1.0) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_identifier_is_rejected_at_parse_time() {
        assert!(Formula::parse("x + y", "x").is_err());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(Formula::parse("x + 1 2", "x").is_err());
    }
}
