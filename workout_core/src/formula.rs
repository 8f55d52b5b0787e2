//! Arithmetic evaluator for progression formulas.
//!
//! Supports `+ - * / ^`, unary minus, parentheses, decimal literals and
//! single-letter variables. Exponentiation is right-associative and binds
//! tighter than unary minus, so `-2^2` is `-4`.

use crate::error::EvaluationError;
use std::collections::HashMap;

/// Variable bindings keyed by their single lowercase letter.
pub type Variables = HashMap<char, f64>;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Var(char),
    Op(char),
    LParen,
    RParen,
}

/// Evaluate `formula` against `variables`.
pub fn evaluate(formula: &str, variables: &Variables) -> Result<f64, EvaluationError> {
    let tokens = tokenize(formula)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        variables,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(EvaluationError::Malformed(format!(
            "unexpected {:?} at token {}",
            token, parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(EvaluationError::NonFinite);
    }
    Ok(value)
}

fn tokenize(formula: &str) -> Result<Vec<Token>, EvaluationError> {
    let chars: Vec<char> = formula.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
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
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| EvaluationError::Malformed(format!("bad number '{}'", literal)))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                // A variable is a whole token; `rw` is not `r` followed by `w`.
                if i - start != 1 {
                    let word: String = chars[start..i].iter().collect();
                    return Err(EvaluationError::Malformed(format!(
                        "unknown identifier '{}'",
                        word
                    )));
                }
                tokens.push(Token::Var(c.to_ascii_lowercase()));
            }
            other => {
                return Err(EvaluationError::Malformed(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }

    if tokens.is_empty() {
        return Err(EvaluationError::Malformed("empty expression".into()));
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    variables: &'a Variables,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<f64, EvaluationError> {
        let mut value = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, EvaluationError> {
        let mut value = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/']) {
            let rhs = self.unary()?;
            value = if op == '*' { value * rhs } else { value / rhs };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, EvaluationError> {
        match self.eat_op(&['-', '+']) {
            Some('-') => Ok(-self.unary()?),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, EvaluationError> {
        let base = self.primary()?;
        if self.eat_op(&['^']).is_some() {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, EvaluationError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Var(name)) => self
                .variables
                .get(&name)
                .copied()
                .ok_or(EvaluationError::UndefinedVariable(name)),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(EvaluationError::Malformed("missing ')'".into())),
                }
            }
            Some(token) => Err(EvaluationError::Malformed(format!(
                "unexpected {:?}",
                token
            ))),
            None => Err(EvaluationError::Malformed("unexpected end of expression".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(char, f64)]) -> Variables {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let v = Variables::new();
        assert_eq!(evaluate("1 + 2 * 3", &v).unwrap(), 7.0);
        assert_eq!(evaluate("(1 + 2) * 3", &v).unwrap(), 9.0);
        assert_eq!(evaluate("10 / 4 - 1", &v).unwrap(), 1.5);
        assert_eq!(evaluate("8 - 3 - 2", &v).unwrap(), 3.0);
    }

    #[test]
    fn test_exponent_is_right_associative() {
        let v = Variables::new();
        assert_eq!(evaluate("2^3^2", &v).unwrap(), 512.0);
        assert_eq!(evaluate("-2^2", &v).unwrap(), -4.0);
        assert_eq!(evaluate("2^-1", &v).unwrap(), 0.5);
    }

    #[test]
    fn test_variables() {
        let v = vars(&[('w', 70.0), ('r', 10.0)]);
        assert_eq!(evaluate("w+2.5", &v).unwrap(), 72.5);
        assert_eq!(evaluate("w * 1.1 + r", &v).unwrap(), 87.0);
        assert_eq!(evaluate("R+1", &v).unwrap(), 11.0);
    }

    #[test]
    fn test_variable_is_whole_token() {
        let v = vars(&[('r', 10.0), ('w', 1.0)]);
        assert!(matches!(
            evaluate("rw+1", &v),
            Err(EvaluationError::Malformed(_))
        ));
    }

    #[test]
    fn test_undefined_variable() {
        let v = vars(&[('r', 10.0)]);
        assert_eq!(
            evaluate("w+2.5", &v),
            Err(EvaluationError::UndefinedVariable('w'))
        );
    }

    #[test]
    fn test_malformed_expressions() {
        let v = vars(&[('r', 10.0)]);
        for bad in ["", "r+", "(r+1", "r+1)", "r $ 2", "1..2", "r r"] {
            assert!(
                matches!(evaluate(bad, &v), Err(EvaluationError::Malformed(_))),
                "expected malformed: {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_non_finite_result() {
        let v = vars(&[('r', 0.0)]);
        assert_eq!(evaluate("1/r", &v), Err(EvaluationError::NonFinite));
        assert_eq!(evaluate("0/0", &v), Err(EvaluationError::NonFinite));
    }
}
