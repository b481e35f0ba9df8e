// SPDX-License-Identifier: MIT

//! Tokenizer for the expression language

use crate::adk::error::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    /// Double-quoted string, `""` unescaped to `"`
    String(String),
    /// Identifier or dotted path; keywords are resolved by the parser
    Ident(String),
    LParen,
    RParen,
    Comma,
    Eq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,
    Amp,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    AndAnd,
    OrOr,
}

/// A token and the character offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '=' => {
                // `==` is accepted as an alias of `=`
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                }
                Token::Eq
            }
            '<' => match chars.get(i + 1) {
                Some('>') => {
                    i += 1;
                    Token::NotEq
                }
                Some('=') => {
                    i += 1;
                    Token::Lte
                }
                _ => Token::Lt,
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                    Token::Gte
                } else {
                    Token::Gt
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    i += 1;
                    Token::AndAnd
                } else {
                    Token::Amp
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    i += 1;
                    Token::OrOr
                } else {
                    return Err(ExpressionError::parse(i, "expected '||'"));
                }
            }
            '"' => {
                let (text, end) = read_string(&chars, i)?;
                i = end;
                tokens.push(Spanned {
                    token: Token::String(text),
                    position: start,
                });
                continue;
            }
            c if c.is_ascii_digit() => {
                let (number, end) = read_number(&chars, i)?;
                i = end;
                tokens.push(Spanned {
                    token: Token::Number(number),
                    position: start,
                });
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let (ident, end) = read_ident(&chars, i);
                i = end;
                tokens.push(Spanned {
                    token: Token::Ident(ident),
                    position: start,
                });
                continue;
            }
            other => {
                return Err(ExpressionError::parse(
                    i,
                    format!("unexpected character '{}'", other),
                ))
            }
        };

        i += 1;
        tokens.push(Spanned {
            token,
            position: start,
        });
    }

    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ExpressionError> {
    let mut text = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(ExpressionError::parse(start, "unterminated string")),
            Some('"') if chars.get(i + 1) == Some(&'"') => {
                text.push('"');
                i += 2;
            }
            Some('"') => return Ok((text, i + 1)),
            Some(c) => {
                text.push(*c);
                i += 1;
            }
        }
    }
}

fn read_number(chars: &[char], start: usize) -> Result<(f64, usize), ExpressionError> {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    let text: String = chars[start..i].iter().collect();
    text.parse::<f64>()
        .map(|n| (n, i))
        .map_err(|_| ExpressionError::parse(start, format!("invalid number '{}'", text)))
}

/// Identifiers may contain dots between segments (`Local.items.0`)
fn read_ident(chars: &[char], start: usize) -> (String, usize) {
    let is_part = |c: char| c.is_alphanumeric() || c == '_';
    let mut i = start;
    loop {
        while i < chars.len() && is_part(chars[i]) {
            i += 1;
        }
        if i + 1 < chars.len() && chars[i] == '.' && is_part(chars[i + 1]) {
            i += 1;
            continue;
        }
        break;
    }
    (chars[start..i].iter().collect(), i)
}
