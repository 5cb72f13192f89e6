// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tokenizer for the script dialect.

use crate::error::{Result, ScriptError};

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Number(f64),
    True,
    False,
    Null,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Semi,
    Dot,
    Assign,
    EqEq,
    NotEq,
    Newline,
    Eof,
}

/// A token with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Tokenize a source string. Comments run from `#` to end of line and a
/// newline token is emitted per line break so the parser can use line ends
/// as statement terminators.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut line = 1;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            ' ' | '\t' | '\r' => pos += 1,
            '\n' => {
                tokens.push(Token { kind: TokenKind::Newline, line });
                line += 1;
                pos += 1;
            }
            '#' => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            '{' => { tokens.push(Token { kind: TokenKind::LBrace, line }); pos += 1; }
            '}' => { tokens.push(Token { kind: TokenKind::RBrace, line }); pos += 1; }
            '[' => { tokens.push(Token { kind: TokenKind::LBracket, line }); pos += 1; }
            ']' => { tokens.push(Token { kind: TokenKind::RBracket, line }); pos += 1; }
            '(' => { tokens.push(Token { kind: TokenKind::LParen, line }); pos += 1; }
            ')' => { tokens.push(Token { kind: TokenKind::RParen, line }); pos += 1; }
            ',' => { tokens.push(Token { kind: TokenKind::Comma, line }); pos += 1; }
            ':' => { tokens.push(Token { kind: TokenKind::Colon, line }); pos += 1; }
            ';' => { tokens.push(Token { kind: TokenKind::Semi, line }); pos += 1; }
            '.' => { tokens.push(Token { kind: TokenKind::Dot, line }); pos += 1; }
            '=' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::EqEq, line });
                    pos += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Assign, line });
                    pos += 1;
                }
            }
            '!' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::NotEq, line });
                    pos += 2;
                } else {
                    return Err(ScriptError::Syntax {
                        line,
                        message: "unexpected character '!'".into(),
                    });
                }
            }
            '\'' | '"' => {
                let (value, consumed) = read_string(&chars, pos, line)?;
                tokens.push(Token { kind: TokenKind::Str(value), line });
                pos += consumed;
            }
            '-' => {
                if chars.get(pos + 1).map_or(false, |c| c.is_ascii_digit()) {
                    let (value, consumed) = read_number(&chars, pos, line)?;
                    tokens.push(Token { kind: TokenKind::Number(value), line });
                    pos += consumed;
                } else {
                    return Err(ScriptError::Syntax {
                        line,
                        message: "unexpected character '-'".into(),
                    });
                }
            }
            c if c.is_ascii_digit() => {
                let (value, consumed) = read_number(&chars, pos, line)?;
                tokens.push(Token { kind: TokenKind::Number(value), line });
                pos += consumed;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len()
                    && (chars[pos].is_alphanumeric() || chars[pos] == '_')
                {
                    pos += 1;
                }
                let word: String = chars[start..pos].iter().collect();
                let kind = match word.as_str() {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    _ => TokenKind::Ident(word),
                };
                tokens.push(Token { kind, line });
            }
            other => {
                return Err(ScriptError::Syntax {
                    line,
                    message: format!("unexpected character {:?}", other),
                });
            }
        }
    }

    tokens.push(Token { kind: TokenKind::Eof, line });
    Ok(tokens)
}

/// Read a quoted string starting at `pos`. Returns the unescaped value and
/// the number of characters consumed including both quotes.
fn read_string(chars: &[char], pos: usize, line: usize) -> Result<(String, usize)> {
    let quote = chars[pos];
    let mut value = String::new();
    let mut i = pos + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars.get(i + 1).ok_or_else(|| ScriptError::Syntax {
                    line,
                    message: "unterminated string escape".into(),
                })?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '\\' => '\\',
                    '\'' => '\'',
                    '"' => '"',
                    other => {
                        return Err(ScriptError::Syntax {
                            line,
                            message: format!("unknown string escape '\\{}'", other),
                        })
                    }
                });
                i += 2;
            }
            '\n' => {
                return Err(ScriptError::Syntax {
                    line,
                    message: "unterminated string literal".into(),
                })
            }
            c if c == quote => return Ok((value, i - pos + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(ScriptError::Syntax {
        line,
        message: "unterminated string literal".into(),
    })
}

/// Read a number literal (optional leading minus, optional fraction).
fn read_number(chars: &[char], pos: usize, line: usize) -> Result<(f64, usize)> {
    let mut i = pos;
    if chars[i] == '-' {
        i += 1;
    }
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len()
        && chars[i] == '.'
        && chars.get(i + 1).map_or(false, |c| c.is_ascii_digit())
    {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    let text: String = chars[pos..i].iter().collect();
    let value = text.parse::<f64>().map_err(|_| ScriptError::Syntax {
        line,
        message: format!("invalid number literal {:?}", text),
    })?;
    Ok((value, i - pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_assignment() {
        assert_eq!(
            kinds("x = 1"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Number(1.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            kinds(r#"s = 'a\'b'"#),
            vec![
                TokenKind::Ident("s".into()),
                TokenKind::Assign,
                TokenKind::Str("a'b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_do_not_produce_tokens() {
        assert_eq!(
            kinds("# nodepy-extensions: foo\nx = 2"),
            vec![
                TokenKind::Newline,
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_numbers_advance() {
        let tokens = tokenize("a = 1\nb = 2").unwrap();
        assert_eq!(tokens.first().unwrap().line, 1);
        assert_eq!(tokens.last().unwrap().line, 2);
    }

    #[test]
    fn negative_numbers() {
        assert_eq!(kinds("x = -2.5")[2], TokenKind::Number(-2.5));
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(kinds("a == b")[1], TokenKind::EqEq);
        assert_eq!(kinds("a != b")[1], TokenKind::NotEq);
    }
}
