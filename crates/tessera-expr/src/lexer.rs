//! Tokenizer.

use crate::error::{EvalError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    /// Identifier, possibly dotted (`user.role_id`).
    Ident(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
}

/// A token with the byte offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        let (token, consumed) = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            ',' => (Token::Comma, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '/' => (Token::Slash, 1),
            '=' if next == Some('=') => (Token::Eq, 2),
            '=' => (Token::Eq, 1),
            '!' if next == Some('=') => (Token::Ne, 2),
            '!' => (Token::Not, 1),
            '<' if next == Some('=') => (Token::Le, 2),
            '<' if next == Some('>') => (Token::Ne, 2),
            '<' => (Token::Lt, 1),
            '>' if next == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '&' if next == Some('&') => (Token::And, 2),
            '|' if next == Some('|') => (Token::Or, 2),
            '\'' | '"' => {
                let (text, consumed) = read_string(&chars[i..], c, position)?;
                (Token::Str(text), consumed)
            }
            c if c.is_ascii_digit() => {
                let end = chars[i..]
                    .iter()
                    .position(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
                    .map_or(chars.len(), |offset| i + offset);
                let text: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                let number = text.parse::<f64>().map_err(|_| EvalError::Syntax {
                    position,
                    message: format!("invalid number '{text}'"),
                })?;
                (Token::Number(number), end - i)
            }
            c if c.is_alphabetic() || c == '_' => {
                let end = chars[i..]
                    .iter()
                    .position(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '.'))
                    .map_or(chars.len(), |offset| i + offset);
                let word: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                (keyword(word), end - i)
            }
            other => {
                return Err(EvalError::Syntax {
                    position,
                    message: format!("unexpected character '{other}'"),
                });
            }
        };

        tokens.push(Spanned { token, position });
        i += consumed;
    }

    Ok(tokens)
}

fn keyword(word: String) -> Token {
    match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "NULL" => Token::Null,
        _ => Token::Ident(word),
    }
}

/// Reads a quoted string starting at `chars[0]`. A doubled quote or a
/// backslash escapes the quote character.
fn read_string(chars: &[(usize, char)], quote: char, start: usize) -> Result<(String, usize)> {
    let mut text = String::new();
    let mut i = 1;
    while i < chars.len() {
        let c = chars[i].1;
        let next = chars.get(i + 1).map(|(_, c)| *c);
        if c == '\\' {
            if let Some(escaped) = next {
                text.push(escaped);
                i += 2;
                continue;
            }
        } else if c == quote {
            if next == Some(quote) {
                text.push(quote);
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        } else {
            text.push(c);
        }
        i += 1;
    }
    Err(EvalError::Syntax {
        position: start,
        message: "unterminated string literal".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            kinds("a >= 1 and not b <> 'x'"),
            vec![
                Token::Ident("a".into()),
                Token::Ge,
                Token::Number(1.0),
                Token::And,
                Token::Not,
                Token::Ident("b".into()),
                Token::Ne,
                Token::Str("x".into()),
            ]
        );
    }

    #[test]
    fn test_escaped_quotes() {
        assert_eq!(kinds("'it''s'"), vec![Token::Str("it's".into())]);
        assert_eq!(kinds(r#""say \"hi\"""#), vec![Token::Str("say \"hi\"".into())]);
    }

    #[test]
    fn test_dotted_identifier() {
        assert_eq!(kinds("user.role_id"), vec![Token::Ident("user.role_id".into())]);
    }

    #[test]
    fn test_rejects_stray_characters() {
        assert!(tokenize("a # b").is_err());
        assert!(tokenize("a & b").is_err());
    }
}
