// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Tokenizer for the restricted expression grammar.
//!
//! `true`, `false`, and `null` are recognized case-insensitively; the
//! operator keywords `and`, `or`, `not` are lowercase only. Strings accept
//! single or double quotes with the usual short escapes.

/// One lexical token. Numeric literals keep the int/float distinction.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
}

/// Tokenize an expression, or describe why it cannot be tokenized.
pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut index = 0usize;

    while index < chars.len() {
        let ch = chars[index];
        match ch {
            ' ' | '\t' | '\r' | '\n' => index += 1,
            '(' => {
                tokens.push(Token::LParen);
                index += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                index += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                index += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                index += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                index += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                index += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                index += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                index += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                index += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                index += 1;
            }
            '=' => {
                if chars.get(index + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    index += 2;
                } else {
                    return Err("assignment is not an expression".to_string());
                }
            }
            '!' => {
                if chars.get(index + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    index += 2;
                } else {
                    return Err("unexpected character '!'".to_string());
                }
            }
            '<' => {
                if chars.get(index + 1) == Some(&'=') {
                    tokens.push(Token::LtEq);
                    index += 2;
                } else {
                    tokens.push(Token::Lt);
                    index += 1;
                }
            }
            '>' => {
                if chars.get(index + 1) == Some(&'=') {
                    tokens.push(Token::GtEq);
                    index += 2;
                } else {
                    tokens.push(Token::Gt);
                    index += 1;
                }
            }
            '\'' | '"' => {
                let (token, next) = lex_string(&chars, index, ch)?;
                tokens.push(token);
                index = next;
            }
            _ if ch.is_ascii_digit() => {
                let (token, next) = lex_number(&chars, index)?;
                tokens.push(token);
                index = next;
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' => {
                let (token, next) = lex_word(&chars, index);
                tokens.push(token);
                index = next;
            }
            _ => return Err(format!("unexpected character '{ch}'")),
        }
    }

    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize, quote: char) -> Result<(Token, usize), String> {
    let mut index = start + 1;
    let mut text = String::new();
    while index < chars.len() {
        let ch = chars[index];
        if ch == quote {
            return Ok((Token::Str(text), index + 1));
        }
        if ch == '\\' {
            let escaped = chars
                .get(index + 1)
                .ok_or_else(|| "unterminated string literal".to_string())?;
            match escaped {
                '\\' => text.push('\\'),
                '\'' => text.push('\''),
                '"' => text.push('"'),
                'n' => text.push('\n'),
                't' => text.push('\t'),
                'r' => text.push('\r'),
                other => return Err(format!("unsupported escape '\\{other}'")),
            }
            index += 2;
        } else {
            text.push(ch);
            index += 1;
        }
    }
    Err("unterminated string literal".to_string())
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), String> {
    let mut index = start;
    let mut is_float = false;

    while index < chars.len() && chars[index].is_ascii_digit() {
        index += 1;
    }
    if index < chars.len()
        && chars[index] == '.'
        && chars.get(index + 1).is_some_and(|c| c.is_ascii_digit())
    {
        is_float = true;
        index += 1;
        while index < chars.len() && chars[index].is_ascii_digit() {
            index += 1;
        }
    }
    if index < chars.len() && (chars[index] == 'e' || chars[index] == 'E') {
        let mut lookahead = index + 1;
        if chars.get(lookahead) == Some(&'+') || chars.get(lookahead) == Some(&'-') {
            lookahead += 1;
        }
        if chars.get(lookahead).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            index = lookahead;
            while index < chars.len() && chars[index].is_ascii_digit() {
                index += 1;
            }
        }
    }

    let text: String = chars[start..index].iter().collect();
    if is_float {
        let value = text
            .parse::<f64>()
            .map_err(|_| format!("invalid number literal '{text}'"))?;
        Ok((Token::Float(value), index))
    } else {
        match text.parse::<i64>() {
            Ok(value) => Ok((Token::Int(value), index)),
            // Out-of-range integers degrade to floats rather than failing.
            Err(_) => {
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number literal '{text}'"))?;
                Ok((Token::Float(value), index))
            }
        }
    }
}

fn lex_word(chars: &[char], start: usize) -> (Token, usize) {
    let mut index = start;
    while index < chars.len() && (chars[index].is_ascii_alphanumeric() || chars[index] == '_') {
        index += 1;
    }
    let word: String = chars[start..index].iter().collect();

    let token = if word.eq_ignore_ascii_case("true") {
        Token::True
    } else if word.eq_ignore_ascii_case("false") {
        Token::False
    } else if word.eq_ignore_ascii_case("null") {
        Token::Null
    } else {
        match word.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Ident(word),
        }
    };
    (token, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_comparison() {
        let tokens = tokenize("risk <= 0.2").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("risk".to_string()),
                Token::LtEq,
                Token::Float(0.2),
            ]
        );
    }

    #[test]
    fn keyword_literals_are_case_insensitive() {
        assert_eq!(tokenize("TRUE").unwrap(), vec![Token::True]);
        assert_eq!(tokenize("Null").unwrap(), vec![Token::Null]);
        assert_eq!(tokenize("false").unwrap(), vec![Token::False]);
        // `AND` is a name, not the operator.
        assert_eq!(
            tokenize("AND").unwrap(),
            vec![Token::Ident("AND".to_string())]
        );
    }

    #[test]
    fn strings_accept_both_quote_styles() {
        assert_eq!(
            tokenize(r#""ok""#).unwrap(),
            vec![Token::Str("ok".to_string())]
        );
        assert_eq!(
            tokenize(r#"'it\'s'"#).unwrap(),
            vec![Token::Str("it's".to_string())]
        );
    }

    #[test]
    fn numbers_keep_int_float_distinction() {
        assert_eq!(tokenize("42").unwrap(), vec![Token::Int(42)]);
        assert_eq!(tokenize("4.5").unwrap(), vec![Token::Float(4.5)]);
        assert_eq!(tokenize("1e3").unwrap(), vec![Token::Float(1000.0)]);
    }

    #[test]
    fn attribute_chains_lex_as_dotted_idents() {
        let tokens = tokenize("deploy.output.risk").unwrap();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[1], Token::Dot);
    }

    #[test]
    fn rejects_stray_characters() {
        assert!(tokenize("a ; b").is_err());
        assert!(tokenize("a = 1").is_err());
        assert!(tokenize("\"open").is_err());
    }
}
