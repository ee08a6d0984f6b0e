//! XPath tokenizer
//!
//! `*`, `div`, `mod`, `and` and `or` are operators only where an
//! operand just ended; everywhere else they lex as name tests. This is
//! the standard XPath disambiguation rule.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Integer(i64),
    Literal(String),
    /// Name or keyword, possibly prefixed (`p:local`).
    Name(String),
    Variable(String),
    Slash,
    DoubleSlash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    At,
    Dot,
    DotDot,
    DoubleColon,
    Comma,
    Star,
    Pipe,
    Plus,
    Minus,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// `div`, `mod`, `and`, `or` in operator position.
    Operator(&'static str),
}

pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            ':' => {
                if chars.get(i + 1) == Some(&':') {
                    tokens.push(Token::DoubleColon);
                    i += 2;
                } else {
                    return Err(Error::XPathSyntax(format!(
                        "unexpected ':' at offset {i} in '{input}'"
                    )));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    return Err(Error::XPathSyntax(format!(
                        "unexpected '!' at offset {i} in '{input}'"
                    )));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::LtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::GtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '.' => {
                if chars.get(i + 1) == Some(&'.') {
                    tokens.push(Token::DotDot);
                    i += 2;
                } else if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                    let (token, next) = lex_number(&chars, i)?;
                    tokens.push(token);
                    i = next;
                } else {
                    tokens.push(Token::Dot);
                    i += 1;
                }
            }
            '*' => {
                if operand_ended(tokens.last()) {
                    tokens.push(Token::Operator("*"));
                } else {
                    tokens.push(Token::Star);
                }
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(Error::XPathSyntax(format!(
                        "unterminated string literal in '{input}'"
                    )));
                }
                tokens.push(Token::Literal(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_name_char(chars[end]) {
                    end += 1;
                }
                if end == start {
                    return Err(Error::XPathSyntax(format!(
                        "expected variable name after '$' in '{input}'"
                    )));
                }
                tokens.push(Token::Variable(chars[start..end].iter().collect()));
                i = end;
            }
            c if c.is_ascii_digit() => {
                let (token, next) = lex_number(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            c if is_name_start(c) => {
                let start = i;
                let mut end = i;
                while end < chars.len() && is_name_char(chars[end]) {
                    end += 1;
                }
                // Allow one prefix separator, but not `::` (axes are
                // handled by the parser as plain names).
                if chars.get(end) == Some(&':') && chars.get(end + 1) != Some(&':') {
                    end += 1;
                    while end < chars.len() && is_name_char(chars[end]) {
                        end += 1;
                    }
                }
                let name: String = chars[start..end].iter().collect();
                let token = match name.as_str() {
                    "div" | "mod" | "and" | "or" if operand_ended(tokens.last()) => {
                        Token::Operator(match name.as_str() {
                            "div" => "div",
                            "mod" => "mod",
                            "and" => "and",
                            _ => "or",
                        })
                    }
                    _ => Token::Name(name),
                };
                tokens.push(token);
                i = end;
            }
            _ => {
                return Err(Error::XPathSyntax(format!(
                    "unexpected character '{c}' in '{input}'"
                )))
            }
        }
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize)> {
    let mut end = start;
    let mut seen_dot = false;
    while end < chars.len() {
        let c = chars[end];
        if c.is_ascii_digit() {
            end += 1;
        } else if c == '.' && !seen_dot && chars.get(end + 1) != Some(&'.') {
            seen_dot = true;
            end += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..end].iter().collect();
    let token = if seen_dot {
        Token::Number(
            text.parse()
                .map_err(|_| Error::XPathSyntax(format!("bad number literal '{text}'")))?,
        )
    } else {
        Token::Integer(
            text.parse()
                .map_err(|_| Error::XPathSyntax(format!("bad number literal '{text}'")))?,
        )
    };
    Ok((token, end))
}

/// True when the previous token ends an operand, which puts `*` and
/// the word operators in operator position.
fn operand_ended(prev: Option<&Token>) -> bool {
    matches!(
        prev,
        Some(
            Token::Number(_)
                | Token::Integer(_)
                | Token::Literal(_)
                | Token::Name(_)
                | Token::Variable(_)
                | Token::RParen
                | Token::RBracket
                | Token::Dot
                | Token::DotDot
                | Token::Star
        )
    )
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_disambiguation() {
        // Leading `*` is a wildcard, post-operand `*` is multiplication.
        let tokens = tokenize("* | . * 3").unwrap();
        assert_eq!(tokens[0], Token::Star);
        assert_eq!(tokens[3], Token::Operator("*"));
    }

    #[test]
    fn word_operators_need_operand() {
        let tokens = tokenize("div and mod").unwrap();
        assert_eq!(tokens[0], Token::Name("div".to_string()));
        assert_eq!(tokens[1], Token::Operator("and"));
        assert_eq!(tokens[2], Token::Name("mod".to_string()));
    }

    #[test]
    fn prefixed_names_lex_as_one_token() {
        let tokens = tokenize("p:item").unwrap();
        assert_eq!(tokens, vec![Token::Name("p:item".to_string())]);
    }

    #[test]
    fn unterminated_literal_is_error() {
        assert!(tokenize("'open").is_err());
    }
}
