use crate::error::{ErrorKind, Result};
use exn::ResultExt;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(&'static str),
}

/// Longest operators first so that `**` wins over `*`, `<=` over `<`, etc.
const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "(", ")", "[", "]", ",", ":", ".", "+", "-", "*", "/", "%", "<", ">", "=",
];

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        // String literals, with an optional raw prefix.
        let raw = matches!(c, 'r' | 'R') && matches!(chars.get(pos + 1), Some('\'' | '"'));
        if raw || c == '\'' || c == '"' {
            if raw {
                pos += 1;
            }
            let (s, next) = string_literal(&chars, pos, raw)?;
            tokens.push(Token::Str(s));
            pos = next;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(pos + 1).is_some_and(char::is_ascii_digit)) {
            let (token, next) = number(&chars, pos)?;
            tokens.push(token);
            pos = next;
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Token::Name(chars[start..pos].iter().collect()));
            continue;
        }
        let rest: String = chars[pos..(pos + 2).min(chars.len())].iter().collect();
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(op) => {
                tokens.push(Token::Op(op));
                pos += op.len();
            },
            None => exn::bail!(ErrorKind::Syntax(format!("unexpected character {c:?} at position {pos}"))),
        }
    }
    Ok(tokens)
}

fn number(chars: &[char], start: usize) -> Result<(Token, usize)> {
    let mut pos = start;
    let mut is_float = false;
    while pos < chars.len() {
        match chars[pos] {
            '0'..='9' | '_' => {},
            '.' if !is_float => is_float = true,
            'e' | 'E' => {
                is_float = true;
                if matches!(chars.get(pos + 1), Some('+' | '-')) {
                    pos += 1;
                }
            },
            _ => break,
        }
        pos += 1;
    }
    let text: String = chars[start..pos].iter().filter(|c| **c != '_').collect();
    let token = if is_float {
        Token::Float(text.parse::<f64>().or_raise(|| ErrorKind::Syntax(format!("invalid number literal {text:?}")))?)
    } else {
        Token::Int(text.parse::<i64>().or_raise(|| ErrorKind::Syntax(format!("invalid number literal {text:?}")))?)
    };
    Ok((token, pos))
}

fn string_literal(chars: &[char], start: usize, raw: bool) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut pos = start + 1;
    while pos < chars.len() {
        let c = chars[pos];
        if c == quote {
            return Ok((out, pos + 1));
        }
        if c != '\\' {
            out.push(c);
            pos += 1;
            continue;
        }
        let Some(&escaped) = chars.get(pos + 1) else { break };
        if raw {
            // Raw strings keep the backslash, but it still protects a quote.
            out.push('\\');
            out.push(escaped);
            pos += 2;
            continue;
        }
        pos += 2;
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' | '\'' | '"' => out.push(escaped),
            'x' | 'u' | 'U' => {
                let width = match escaped {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = chars.get(pos..pos + width).unwrap_or_default().iter().collect();
                let decoded = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
                match decoded {
                    Some(ch) if hex.len() == width => out.push(ch),
                    _ => exn::bail!(ErrorKind::Syntax(format!("invalid \\{escaped} escape"))),
                }
                pos += width;
            },
            other => {
                out.push('\\');
                out.push(other);
            },
        }
    }
    exn::bail!(ErrorKind::Syntax("unterminated string literal".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("a**2 >= b // 3").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Name("a".into()),
                Token::Op("**"),
                Token::Int(2),
                Token::Op(">="),
                Token::Name("b".into()),
                Token::Op("//"),
                Token::Int(3),
            ]
        );
    }

    #[test]
    fn test_tokenize_strings() {
        let tokens = tokenize(r#"'it\'s' "\x41" r'\d+'"#).unwrap();
        assert_eq!(
            tokens,
            vec![Token::Str("it's".into()), Token::Str("A".into()), Token::Str(r"\d+".into())]
        );
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(tokenize("1_000 2.5 1e3").unwrap(), vec![Token::Int(1000), Token::Float(2.5), Token::Float(1000.0)]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("'abc").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Syntax(_)));
    }
}
