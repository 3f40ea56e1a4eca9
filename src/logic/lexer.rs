use crate::error::{GradeError, GradeResult};

pub const MAX_EXPRESSION_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    /// Reference body without the leading `@`, e.g. `Test:1`.
    Reference(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    LParen,
    RParen,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

fn is_reference_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

pub fn tokenize(input: &str) -> GradeResult<Vec<Token>> {
    if input.len() > MAX_EXPRESSION_LEN {
        return Err(GradeError::invalid(format!(
            "expression longer than {} bytes",
            MAX_EXPRESSION_LEN
        )));
    }

    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let single = |kind: TokenKind| Token { kind, offset };
        let next = chars.get(i + 1).map(|(_, c)| *c);

        match c {
            '+' => {
                tokens.push(single(TokenKind::Plus));
                i += 1;
            }
            '-' => {
                tokens.push(single(TokenKind::Minus));
                i += 1;
            }
            '*' if next == Some('*') => {
                tokens.push(single(TokenKind::DoubleStar));
                i += 2;
            }
            '*' => {
                tokens.push(single(TokenKind::Star));
                i += 1;
            }
            '/' if next == Some('/') => {
                tokens.push(single(TokenKind::DoubleSlash));
                i += 2;
            }
            '/' => {
                tokens.push(single(TokenKind::Slash));
                i += 1;
            }
            '%' => {
                tokens.push(single(TokenKind::Percent));
                i += 1;
            }
            '(' => {
                tokens.push(single(TokenKind::LParen));
                i += 1;
            }
            ')' => {
                tokens.push(single(TokenKind::RParen));
                i += 1;
            }
            ',' => {
                tokens.push(single(TokenKind::Comma));
                i += 1;
            }
            '@' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_reference_char(chars[end].1) {
                    end += 1;
                }
                if end == start {
                    return Err(GradeError::invalid(format!(
                        "empty reference at offset {}",
                        offset
                    )));
                }
                let body: String = chars[start..end].iter().map(|(_, c)| *c).collect();
                tokens.push(single(TokenKind::Reference(body)));
                i = end;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = i;
                let mut seen_dot = false;
                while end < chars.len() {
                    let ch = chars[end].1;
                    if ch.is_ascii_digit() {
                        end += 1;
                    } else if ch == '.' && !seen_dot {
                        seen_dot = true;
                        end += 1;
                    } else {
                        break;
                    }
                }
                let text: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                let value: f64 = text.parse().map_err(|_| {
                    GradeError::invalid(format!("bad number '{}' at offset {}", text, offset))
                })?;
                tokens.push(single(TokenKind::Number(value)));
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len()
                    && (chars[end].1.is_ascii_alphanumeric() || chars[end].1 == '_')
                {
                    end += 1;
                }
                let name: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                tokens.push(single(TokenKind::Ident(name)));
                i = end;
            }
            other => {
                return Err(GradeError::invalid(format!(
                    "unexpected character '{}' at offset {}",
                    other, offset
                )));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: input.len(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn distinguishes_double_operators() {
        assert_eq!(
            kinds("2 ** 3 // 4 * 5 / 6"),
            vec![
                TokenKind::Number(2.0),
                TokenKind::DoubleStar,
                TokenKind::Number(3.0),
                TokenKind::DoubleSlash,
                TokenKind::Number(4.0),
                TokenKind::Star,
                TokenKind::Number(5.0),
                TokenKind::Slash,
                TokenKind::Number(6.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reference_stops_at_operator() {
        assert_eq!(
            kinds("@First:Test:1*0.4"),
            vec![
                TokenKind::Reference("First:Test:1".into()),
                TokenKind::Star,
                TokenKind::Number(0.4),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_foreign_syntax() {
        for bad in ["__import__('os')", "1; 2", "a = 1", "\"text\"", "@", "1 < 2", "x[0]", "."] {
            assert!(
                matches!(tokenize(bad), Err(GradeError::InvalidLogicExpression(_))),
                "{} should not lex",
                bad
            );
        }
    }

    #[test]
    fn rejects_overlong_input() {
        let long = "1+".repeat(MAX_EXPRESSION_LEN);
        assert!(matches!(
            tokenize(&long),
            Err(GradeError::InvalidLogicExpression(_))
        ));
    }
}
