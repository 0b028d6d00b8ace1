//! Splits template source into text and action segments, then tokenizes
//! action bodies.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::TemplateError;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    Action { body: String, line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// `.` (empty path) or `.A.B`.
    Field(Vec<String>),
    /// `$` or `$name`, optionally followed by a field path.
    Var { name: String, fields: Vec<String> },
    Ident(String),
    Str(String),
    Int(i64),
    Bool(bool),
    Nil,
    Pipe,
    LParen,
    RParen,
    Comma,
    Declare,
    Assign,
}

pub(crate) fn has_delimiters(src: &[u8]) -> bool {
    src.windows(2).any(|w| w == LEFT_DELIM.as_bytes())
}

pub(crate) fn split_segments(name: &str, src: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    loop {
        let rest = &src[pos..];
        let Some(offset) = rest.find(LEFT_DELIM) else {
            push_text(&mut segments, rest, trim_next, false);
            break;
        };

        let open = pos + offset;
        let after_open = open + LEFT_DELIM.len();
        let trim_left = has_left_trim(&src[after_open..]);
        push_text(&mut segments, &src[pos..open], trim_next, trim_left);

        let line = line_of(src, open);
        let body_start = if trim_left { after_open + 1 } else { after_open };
        let close = find_action_end(name, src, body_start, line)?;

        let mut body = &src[body_start..close];
        let trim_right = has_right_trim(body);
        if trim_right {
            body = &body[..body.len() - 1];
        }

        let trimmed = body.trim();
        if trimmed.starts_with("/*") {
            if !trimmed.ends_with("*/") {
                return Err(parse_error(
                    name,
                    line,
                    "comment ends before closing delimiter",
                ));
            }
        } else {
            segments.push(Segment::Action {
                body: body.to_string(),
                line,
            });
        }

        pos = close + RIGHT_DELIM.len();
        trim_next = trim_right;
    }

    Ok(segments)
}

fn push_text(segments: &mut Vec<Segment>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
}

fn has_left_trim(after_open: &str) -> bool {
    let mut chars = after_open.chars();
    chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_ascii_whitespace())
}

fn has_right_trim(body: &str) -> bool {
    body.strip_suffix('-')
        .and_then(|rest| rest.chars().last())
        .is_some_and(|c| c.is_ascii_whitespace())
}

fn line_of(src: &str, byte_pos: usize) -> usize {
    src[..byte_pos].bytes().filter(|b| *b == b'\n').count() + 1
}

/// Byte index of the `}}` closing the action that starts at `start`, skipping
/// delimiters that appear inside string literals and comments.
fn find_action_end(
    name: &str,
    src: &str,
    start: usize,
    line: usize,
) -> Result<usize, TemplateError> {
    let bytes = src.as_bytes();
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                loop {
                    match bytes.get(i) {
                        None | Some(b'\n') => {
                            return Err(parse_error(name, line, "unterminated quoted string"))
                        }
                        Some(b'\\') => i += 2,
                        Some(b'"') => break,
                        Some(_) => i += 1,
                    }
                }
            }
            b'`' => {
                i += 1;
                while bytes.get(i).is_some_and(|b| *b != b'`') {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(parse_error(name, line, "unterminated raw quoted string"));
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let Some(end) = src[i + 2..].find("*/") else {
                    return Err(parse_error(name, line, "unclosed comment"));
                };
                i += 2 + end + 1;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Ok(i),
            _ => {}
        }
        i += 1;
    }

    Err(parse_error(name, line, "unclosed action"))
}

pub(crate) fn tokenize(name: &str, body: &str, line: usize) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(_, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            ':' => {
                chars.next();
                if chars.next().map(|(_, c)| c) != Some('=') {
                    return Err(parse_error(name, line, "expected ':='"));
                }
                tokens.push(Token::Declare);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Assign);
            }
            '.' => {
                chars.next();
                let fields = read_field_chain(name, line, &mut chars, true)?;
                tokens.push(Token::Field(fields));
            }
            '$' => {
                chars.next();
                let var = read_ident(&mut chars);
                let fields = if chars.peek().map(|(_, c)| *c) == Some('.') {
                    chars.next();
                    read_field_chain(name, line, &mut chars, false)?
                } else {
                    Vec::new()
                };
                tokens.push(Token::Var { name: var, fields });
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(read_quoted(name, line, &mut chars)?));
            }
            '`' => {
                chars.next();
                let mut raw = String::new();
                loop {
                    match chars.next() {
                        Some((_, '`')) => break,
                        Some((_, c)) => raw.push(c),
                        None => {
                            return Err(parse_error(name, line, "unterminated raw quoted string"))
                        }
                    }
                }
                tokens.push(Token::Str(raw));
            }
            '\'' => {
                return Err(parse_error(
                    name,
                    line,
                    "character constants are not supported",
                ));
            }
            c if c == '-' || c.is_ascii_digit() => {
                tokens.push(Token::Int(read_number(name, line, &mut chars)?));
            }
            c if is_ident_char(c) => {
                let ident = read_ident(&mut chars);
                tokens.push(match ident.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "nil" => Token::Nil,
                    _ => Token::Ident(ident),
                });
            }
            other => {
                return Err(parse_error(
                    name,
                    line,
                    &format!("unexpected character {:?} in action", other),
                ));
            }
        }
    }

    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn read_ident(chars: &mut Peekable<CharIndices<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        chars.next();
    }
    ident
}

/// Reads `A.B.C` after a leading dot. A bare `.` yields an empty chain when
/// `allow_empty` is set.
fn read_field_chain(
    name: &str,
    line: usize,
    chars: &mut Peekable<CharIndices<'_>>,
    allow_empty: bool,
) -> Result<Vec<String>, TemplateError> {
    let mut fields = Vec::new();

    loop {
        let ident = read_ident(chars);
        if ident.is_empty() {
            if fields.is_empty() && allow_empty {
                return Ok(fields);
            }
            return Err(parse_error(name, line, "bad field name after '.'"));
        }
        if ident.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(parse_error(name, line, "field names cannot start with a digit"));
        }
        fields.push(ident);

        if chars.peek().map(|(_, c)| *c) != Some('.') {
            return Ok(fields);
        }
        chars.next();
    }
}

fn read_quoted(
    name: &str,
    line: usize,
    chars: &mut Peekable<CharIndices<'_>>,
) -> Result<String, TemplateError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some((_, '"')) => return Ok(out),
            Some((_, '\\')) => {
                let escaped = match chars.next().map(|(_, c)| c) {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some('\'') => '\'',
                    Some('0') => '\0',
                    Some(other) => {
                        return Err(parse_error(
                            name,
                            line,
                            &format!("unknown escape sequence \\{}", other),
                        ))
                    }
                    None => return Err(parse_error(name, line, "unterminated quoted string")),
                };
                out.push(escaped);
            }
            Some((_, c)) => out.push(c),
            None => return Err(parse_error(name, line, "unterminated quoted string")),
        }
    }
}

fn read_number(
    name: &str,
    line: usize,
    chars: &mut Peekable<CharIndices<'_>>,
) -> Result<i64, TemplateError> {
    let mut literal = String::new();
    if chars.peek().map(|(_, c)| *c) == Some('-') {
        literal.push('-');
        chars.next();
    }
    while let Some(&(_, c)) = chars.peek() {
        if !is_ident_char(c) && c != '.' {
            break;
        }
        literal.push(c);
        chars.next();
    }
    literal
        .parse::<i64>()
        .map_err(|_| parse_error(name, line, &format!("bad number syntax: {:?}", literal)))
}

pub(crate) fn parse_error(name: &str, line: usize, message: &str) -> TemplateError {
    TemplateError::Parse {
        name: name.to_string(),
        line,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions(segments: &[Segment]) -> Vec<&str> {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Action { body, .. } => Some(body.trim()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_split_text_and_actions() {
        let segments = split_segments("t", "Host={{ .Hostname }}!").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Text("Host=".to_string()));
        assert_eq!(actions(&segments), vec![".Hostname"]);
        assert_eq!(segments[2], Segment::Text("!".to_string()));
    }

    #[test]
    fn test_trim_markers() {
        let segments = split_segments("t", "a  \n{{- .X -}}\n  b").unwrap();
        assert_eq!(segments[0], Segment::Text("a".to_string()));
        assert_eq!(segments[2], Segment::Text("b".to_string()));
    }

    #[test]
    fn test_negative_number_is_not_trim_marker() {
        let segments = split_segments("t", "x {{-3}}").unwrap();
        assert_eq!(segments[0], Segment::Text("x ".to_string()));
        assert_eq!(actions(&segments), vec!["-3"]);
    }

    #[test]
    fn test_comment_is_dropped() {
        let segments = split_segments("t", "a{{/* note }} here */}}b").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Text("a".to_string()), Segment::Text("b".to_string())]
        );
    }

    #[test]
    fn test_delimiter_inside_string() {
        let segments = split_segments("t", r#"{{ print "}}" }}"#).unwrap();
        assert_eq!(actions(&segments), vec![r#"print "}}""#]);
    }

    #[test]
    fn test_unclosed_action_reports_line() {
        let err = split_segments("t", "line one\n{{ .Invalid").unwrap_err();
        match err {
            TemplateError::Parse { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("unclosed action"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_tokenize_fields_and_literals() {
        let tokens = tokenize("t", r#"index .Env "HOME" | printf "%s" 42 true nil $.OS"#, 1)
            .unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("index".to_string()),
                Token::Field(vec!["Env".to_string()]),
                Token::Str("HOME".to_string()),
                Token::Pipe,
                Token::Ident("printf".to_string()),
                Token::Str("%s".to_string()),
                Token::Int(42),
                Token::Bool(true),
                Token::Nil,
                Token::Var {
                    name: String::new(),
                    fields: vec!["OS".to_string()]
                },
            ]
        );
    }

    #[test]
    fn test_tokenize_dot_and_chain() {
        let tokens = tokenize("t", ". .Env.HOME", 1).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field(vec![]),
                Token::Field(vec!["Env".to_string(), "HOME".to_string()]),
            ]
        );
    }

    #[test]
    fn test_tokenize_escapes() {
        let tokens = tokenize("t", r#""a\tb\"c""#, 1).unwrap();
        assert_eq!(tokens, vec![Token::Str("a\tb\"c".to_string())]);
        assert!(tokenize("t", r#""bad\q""#, 1).is_err());
    }

    #[test]
    fn test_has_delimiters() {
        assert!(has_delimiters(b"x {{ .OS }}"));
        assert!(!has_delimiters(b"plain { text }"));
        assert!(!has_delimiters(b""));
    }
}
