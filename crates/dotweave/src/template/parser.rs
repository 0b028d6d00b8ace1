//! Builds the node tree evaluated by the executor.

use crate::error::TemplateError;

use super::lexer::{parse_error, split_segments, tokenize, Segment, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    With {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Command {
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldRoot {
    /// The current `.` value.
    Dot,
    /// `$`, the top-level context.
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Arg {
    Field { root: FieldRoot, path: Vec<String> },
    Func(String),
    Str(String),
    Int(i64),
    Bool(bool),
    Nil,
    Sub(Pipeline),
}

enum Terminator {
    Eof,
    End,
    Else { tokens: Vec<Token>, line: usize },
}

const UNSUPPORTED_KEYWORDS: &[&str] = &["define", "template", "block", "break", "continue"];

pub(crate) fn parse(name: &str, src: &str) -> Result<Vec<Node>, TemplateError> {
    let segments = split_segments(name, src)?;
    let mut parser = Parser {
        name,
        segments,
        pos: 0,
        last_line: 1,
    };

    let (nodes, terminator) = parser.parse_list()?;
    match terminator {
        Terminator::Eof => Ok(nodes),
        Terminator::End => Err(parser.error("unexpected {{end}}")),
        Terminator::Else { line, .. } => Err(parse_error(name, line, "unexpected {{else}}")),
    }
}

struct Parser<'a> {
    name: &'a str,
    segments: Vec<Segment>,
    pos: usize,
    last_line: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> TemplateError {
        parse_error(self.name, self.last_line, message)
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Terminator), TemplateError> {
        let mut nodes = Vec::new();

        while self.pos < self.segments.len() {
            let segment = self.segments[self.pos].clone();
            self.pos += 1;

            let (body, line) = match segment {
                Segment::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Segment::Action { body, line } => (body, line),
            };
            self.last_line = line;

            let tokens = tokenize(self.name, &body, line)?;
            let keyword = match tokens.first() {
                Some(Token::Ident(ident)) => ident.as_str(),
                Some(_) => "",
                None => return Err(self.error("missing value for command")),
            };

            match keyword {
                "end" => {
                    if tokens.len() > 1 {
                        return Err(self.error("unexpected tokens after end"));
                    }
                    return Ok((nodes, Terminator::End));
                }
                "else" => {
                    return Ok((
                        nodes,
                        Terminator::Else {
                            tokens: tokens[1..].to_vec(),
                            line,
                        },
                    ));
                }
                "if" => {
                    let cond = self.control_pipeline("if", &tokens[1..], line)?;
                    nodes.push(self.parse_if(cond)?);
                }
                "with" => {
                    let pipe = self.control_pipeline("with", &tokens[1..], line)?;
                    let (body, otherwise) = self.parse_block("with")?;
                    nodes.push(Node::With {
                        pipe,
                        body,
                        otherwise,
                    });
                }
                "range" => {
                    let pipe = self.control_pipeline("range", &tokens[1..], line)?;
                    let (body, otherwise) = self.parse_block("range")?;
                    nodes.push(Node::Range {
                        pipe,
                        body,
                        otherwise,
                    });
                }
                kw if UNSUPPORTED_KEYWORDS.contains(&kw) => {
                    return Err(self.error(&format!("{{{{{}}}}} is not supported", kw)));
                }
                _ => nodes.push(Node::Action(parse_pipeline(self.name, &tokens, line)?)),
            }
        }

        Ok((nodes, Terminator::Eof))
    }

    fn control_pipeline(
        &self,
        keyword: &str,
        tokens: &[Token],
        line: usize,
    ) -> Result<Pipeline, TemplateError> {
        if tokens.is_empty() {
            return Err(parse_error(
                self.name,
                line,
                &format!("missing value for {}", keyword),
            ));
        }
        parse_pipeline(self.name, tokens, line)
    }

    fn parse_if(&mut self, first: Pipeline) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut cond = first;

        loop {
            let (body, terminator) = self.parse_list()?;
            branches.push((cond, body));

            match terminator {
                Terminator::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                Terminator::Else { tokens, .. } if tokens.is_empty() => {
                    let otherwise = self.parse_else_body("if")?;
                    return Ok(Node::If {
                        branches,
                        otherwise,
                    });
                }
                Terminator::Else { tokens, line } => {
                    if tokens.first() != Some(&Token::Ident("if".to_string())) {
                        return Err(parse_error(self.name, line, "unexpected tokens after else"));
                    }
                    cond = self.control_pipeline("if", &tokens[1..], line)?;
                }
                Terminator::Eof => return Err(self.error("unexpected EOF: missing {{end}} for if")),
            }
        }
    }

    fn parse_block(&mut self, keyword: &str) -> Result<(Vec<Node>, Vec<Node>), TemplateError> {
        let (body, terminator) = self.parse_list()?;
        match terminator {
            Terminator::End => Ok((body, Vec::new())),
            Terminator::Else { tokens, line } => {
                if !tokens.is_empty() {
                    return Err(parse_error(self.name, line, "unexpected tokens after else"));
                }
                let otherwise = self.parse_else_body(keyword)?;
                Ok((body, otherwise))
            }
            Terminator::Eof => Err(self.error(&format!(
                "unexpected EOF: missing {{{{end}}}} for {}",
                keyword
            ))),
        }
    }

    fn parse_else_body(&mut self, keyword: &str) -> Result<Vec<Node>, TemplateError> {
        let (otherwise, terminator) = self.parse_list()?;
        match terminator {
            Terminator::End => Ok(otherwise),
            Terminator::Else { line, .. } => Err(parse_error(
                self.name,
                line,
                &format!("expected end; found else in {}", keyword),
            )),
            Terminator::Eof => Err(self.error(&format!(
                "unexpected EOF: missing {{{{end}}}} for {}",
                keyword
            ))),
        }
    }
}

fn parse_pipeline(name: &str, tokens: &[Token], line: usize) -> Result<Pipeline, TemplateError> {
    let mut commands = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| parse_error(name, line, "unexpected right paren"))?;
            }
            Token::Pipe if depth == 0 => {
                commands.push(parse_command(name, &tokens[start..i], line)?);
                start = i + 1;
            }
            Token::Declare | Token::Assign => {
                return Err(parse_error(
                    name,
                    line,
                    "variable declarations are not supported",
                ));
            }
            Token::Comma => return Err(parse_error(name, line, "unexpected comma")),
            _ => {}
        }
    }
    if depth != 0 {
        return Err(parse_error(name, line, "unclosed left paren"));
    }
    commands.push(parse_command(name, &tokens[start..], line)?);

    Ok(Pipeline { commands, line })
}

fn parse_command(name: &str, tokens: &[Token], line: usize) -> Result<Command, TemplateError> {
    if tokens.is_empty() {
        return Err(parse_error(name, line, "missing command in pipeline"));
    }

    let mut args = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let arg = match &tokens[i] {
            Token::Field(path) => Arg::Field {
                root: FieldRoot::Dot,
                path: path.clone(),
            },
            Token::Var { name: var, fields } if var.is_empty() => Arg::Field {
                root: FieldRoot::Root,
                path: fields.clone(),
            },
            Token::Var { name: var, .. } => {
                return Err(parse_error(
                    name,
                    line,
                    &format!("undefined variable \"${}\"", var),
                ));
            }
            Token::Ident(ident) => Arg::Func(ident.clone()),
            Token::Str(s) => Arg::Str(s.clone()),
            Token::Int(n) => Arg::Int(*n),
            Token::Bool(b) => Arg::Bool(*b),
            Token::Nil => Arg::Nil,
            Token::LParen => {
                let close = matching_paren(&tokens[i..])
                    .map(|offset| i + offset)
                    .ok_or_else(|| parse_error(name, line, "unclosed left paren"))?;
                let inner = &tokens[i + 1..close];
                i = close;
                Arg::Sub(parse_pipeline(name, inner, line)?)
            }
            other => {
                return Err(parse_error(
                    name,
                    line,
                    &format!("unexpected {:?} in command", other),
                ));
            }
        };
        args.push(arg);
        i += 1;
    }

    Ok(Command { args })
}

/// Offset of the paren closing the one at `tokens[0]`.
fn matching_paren(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
