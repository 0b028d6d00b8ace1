use std::cell::Cell;

use crate::error::TemplateError;

use super::funcs::FuncRegistry;
use super::parser::{Arg, Command, FieldRoot, Node, Pipeline};
use super::value::Value;

/// Total `range` iterations allowed in one render, nested loops included.
pub(crate) const MAX_RANGE_ITERATIONS: usize = 1_000_000;

/// Upper bound on the rendered output of one template.
pub(crate) const MAX_OUTPUT_BYTES: usize = 64 << 20;

/// Walks a parsed template against a context value.
pub(crate) struct Executor<'a> {
    name: &'a str,
    root: &'a Value,
    funcs: &'a FuncRegistry,
    iterations: Cell<usize>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(name: &'a str, root: &'a Value, funcs: &'a FuncRegistry) -> Self {
        Self {
            name,
            root,
            funcs,
            iterations: Cell::new(0),
        }
    }

    pub(crate) fn execute(&self, nodes: &[Node]) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.exec_nodes(nodes, self.root, &mut out)?;
        Ok(out)
    }

    fn error(&self, line: usize, message: impl std::fmt::Display) -> TemplateError {
        TemplateError::Exec {
            name: self.name.to_string(),
            message: format!("line {}: {}", line, message),
        }
    }

    fn exec_nodes(&self, nodes: &[Node], dot: &Value, out: &mut String) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    out.push_str(&value.to_string());
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = false;
                    for (cond, body) in branches {
                        if self.eval_pipeline(cond, dot)?.is_truthy() {
                            self.exec_nodes(body, dot, out)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        self.exec_nodes(otherwise, dot, out)?;
                    }
                }
                Node::With {
                    pipe,
                    body,
                    otherwise,
                } => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    if value.is_truthy() {
                        self.exec_nodes(body, &value, out)?;
                    } else {
                        self.exec_nodes(otherwise, dot, out)?;
                    }
                }
                Node::Range {
                    pipe,
                    body,
                    otherwise,
                } => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    let items = self.range_items(&value, pipe.line)?;
                    if items.is_empty() {
                        self.exec_nodes(otherwise, dot, out)?;
                    }
                    for item in &items {
                        self.count_iteration(pipe.line)?;
                        self.exec_nodes(body, item, out)?;
                    }
                }
            }
            if out.len() > MAX_OUTPUT_BYTES {
                return Err(TemplateError::Exec {
                    name: self.name.to_string(),
                    message: format!("output exceeds {} bytes", MAX_OUTPUT_BYTES),
                });
            }
        }
        Ok(())
    }

    fn range_items(&self, value: &Value, line: usize) -> Result<Vec<Value>, TemplateError> {
        match value {
            Value::Nil => Ok(Vec::new()),
            Value::List(items) => Ok(items.clone()),
            // BTreeMap iteration is already in sorted key order
            Value::Map(map) => Ok(map.values().cloned().collect()),
            Value::Int(n) if *n > MAX_RANGE_ITERATIONS as i64 => Err(self.error(
                line,
                format!("range over {} exceeds {} iterations", n, MAX_RANGE_ITERATIONS),
            )),
            Value::Int(n) => Ok((0..*n).map(Value::Int).collect()),
            other => Err(self.error(
                line,
                format!("range can't iterate over {}", other.type_name()),
            )),
        }
    }

    fn count_iteration(&self, line: usize) -> Result<(), TemplateError> {
        let done = self.iterations.get() + 1;
        if done > MAX_RANGE_ITERATIONS {
            return Err(self.error(
                line,
                format!("range exceeds {} iterations", MAX_RANGE_ITERATIONS),
            ));
        }
        self.iterations.set(done);
        Ok(())
    }

    fn eval_pipeline(&self, pipe: &Pipeline, dot: &Value) -> Result<Value, TemplateError> {
        let mut piped = None;
        for command in &pipe.commands {
            piped = Some(self.eval_command(command, dot, piped, pipe.line)?);
        }
        Ok(piped.unwrap_or(Value::Nil))
    }

    fn eval_command(
        &self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
        line: usize,
    ) -> Result<Value, TemplateError> {
        let Some(head) = command.args.first() else {
            return Err(self.error(line, "empty command"));
        };

        match head {
            Arg::Func(name) => {
                let mut args = command.args[1..]
                    .iter()
                    .map(|arg| self.eval_arg(arg, dot, line))
                    .collect::<Result<Vec<_>, _>>()?;
                args.extend(piped);
                self.call(name, &args, line)
            }
            Arg::Nil => Err(self.error(line, "nil is not a command")),
            other => {
                if command.args.len() > 1 || piped.is_some() {
                    return Err(self.error(
                        line,
                        format!("can't give argument to non-function {}", describe(other)),
                    ));
                }
                self.eval_arg(other, dot, line)
            }
        }
    }

    fn call(&self, name: &str, args: &[Value], line: usize) -> Result<Value, TemplateError> {
        let func = self
            .funcs
            .get(name)
            .ok_or_else(|| self.error(line, format!("function \"{}\" not defined", name)))?;
        func.call(args)
            .map_err(|message| self.error(line, format!("error calling {}: {}", name, message)))
    }

    fn eval_arg(&self, arg: &Arg, dot: &Value, line: usize) -> Result<Value, TemplateError> {
        match arg {
            Arg::Field { root, path } => {
                let start = match root {
                    FieldRoot::Dot => dot,
                    FieldRoot::Root => self.root,
                };
                self.resolve_field(start, path, line)
            }
            // A bare function name in argument position is called without arguments
            Arg::Func(name) => self.call(name, &[], line),
            Arg::Str(s) => Ok(Value::Str(s.clone())),
            Arg::Int(n) => Ok(Value::Int(*n)),
            Arg::Bool(b) => Ok(Value::Bool(*b)),
            Arg::Nil => Ok(Value::Nil),
            Arg::Sub(pipe) => self.eval_pipeline(pipe, dot),
        }
    }

    fn resolve_field(&self, start: &Value, path: &[String], line: usize) -> Result<Value, TemplateError> {
        let mut current = start.clone();
        for field in path {
            current = match &current {
                Value::Record(fields) => fields.get(field).cloned().ok_or_else(|| {
                    self.error(
                        line,
                        format!("can't evaluate field {} in type {}", field, current.type_name()),
                    )
                })?,
                Value::Map(map) => map.get(field).cloned().unwrap_or_else(|| Value::str("")),
                other => {
                    return Err(self.error(
                        line,
                        format!("can't evaluate field {} in type {}", field, other.type_name()),
                    ))
                }
            };
        }
        Ok(current)
    }
}

fn describe(arg: &Arg) -> String {
    match arg {
        Arg::Field { root, path } => {
            let prefix = match root {
                FieldRoot::Dot => "",
                FieldRoot::Root => "$",
            };
            match (root, path.is_empty()) {
                (FieldRoot::Dot, true) => ".".to_string(),
                (FieldRoot::Root, true) => "$".to_string(),
                _ => format!("{}.{}", prefix, path.join(".")),
            }
        }
        Arg::Str(s) => format!("{:?}", s),
        Arg::Int(n) => n.to_string(),
        Arg::Bool(b) => b.to_string(),
        Arg::Nil => "nil".to_string(),
        Arg::Func(name) => name.clone(),
        Arg::Sub(_) => "(...)".to_string(),
    }
}
