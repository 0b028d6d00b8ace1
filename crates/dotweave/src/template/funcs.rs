//! Function library available inside template actions.
//!
//! Functions receive their arguments already evaluated. When used in a
//! pipeline, the piped value is appended as the final argument, so helpers
//! such as `trimPrefix` take the subject string last.

use std::collections::HashMap;

use regex::Regex;

use super::value::Value;

pub type FuncResult = Result<Value, String>;

/// A callable exposed to templates under a name.
pub trait TemplateFunc: Send + Sync {
    fn call(&self, args: &[Value]) -> FuncResult;
}

impl<F> TemplateFunc for F
where
    F: Fn(&[Value]) -> FuncResult + Send + Sync,
{
    fn call(&self, args: &[Value]) -> FuncResult {
        self(args)
    }
}

/// Single-string transform such as `toUpper`. Takes exactly one string.
#[derive(Clone, Copy)]
pub struct TextTransform(pub fn(&str) -> String);

impl TemplateFunc for TextTransform {
    fn call(&self, args: &[Value]) -> FuncResult {
        arity(args, 1)?;
        let input = string_arg(args, 0)?;
        Ok(Value::Str((self.0)(input)))
    }
}

pub struct FuncRegistry {
    funcs: HashMap<String, Box<dyn TemplateFunc>>,
}

impl FuncRegistry {
    pub fn empty() -> Self {
        Self {
            funcs: HashMap::new(),
        }
    }

    /// Registry preloaded with the comparison, formatting and string helpers.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();

        registry.register("eq", builtin_eq);
        registry.register("ne", builtin_ne);
        registry.register("lt", |args: &[Value]| compare(args, |o| o.is_lt()));
        registry.register("le", |args: &[Value]| compare(args, |o| o.is_le()));
        registry.register("gt", |args: &[Value]| compare(args, |o| o.is_gt()));
        registry.register("ge", |args: &[Value]| compare(args, |o| o.is_ge()));
        registry.register("and", builtin_and);
        registry.register("or", builtin_or);
        registry.register("not", builtin_not);
        registry.register("len", builtin_len);
        registry.register("index", builtin_index);
        registry.register("print", |args: &[Value]| Ok(Value::Str(sprint(args))));
        registry.register("println", |args: &[Value]| Ok(Value::Str(sprintln(args))));
        registry.register("printf", builtin_printf);
        registry.register("default", builtin_default);
        registry.register("empty", builtin_empty);
        registry.register("coalesce", builtin_coalesce);
        registry.register("ternary", builtin_ternary);

        registry.register_transform("toUpper", str::to_uppercase);
        registry.register_transform("upper", str::to_uppercase);
        registry.register_transform("toLower", str::to_lowercase);
        registry.register_transform("lower", str::to_lowercase);
        registry.register_transform("trim", |s| s.trim().to_string());
        registry.register_transform("title", title);
        registry.register_transform("toTitleCase", to_title_case);
        registry.register_transform("toCamelCase", to_camel_case);
        registry.register_transform("toSnakeCase", |s| join_words(s, "_"));
        registry.register_transform("toKebabCase", |s| join_words(s, "-"));
        registry.register_transform("nospace", |s| {
            s.chars().filter(|c| !c.is_whitespace()).collect()
        });
        registry.register_transform("quote", go_quote);
        registry.register_transform("squote", |s| format!("'{}'", s));
        registry.register_transform("slugify", slugify);

        registry.register("trimPrefix", |args: &[Value]| {
            let (prefix, s) = two_strings(args)?;
            Ok(Value::str(s.strip_prefix(prefix).unwrap_or(s)))
        });
        registry.register("trimSuffix", |args: &[Value]| {
            let (suffix, s) = two_strings(args)?;
            Ok(Value::str(s.strip_suffix(suffix).unwrap_or(s)))
        });
        registry.register("trimAll", |args: &[Value]| {
            let (cutset, s) = two_strings(args)?;
            Ok(Value::str(s.trim_matches(|c: char| cutset.contains(c))))
        });
        registry.register("replace", |args: &[Value]| {
            arity(args, 3)?;
            let old = string_arg(args, 0)?;
            let new = string_arg(args, 1)?;
            let s = string_arg(args, 2)?;
            Ok(Value::Str(s.replace(old, new)))
        });
        registry.register("contains", |args: &[Value]| {
            let (needle, s) = two_strings(args)?;
            Ok(Value::Bool(s.contains(needle)))
        });
        registry.register("hasPrefix", |args: &[Value]| {
            let (prefix, s) = two_strings(args)?;
            Ok(Value::Bool(s.starts_with(prefix)))
        });
        registry.register("hasSuffix", |args: &[Value]| {
            let (suffix, s) = two_strings(args)?;
            Ok(Value::Bool(s.ends_with(suffix)))
        });
        registry.register("repeat", builtin_repeat);
        registry.register("split", |args: &[Value]| {
            let (sep, s) = two_strings(args)?;
            Ok(Value::List(s.split(sep).map(Value::str).collect()))
        });
        registry.register("join", builtin_join);
        registry.register("regexMatch", |args: &[Value]| {
            let (pattern, s) = two_strings(args)?;
            Ok(Value::Bool(compile(pattern)?.is_match(s)))
        });
        registry.register("regexReplaceAll", |args: &[Value]| {
            arity(args, 3)?;
            let re = compile(string_arg(args, 0)?)?;
            let s = string_arg(args, 1)?;
            let replacement = string_arg(args, 2)?;
            Ok(Value::Str(re.replace_all(s, replacement).into_owned()))
        });

        registry
    }

    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: TemplateFunc + 'static,
    {
        self.funcs.insert(name.to_string(), Box::new(func));
    }

    pub fn register_transform(&mut self, name: &str, transform: fn(&str) -> String) {
        self.register(name, TextTransform(transform));
    }

    pub fn get(&self, name: &str) -> Option<&dyn TemplateFunc> {
        self.funcs.get(name).map(|f| f.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }
}

impl Default for FuncRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn arity(args: &[Value], want: usize) -> Result<(), String> {
    if args.len() != want {
        return Err(format!(
            "wrong number of args: want {} got {}",
            want,
            args.len()
        ));
    }
    Ok(())
}

fn min_arity(args: &[Value], want: usize) -> Result<(), String> {
    if args.len() < want {
        return Err(format!(
            "wrong number of args: want at least {} got {}",
            want,
            args.len()
        ));
    }
    Ok(())
}

fn string_arg(args: &[Value], i: usize) -> Result<&str, String> {
    match &args[i] {
        Value::Str(s) => Ok(s),
        other => Err(format!(
            "wrong type for argument {}: expected string; got {}",
            i + 1,
            other.type_name()
        )),
    }
}

fn two_strings(args: &[Value]) -> Result<(&str, &str), String> {
    arity(args, 2)?;
    Ok((string_arg(args, 0)?, string_arg(args, 1)?))
}

fn compile(pattern: &str) -> Result<Regex, String> {
    Regex::new(pattern).map_err(|e| format!("invalid regex {:?}: {}", pattern, e))
}

fn basic_eq(a: &Value, b: &Value) -> Result<bool, String> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Ok(true),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
        (Value::List(_) | Value::Map(_) | Value::Record(_), _)
        | (_, Value::List(_) | Value::Map(_) | Value::Record(_)) => {
            Err(format!("non-comparable type {}", a.type_name()))
        }
        _ => Err(format!(
            "incompatible types for comparison: {} and {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

/// `eq a b c` is true when `a` equals any of the remaining arguments.
fn builtin_eq(args: &[Value]) -> FuncResult {
    min_arity(args, 2)?;
    for other in &args[1..] {
        if basic_eq(&args[0], other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn builtin_ne(args: &[Value]) -> FuncResult {
    arity(args, 2)?;
    Ok(Value::Bool(!basic_eq(&args[0], &args[1])?))
}

fn compare(args: &[Value], pred: fn(std::cmp::Ordering) -> bool) -> FuncResult {
    arity(args, 2)?;
    let ordering = match (&args[0], &args[1]) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (a, b) => {
            return Err(format!(
                "incompatible types for comparison: {} and {}",
                a.type_name(),
                b.type_name()
            ))
        }
    };
    Ok(Value::Bool(pred(ordering)))
}

fn builtin_and(args: &[Value]) -> FuncResult {
    min_arity(args, 1)?;
    let first_falsy = args.iter().find(|v| !v.is_truthy());
    Ok(first_falsy.unwrap_or(&args[args.len() - 1]).clone())
}

fn builtin_or(args: &[Value]) -> FuncResult {
    min_arity(args, 1)?;
    let first_truthy = args.iter().find(|v| v.is_truthy());
    Ok(first_truthy.unwrap_or(&args[args.len() - 1]).clone())
}

fn builtin_not(args: &[Value]) -> FuncResult {
    arity(args, 1)?;
    Ok(Value::Bool(!args[0].is_truthy()))
}

fn builtin_len(args: &[Value]) -> FuncResult {
    arity(args, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.len(),
        Value::List(items) => items.len(),
        Value::Map(map) | Value::Record(map) => map.len(),
        other => return Err(format!("len of type {}", other.type_name())),
    };
    Ok(Value::Int(len as i64))
}

fn builtin_index(args: &[Value]) -> FuncResult {
    min_arity(args, 1)?;
    let mut current = args[0].clone();

    for key in &args[1..] {
        current = match (&current, key) {
            (Value::Map(map), Value::Str(k)) => {
                map.get(k).cloned().unwrap_or_else(|| Value::str(""))
            }
            (Value::List(items), Value::Int(i)) => {
                let idx = usize::try_from(*i)
                    .ok()
                    .filter(|idx| *idx < items.len())
                    .ok_or_else(|| format!("index out of range: {}", i))?;
                items[idx].clone()
            }
            (Value::Nil, _) => return Err("index of untyped nil".to_string()),
            (container, key) => {
                return Err(format!(
                    "can't index item of type {} with {}",
                    container.type_name(),
                    key.type_name()
                ))
            }
        };
    }

    Ok(current)
}

/// Operands are separated by a space when neither side is a string.
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !matches!(arg, Value::Str(_)) && !matches!(args[i - 1], Value::Str(_)) {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    out
}

fn sprintln(args: &[Value]) -> String {
    let mut out = args
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    out.push('\n');
    out
}

fn builtin_printf(args: &[Value]) -> FuncResult {
    min_arity(args, 1)?;
    let format = string_arg(args, 0)?;
    Ok(Value::Str(sprintf(format, &args[1..])))
}

fn bad_verb(verb: char, arg: &Value) -> String {
    format!("%!{}({}={})", verb, arg.type_name(), arg)
}

pub(crate) fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut next = 0;
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(next) else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        next += 1;

        let formatted = match (verb, arg) {
            ('v', _) => arg.to_string(),
            ('s', Value::Str(s)) => s.clone(),
            ('s', Value::List(_) | Value::Map(_) | Value::Record(_)) => arg.to_string(),
            ('d', Value::Int(i)) => i.to_string(),
            ('t', Value::Bool(b)) => b.to_string(),
            ('q', Value::Str(s)) => go_quote(s),
            _ => bad_verb(verb, arg),
        };
        out.push_str(&formatted);
    }

    if next < args.len() {
        let extra = args[next..]
            .iter()
            .map(|a| format!("{}={}", a.type_name(), a))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("%!(EXTRA {})", extra));
    }

    out
}

/// `default "fallback" .Value` yields the fallback when the value is empty.
fn builtin_default(args: &[Value]) -> FuncResult {
    min_arity(args, 1)?;
    if args.len() > 2 {
        return Err(format!(
            "wrong number of args: want at most 2 got {}",
            args.len()
        ));
    }
    match args.get(1) {
        Some(given) if given.is_truthy() => Ok(given.clone()),
        _ => Ok(args[0].clone()),
    }
}

fn builtin_empty(args: &[Value]) -> FuncResult {
    arity(args, 1)?;
    Ok(Value::Bool(!args[0].is_truthy()))
}

fn builtin_coalesce(args: &[Value]) -> FuncResult {
    Ok(args
        .iter()
        .find(|v| v.is_truthy())
        .cloned()
        .unwrap_or(Value::Nil))
}

/// `ternary "yes" "no" .Cond`
fn builtin_ternary(args: &[Value]) -> FuncResult {
    arity(args, 3)?;
    match &args[2] {
        Value::Bool(true) => Ok(args[0].clone()),
        Value::Bool(false) => Ok(args[1].clone()),
        other => Err(format!(
            "wrong type for argument 3: expected bool; got {}",
            other.type_name()
        )),
    }
}

/// Largest string `repeat` may produce.
const MAX_REPEAT_BYTES: usize = 16 << 20;

fn builtin_repeat(args: &[Value]) -> FuncResult {
    arity(args, 2)?;
    let count = match &args[0] {
        Value::Int(n) if *n < 0 => return Err(format!("negative repeat count {}", n)),
        Value::Int(n) => usize::try_from(*n).unwrap_or(usize::MAX),
        other => {
            return Err(format!(
                "wrong type for argument 1: expected int; got {}",
                other.type_name()
            ))
        }
    };
    let s = string_arg(args, 1)?;
    match s.len().checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_BYTES => Ok(Value::Str(s.repeat(count))),
        _ => Err(format!(
            "repeat count {} too large for string of length {}",
            count,
            s.len()
        )),
    }
}

fn builtin_join(args: &[Value]) -> FuncResult {
    arity(args, 2)?;
    let sep = string_arg(args, 0)?;
    match &args[1] {
        Value::List(items) => Ok(Value::Str(
            items
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(sep),
        )),
        Value::Str(s) => Ok(Value::Str(s.clone())),
        other => Err(format!(
            "wrong type for argument 2: expected list; got {}",
            other.type_name()
        )),
    }
}

pub(crate) fn go_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

fn slugify(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Splits on separators and on lower-to-upper case boundaries:
/// `fooBar-baz_QUX` -> `foo`, `Bar`, `baz`, `QUX`.
fn split_words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in s.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

fn join_words(s: &str, sep: &str) -> String {
    split_words(s)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(sep)
}

fn to_title_case(s: &str) -> String {
    split_words(s)
        .iter()
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn to_camel_case(s: &str) -> String {
    split_words(s)
        .iter()
        .enumerate()
        .map(|(i, w)| if i == 0 { w.to_lowercase() } else { capitalize(w) })
        .collect()
}
