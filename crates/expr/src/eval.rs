use crate::error::{ErrorKind, Result};
use crate::parser::{BinaryOp, Call, CompareOp, Expr, UnaryOp};
use crate::re::{Match, Pattern, ReFunction};
use exn::{OptionExt, ResultExt};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use trove_record::{Record, Value};
use url::{Host, ParseError, Position, Url};

/// Anything an expression can produce. Only [`Object::Value`] can live in a
/// record; the rest exist while evaluating (functions, bound methods, regex
/// objects).
#[derive(Debug, Clone)]
pub(crate) enum Object {
    Value(Value),
    Builtin(Builtin),
    Method(Box<Object>, String),
    ReModule,
    ReFunction(ReFunction),
    Pattern(Arc<Pattern>),
    Match(Arc<Match>),
}

impl Object {
    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            Self::Value(value) => value.is_truthy(),
            _ => true,
        }
    }

    /// Converts the result of an evaluation into a plain value. Match objects
    /// become the list of all their groups, whole match first.
    pub(crate) fn into_value(self) -> Result<Value> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Match(m) => Ok(m.to_value()),
            Self::Pattern(p) => Ok(Value::from(p.source())),
            other => exn::bail!(ErrorKind::Type(format!("'{}' object cannot be used as a value", other.type_name()))),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Value(value) => value.type_name(),
            Self::Builtin(_) | Self::ReFunction(_) => "builtin_function_or_method",
            Self::Method(..) => "method",
            Self::ReModule => "module",
            Self::Pattern(_) => "re.Pattern",
            Self::Match(_) => "re.Match",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    ParseInt,
    UrlSplit,
    DateTime,
    Abort,
    Terminate,
    Len,
    Int,
    Float,
    Str,
    Bool,
    Abs,
    Min,
    Max,
    Any,
    All,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "parse_int" => Self::ParseInt,
            "urlsplit" => Self::UrlSplit,
            "datetime" => Self::DateTime,
            "abort" => Self::Abort,
            "terminate" => Self::Terminate,
            "len" => Self::Len,
            "int" => Self::Int,
            "float" => Self::Float,
            "str" => Self::Str,
            "bool" => Self::Bool,
            "abs" => Self::Abs,
            "min" => Self::Min,
            "max" => Self::Max,
            "any" => Self::Any,
            "all" => Self::All,
            _ => return None,
        })
    }
}

/// Evaluated call arguments.
struct Args {
    function: String,
    positional: Vec<Value>,
    keyword: Vec<(String, Value)>,
}

impl Args {
    fn get(&self, index: usize, keyword: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keyword.iter().find(|(k, _)| k == keyword).map(|(_, v)| v))
    }

    fn required(&self, index: usize, keyword: &str) -> Result<&Value> {
        self.get(index, keyword)
            .ok_or_raise(|| ErrorKind::Type(format!("{}() missing required argument '{keyword}'", self.function)))
    }

    fn string(&self, index: usize, keyword: &str) -> Result<&str> {
        expect_str(self.required(index, keyword)?)
    }

    fn int_or(&self, index: usize, keyword: &str, default: i64) -> Result<i64> {
        match self.get(index, keyword) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => expect_int(value),
        }
    }
}

pub(crate) fn evaluate(expr: &Expr, record: &Record) -> Result<Object> {
    match expr {
        Expr::Literal(value) => Ok(Object::Value(value.clone())),
        Expr::Name(name) => lookup(record, name),
        Expr::List(items) => {
            let items = items.iter().map(|item| value_of(item, record)).collect::<Result<Vec<_>>>()?;
            Ok(Object::Value(Value::List(items)))
        },
        Expr::Attr(target, name) => get_attr(evaluate(target, record)?, name),
        Expr::Index(target, key) => {
            let target = evaluate(target, record)?;
            let key = value_of(key, record)?;
            get_item(target, &key)
        },
        Expr::Slice(target, parts) => {
            let target = value_of(target, record)?;
            let mut bounds = [None; 3];
            for (bound, part) in bounds.iter_mut().zip(parts) {
                if let Some(part) = part {
                    *bound = match value_of(part, record)? {
                        Value::Null => None,
                        value => Some(expect_int(&value)?),
                    };
                }
            }
            let [start, stop, step] = bounds;
            if step == Some(0) {
                exn::bail!(ErrorKind::Value("slice step cannot be zero".to_string()));
            }
            let sliced = target.slice(start, stop, step).ok_or_raise(|| {
                ErrorKind::Type(format!("'{}' object is not subscriptable", target.type_name()))
            })?;
            Ok(Object::Value(sliced))
        },
        Expr::Call(callee, call) => {
            let callee = evaluate(callee, record)?;
            let args = evaluate_args(name_of(&callee), call, record)?;
            call_object(callee, args)
        },
        Expr::Regex(function, pattern, call) => {
            let args = evaluate_args(format!("re.{function:?}").to_lowercase(), call, record)?;
            call_re(*function, Arc::clone(pattern), &args)
        },
        Expr::Unary(UnaryOp::Not, operand) => Ok(Object::Value(Value::Bool(!evaluate(operand, record)?.is_truthy()))),
        Expr::Unary(op, operand) => unary(*op, value_of(operand, record)?).map(Object::Value),
        Expr::Binary(op, left, right) => {
            let left = value_of(left, record)?;
            let right = value_of(right, record)?;
            binary(*op, left, right).map(Object::Value)
        },
        Expr::Compare(first, rest) => {
            let mut left = value_of(first, record)?;
            for (op, right) in rest {
                let right = value_of(right, record)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Object::Value(Value::Bool(false)));
                }
                left = right;
            }
            Ok(Object::Value(Value::Bool(true)))
        },
        Expr::And(left, right) => {
            let left = evaluate(left, record)?;
            if !left.is_truthy() {
                return Ok(left);
            }
            evaluate(right, record)
        },
        Expr::Or(left, right) => {
            let left = evaluate(left, record)?;
            if left.is_truthy() {
                return Ok(left);
            }
            evaluate(right, record)
        },
        Expr::Conditional { test, body, orelse } => {
            if evaluate(test, record)?.is_truthy() {
                evaluate(body, record)
            } else {
                evaluate(orelse, record)
            }
        },
    }
}

fn value_of(expr: &Expr, record: &Record) -> Result<Value> {
    evaluate(expr, record)?.into_value()
}

fn evaluate_args(function: String, call: &Call, record: &Record) -> Result<Args> {
    Ok(Args {
        function,
        positional: call.args.iter().map(|arg| value_of(arg, record)).collect::<Result<_>>()?,
        keyword: call
            .kwargs
            .iter()
            .map(|(name, arg)| Ok((name.clone(), value_of(arg, record)?)))
            .collect::<Result<_>>()?,
    })
}

fn name_of(callee: &Object) -> String {
    match callee {
        Object::Builtin(builtin) => format!("{builtin:?}").to_lowercase(),
        Object::ReFunction(function) => format!("re.{function:?}").to_lowercase(),
        Object::Method(_, name) => name.clone(),
        other => other.type_name().to_string(),
    }
}

fn lookup(record: &Record, name: &str) -> Result<Object> {
    if let Some(value) = record.get(name) {
        return Ok(Object::Value(value.clone()));
    }
    if name == "re" {
        return Ok(Object::ReModule);
    }
    Builtin::lookup(name).map(Object::Builtin).ok_or_raise(|| ErrorKind::Name(name.to_string()))
}

/// Upper bound on the length of `str * int` (in bytes) and `list * int`.
const MAX_REPEAT_LEN: usize = 1 << 24;

const STR_METHODS: &[&str] = &[
    "lower", "upper", "strip", "lstrip", "rstrip", "startswith", "endswith", "split", "replace", "find", "isdigit",
    "join", "count",
];
const MAP_METHODS: &[&str] = &["get", "keys", "values", "items"];
const LIST_METHODS: &[&str] = &["count", "index"];

fn get_attr(target: Object, name: &str) -> Result<Object> {
    let method = |target: Object| Ok(Object::Method(Box::new(target), name.to_string()));
    match target {
        Object::Value(Value::String(_)) if STR_METHODS.contains(&name) => method(target),
        Object::Value(Value::Map(_)) if MAP_METHODS.contains(&name) => method(target),
        Object::Value(Value::List(_)) if LIST_METHODS.contains(&name) => method(target),
        Object::Value(Value::DateTime(_)) if name == "timestamp" => method(target),
        Object::Value(ref value) => {
            let found = value.attr(name);
            found.map(Object::Value).ok_or_raise(|| no_attribute(target.type_name(), name))
        },
        Object::Builtin(Builtin::DateTime) if matches!(name, "now" | "utcnow") => method(target),
        Object::ReModule => ReFunction::from_name(name)
            .map(Object::ReFunction)
            .ok_or_raise(|| ErrorKind::Type(format!("module 're' has no attribute '{name}'"))),
        Object::Pattern(ref pattern) if name == "pattern" => Ok(Object::Value(Value::from(pattern.source()))),
        Object::Pattern(_) if ReFunction::from_name(name).is_some_and(|f| f != ReFunction::Compile) => method(target),
        Object::Match(_) if matches!(name, "group" | "groups") => method(target),
        other => exn::bail!(no_attribute(other.type_name(), name)),
    }
}

fn no_attribute(type_name: &str, name: &str) -> ErrorKind {
    ErrorKind::Type(format!("'{type_name}' object has no attribute '{name}'"))
}

fn get_item(target: Object, key: &Value) -> Result<Object> {
    match (target, key) {
        (Object::Match(m), Value::Int(i)) => {
            let index = usize::try_from(*i).or_raise(|| ErrorKind::Index)?;
            m.group(index).map(Object::Value).ok_or_raise(|| ErrorKind::Index)
        },
        (Object::Value(value), key) => match value.item(key) {
            Some(item) => Ok(Object::Value(item)),
            None => match (&value, key) {
                (Value::Map(_), Value::String(k)) => exn::bail!(ErrorKind::Key(k.clone())),
                (Value::Map(_), other) => exn::bail!(ErrorKind::Key(other.repr())),
                (Value::List(_) | Value::String(_), Value::Int(_) | Value::Bool(_)) => exn::bail!(ErrorKind::Index),
                (Value::List(_) | Value::String(_), other) => exn::bail!(ErrorKind::Type(format!(
                    "indices must be integers, not {}",
                    other.type_name()
                ))),
                (other, _) => {
                    exn::bail!(ErrorKind::Type(format!("'{}' object is not subscriptable", other.type_name())))
                },
            },
        },
        (other, _) => exn::bail!(ErrorKind::Type(format!("'{}' object is not subscriptable", other.type_name()))),
    }
}

fn call_object(callee: Object, args: Args) -> Result<Object> {
    match callee {
        Object::Builtin(builtin) => call_builtin(builtin, &args),
        Object::ReFunction(function) => {
            let source = args.string(0, "pattern")?;
            let pattern = Pattern::new(source)
                .or_raise(|| ErrorKind::Value(format!("invalid regular expression {source:?}")))?;
            let rest = Args {
                function: args.function.clone(),
                positional: args.positional.get(1..).unwrap_or_default().to_vec(),
                keyword: args.keyword.iter().filter(|(k, _)| k != "pattern").cloned().collect(),
            };
            call_re(function, Arc::new(pattern), &rest)
        },
        Object::Method(receiver, name) => call_method(*receiver, &name, &args),
        other => exn::bail!(ErrorKind::Type(format!("'{}' object is not callable", other.type_name()))),
    }
}

fn call_re(function: ReFunction, pattern: Arc<Pattern>, args: &Args) -> Result<Object> {
    let found = |m: Option<Match>| Ok(m.map_or(Object::Value(Value::Null), |m| Object::Match(Arc::new(m))));
    match function {
        ReFunction::Compile => Ok(Object::Pattern(pattern)),
        ReFunction::Search => found(pattern.search(args.string(0, "string")?)),
        ReFunction::Match => found(pattern.match_start(args.string(0, "string")?)),
        ReFunction::FullMatch => found(pattern.full_match(args.string(0, "string")?)),
        ReFunction::Sub => {
            let replacement = args.string(0, "repl")?;
            let haystack = args.string(1, "string")?;
            let count = usize::try_from(args.int_or(2, "count", 0)?).unwrap_or(0);
            Ok(Object::Value(Value::from(pattern.sub(replacement, haystack, count))))
        },
        ReFunction::FindAll => Ok(Object::Value(Value::List(pattern.find_all(args.string(0, "string")?)))),
        ReFunction::Split => {
            let max_split = usize::try_from(args.int_or(1, "maxsplit", 0)?).unwrap_or(0);
            Ok(Object::Value(Value::List(pattern.split(args.string(0, "string")?, max_split))))
        },
    }
}

fn call_method(receiver: Object, name: &str, args: &Args) -> Result<Object> {
    let value = match receiver {
        Object::Value(value) => value,
        Object::Builtin(Builtin::DateTime) => return Ok(Object::Value(Value::DateTime(now()))),
        Object::Pattern(pattern) => {
            let function = ReFunction::from_name(name).ok_or_raise(|| no_attribute("re.Pattern", name))?;
            return call_re(function, pattern, args);
        },
        Object::Match(m) if name == "groups" => return Ok(Object::Value(m.groups())),
        Object::Match(m) => {
            let index = usize::try_from(args.int_or(0, "group", 0)?).or_raise(|| ErrorKind::Index)?;
            return m.group(index).map(Object::Value).ok_or_raise(|| ErrorKind::Index);
        },
        other => exn::bail!(no_attribute(other.type_name(), name)),
    };
    let result = match (&value, name) {
        (Value::String(s), _) => string_method(s, name, args)?,
        (Value::Map(map), "get") => {
            let key = expect_str(args.required(0, "key")?)?;
            map.get(key).cloned().unwrap_or_else(|| args.get(1, "default").cloned().unwrap_or_default())
        },
        (Value::Map(map), "keys") => Value::List(map.keys().map(|k| Value::from(k.as_str())).collect()),
        (Value::Map(map), "values") => Value::List(map.values().cloned().collect()),
        (Value::Map(map), "items") => {
            Value::List(map.iter().map(|(k, v)| Value::List(vec![Value::from(k.as_str()), v.clone()])).collect())
        },
        (Value::List(items), "count") => {
            let needle = args.required(0, "value")?;
            Value::from(items.iter().filter(|item| py_eq(item, needle)).count())
        },
        (Value::List(items), "index") => {
            let needle = args.required(0, "value")?;
            let position = items.iter().position(|item| py_eq(item, needle));
            Value::from(position.ok_or_raise(|| ErrorKind::Value(format!("{} is not in list", needle.repr())))?)
        },
        (Value::DateTime(dt), "timestamp") => {
            let utc = dt.assume_utc();
            Value::Float(utc.unix_timestamp() as f64 + f64::from(utc.microsecond()) / 1e6)
        },
        _ => exn::bail!(no_attribute(value.type_name(), name)),
    };
    Ok(Object::Value(result))
}

fn string_method(s: &str, name: &str, args: &Args) -> Result<Value> {
    let strip_set = |index: usize| -> Result<Option<Vec<char>>> {
        match args.get(index, "chars") {
            None | Some(Value::Null) => Ok(None),
            Some(chars) => Ok(Some(expect_str(chars)?.chars().collect())),
        }
    };
    Ok(match name {
        "lower" => Value::from(s.to_lowercase()),
        "upper" => Value::from(s.to_uppercase()),
        "strip" | "lstrip" | "rstrip" => {
            let set = strip_set(0)?;
            let in_set = |c: char| set.as_ref().map_or(c.is_whitespace(), |set| set.contains(&c));
            Value::from(match name {
                "strip" => s.trim_matches(in_set),
                "lstrip" => s.trim_start_matches(in_set),
                _ => s.trim_end_matches(in_set),
            })
        },
        "startswith" | "endswith" => {
            let candidates = match args.required(0, "prefix")? {
                Value::List(items) => items.iter().map(expect_str).collect::<Result<Vec<_>>>()?,
                other => vec![expect_str(other)?],
            };
            let hit = candidates.iter().any(|c| if name == "startswith" { s.starts_with(c) } else { s.ends_with(c) });
            Value::Bool(hit)
        },
        "split" => {
            let max_split = usize::try_from(args.int_or(1, "maxsplit", -1)?).ok();
            match args.get(0, "sep") {
                None | Some(Value::Null) => Value::List(split_whitespace(s, max_split)),
                Some(sep) => {
                    let sep = expect_str(sep)?;
                    if sep.is_empty() {
                        exn::bail!(ErrorKind::Value("empty separator".to_string()));
                    }
                    let parts: Vec<Value> = match max_split {
                        Some(n) => s.splitn(n + 1, sep).map(Value::from).collect(),
                        None => s.split(sep).map(Value::from).collect(),
                    };
                    Value::List(parts)
                },
            }
        },
        "replace" => {
            let (old, new) = (args.string(0, "old")?, args.string(1, "new")?);
            match usize::try_from(args.int_or(2, "count", -1)?) {
                Ok(count) => Value::from(s.replacen(old, new, count)),
                Err(_) => Value::from(s.replace(old, new)),
            }
        },
        "find" => {
            let needle = args.string(0, "sub")?;
            Value::Int(s.find(needle).map_or(-1, |byte| s[..byte].chars().count() as i64))
        },
        "isdigit" => Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
        "join" => {
            let items = iterate(args.required(0, "iterable")?)?;
            let parts = items.iter().map(|item| expect_str(item).map(str::to_string)).collect::<Result<Vec<_>>>()?;
            Value::from(parts.join(s))
        },
        "count" => {
            let needle = args.string(0, "sub")?;
            if needle.is_empty() {
                Value::from(s.chars().count() + 1)
            } else {
                Value::from(s.matches(needle).count())
            }
        },
        _ => exn::bail!(no_attribute("str", name)),
    })
}

fn split_whitespace(s: &str, max_split: Option<usize>) -> Vec<Value> {
    let mut out = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if max_split.is_some_and(|max| out.len() >= max) {
            out.push(Value::from(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                out.push(Value::from(&rest[..end]));
                rest = rest[end..].trim_start();
            },
            None => {
                out.push(Value::from(rest));
                break;
            },
        }
    }
    out
}

fn call_builtin(builtin: Builtin, args: &Args) -> Result<Object> {
    let value = match builtin {
        Builtin::Abort => exn::bail!(ErrorKind::Stop),
        Builtin::Terminate => exn::bail!(ErrorKind::Terminate),
        Builtin::ParseInt => {
            let value = args.required(0, "value")?;
            value.parse_int().map_or_else(|| args.get(1, "default").cloned().unwrap_or(Value::Int(0)), Value::Int)
        },
        Builtin::UrlSplit => url_split(args.string(0, "url")?),
        Builtin::DateTime => Value::DateTime(make_datetime(args)?),
        Builtin::Len => match args.required(0, "obj")? {
            Value::String(s) => Value::from(s.chars().count()),
            Value::List(items) => Value::from(items.len()),
            Value::Map(map) => Value::from(map.len()),
            other => exn::bail!(ErrorKind::Type(format!("object of type '{}' has no len()", other.type_name()))),
        },
        Builtin::Int => Value::Int(to_int(args)?),
        Builtin::Float => match args.get(0, "x") {
            None => Value::Float(0.0),
            Some(Value::String(s)) => Value::Float(
                s.trim().replace('_', "").parse::<f64>().or_raise(|| {
                    ErrorKind::Value(format!("could not convert string to float: {}", Value::from(s.as_str()).repr()))
                })?,
            ),
            Some(other) => Value::Float(other.as_f64().ok_or_raise(|| {
                ErrorKind::Type(format!("float() argument must be a string or a number, not '{}'", other.type_name()))
            })?),
        },
        Builtin::Str => Value::from(args.get(0, "object").map(ToString::to_string).unwrap_or_default()),
        Builtin::Bool => Value::Bool(args.get(0, "x").is_some_and(Value::is_truthy)),
        Builtin::Abs => match args.required(0, "x")? {
            Value::Int(i) => i.checked_abs().map_or(Value::Float((*i as f64).abs()), Value::Int),
            Value::Bool(b) => Value::Int(i64::from(*b)),
            Value::Float(f) => Value::Float(f.abs()),
            other => exn::bail!(ErrorKind::Type(format!("bad operand type for abs(): '{}'", other.type_name()))),
        },
        Builtin::Min | Builtin::Max => {
            let candidates = match args.positional.as_slice() {
                [single] => iterate(single)?,
                many => many.to_vec(),
            };
            let wanted = if builtin == Builtin::Min { Ordering::Less } else { Ordering::Greater };
            let mut best: Option<Value> = None;
            for candidate in candidates {
                best = match best {
                    Some(current) if py_cmp(&candidate, &current)? != Some(wanted) => Some(current),
                    _ => Some(candidate),
                };
            }
            best.ok_or_raise(|| ErrorKind::Value(format!("{}() arg is an empty sequence", args.function)))?
        },
        Builtin::Any => Value::Bool(iterate(args.required(0, "iterable")?)?.iter().any(Value::is_truthy)),
        Builtin::All => Value::Bool(iterate(args.required(0, "iterable")?)?.iter().all(Value::is_truthy)),
    };
    Ok(Object::Value(value))
}

fn to_int(args: &Args) -> Result<i64> {
    let Some(value) = args.get(0, "x") else { return Ok(0) };
    let invalid = |s: &str| ErrorKind::Value(format!("invalid literal for int(): {}", Value::from(s).repr()));
    match value {
        Value::String(s) => match args.get(1, "base") {
            Some(base) => {
                let base = u32::try_from(expect_int(base)?).or_raise(|| ErrorKind::Value("invalid base".to_string()))?;
                if !(2..=36).contains(&base) {
                    exn::bail!(ErrorKind::Value("int() base must be >= 2 and <= 36".to_string()));
                }
                i64::from_str_radix(&s.trim().replace('_', ""), base).or_raise(|| invalid(s))
            },
            None => value.parse_int().ok_or_raise(|| invalid(s)),
        },
        Value::Float(f) if !f.is_finite() => {
            exn::bail!(ErrorKind::Value(format!("cannot convert float {} to integer", value)))
        },
        Value::Int(_) | Value::Bool(_) | Value::Float(_) => value.parse_int().ok_or_raise(|| invalid("")),
        other => exn::bail!(ErrorKind::Type(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn make_datetime(args: &Args) -> Result<PrimitiveDateTime> {
    let component = |index: usize, name: &str, default: Option<i64>| -> Result<i64> {
        match (args.get(index, name), default) {
            (Some(value), _) => expect_int(value),
            (None, Some(default)) => Ok(default),
            (None, None) => {
                exn::bail!(ErrorKind::Type(format!("datetime() missing required argument '{name}'")))
            },
        }
    };
    let out_of_range = || ErrorKind::Value("datetime component out of range".to_string());
    let year = i32::try_from(component(0, "year", None)?).or_raise(out_of_range)?;
    let month = u8::try_from(component(1, "month", None)?).or_raise(out_of_range)?;
    let month = Month::try_from(month).or_raise(out_of_range)?;
    let day = u8::try_from(component(2, "day", None)?).or_raise(out_of_range)?;
    let date = Date::from_calendar_date(year, month, day).or_raise(out_of_range)?;
    let hour = u8::try_from(component(3, "hour", Some(0))?).or_raise(out_of_range)?;
    let minute = u8::try_from(component(4, "minute", Some(0))?).or_raise(out_of_range)?;
    let second = u8::try_from(component(5, "second", Some(0))?).or_raise(out_of_range)?;
    let micro = u32::try_from(component(6, "microsecond", Some(0))?).or_raise(out_of_range)?;
    let time = Time::from_hms_micro(hour, minute, second, micro).or_raise(out_of_range)?;
    Ok(PrimitiveDateTime::new(date, time))
}

fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Splits a URL into `scheme`, `netloc`, `path`, `query` and `fragment`,
/// plus the lowercased `hostname` (or `None`). Anything that doesn't parse as
/// an absolute URL is treated as a relative reference.
fn url_split(url: &str) -> Value {
    let parts = match Url::parse(url) {
        Ok(parsed) => url_parts(&parsed, parsed.scheme()),
        Err(ParseError::RelativeUrlWithoutBase) if url.starts_with("//") => match Url::parse(&format!("http:{url}")) {
            Ok(parsed) => url_parts(&parsed, ""),
            Err(_) => relative_url_parts(url),
        },
        Err(_) => relative_url_parts(url),
    };
    Value::Map(parts.into_iter().map(|(key, value)| (key.to_string(), value)).collect())
}

fn url_parts(url: &Url, scheme: &str) -> [(&'static str, Value); 6] {
    let netloc = match url.has_authority() {
        true => &url[Position::BeforeUsername..Position::AfterPort],
        false => "",
    };
    let hostname = url.host().map(|host| match host {
        Host::Ipv6(addr) => addr.to_string(),
        host => host.to_string().to_lowercase(),
    });
    [
        ("scheme", Value::from(scheme)),
        ("netloc", Value::from(netloc)),
        ("path", Value::from(url.path())),
        ("query", Value::from(url.query().unwrap_or_default())),
        ("fragment", Value::from(url.fragment().unwrap_or_default())),
        ("hostname", Value::from(hostname)),
    ]
}

fn relative_url_parts(url: &str) -> [(&'static str, Value); 6] {
    let (rest, fragment) = url.split_once('#').unwrap_or((url, ""));
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    [
        ("scheme", Value::from("")),
        ("netloc", Value::from("")),
        ("path", Value::from(path)),
        ("query", Value::from(query)),
        ("fragment", Value::from(fragment)),
        ("hostname", Value::Null),
    ]
}

fn iterate(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
        Value::Map(map) => Ok(map.keys().map(|k| Value::from(k.as_str())).collect()),
        other => exn::bail!(ErrorKind::Type(format!("'{}' object is not iterable", other.type_name()))),
    }
}

fn expect_str(value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_raise(|| ErrorKind::Type(format!("expected str, got {}", value.type_name())))
}

fn expect_int(value: &Value) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => exn::bail!(ErrorKind::Type(format!("expected int, got {}", other.type_name()))),
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

fn number(value: &Value) -> Option<Number> {
    match value {
        Value::Bool(b) => Some(Number::Int(i64::from(*b))),
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Float(f) => Some(Number::Float(*f)),
        _ => None,
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, number(&value)) {
        (UnaryOp::Pos, Some(Number::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Number::Float(f))) => Ok(Value::Float(f)),
        (UnaryOp::Neg, Some(Number::Int(i))) => Ok(i.checked_neg().map_or(Value::Float(-(i as f64)), Value::Int)),
        (UnaryOp::Neg, Some(Number::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Not, _) => Ok(Value::Bool(!value.is_truthy())),
        (_, None) => exn::bail!(ErrorKind::Type(format!("bad operand type for unary operator: '{}'", value.type_name()))),
    }
}

/// How many copies `sequence * n` makes, refusing results longer than
/// [`MAX_REPEAT_LEN`]. Negative counts give an empty result.
fn repeat_count(len: usize, n: i64) -> Result<usize> {
    let times = usize::try_from(n).unwrap_or(0);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => exn::bail!(ErrorKind::Value(format!("repeated sequence would exceed {MAX_REPEAT_LEN} items"))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match (op, &left, &right) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => return Ok(Value::from(format!("{a}{b}"))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b).cloned().collect()));
        },
        (BinaryOp::Mul, Value::String(s), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::String(s)) => {
            let times = repeat_count(s.len(), *n)?;
            return Ok(Value::from(s.repeat(times)));
        },
        (BinaryOp::Mul, Value::List(items), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::List(items)) => {
            let times = repeat_count(items.len(), *n)?;
            return Ok(Value::List(items.iter().cloned().cycle().take(items.len() * times).collect()));
        },
        _ => {},
    }
    let (Some(a), Some(b)) = (number(&left), number(&right)) else {
        exn::bail!(ErrorKind::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            symbol(op),
            left.type_name(),
            right.type_name()
        )));
    };
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => int_arithmetic(op, a, b),
        (Number::Int(a), Number::Float(b)) => float_arithmetic(op, a as f64, b),
        (Number::Float(a), Number::Int(b)) => float_arithmetic(op, a, b as f64),
        (Number::Float(a), Number::Float(b)) => float_arithmetic(op, a, b),
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    }
}

/// Integer arithmetic, degrading to floats on overflow.
fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    if b == 0 && matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) {
        exn::bail!(ErrorKind::ZeroDivision);
    }
    let exact = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => return float_arithmetic(op, a as f64, b as f64),
        BinaryOp::FloorDiv => a.checked_div(b).map(|q| if a % b != 0 && (a < 0) != (b < 0) { q - 1 } else { q }),
        BinaryOp::Mod => a.checked_rem(b).map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r }),
        BinaryOp::Pow if b < 0 => {
            if a == 0 {
                exn::bail!(ErrorKind::ZeroDivision);
            }
            return Ok(Value::Float((a as f64).powf(b as f64)));
        },
        BinaryOp::Pow => u32::try_from(b).ok().and_then(|b| a.checked_pow(b)),
    };
    match exact {
        Some(value) => Ok(Value::Int(value)),
        None => float_arithmetic(op, a as f64, b as f64),
    }
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    if b == 0.0 && matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) {
        exn::bail!(ErrorKind::ZeroDivision);
    }
    if a == 0.0 && b < 0.0 && op == BinaryOp::Pow {
        exn::bail!(ErrorKind::ZeroDivision);
    }
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        },
        BinaryOp::Pow => a.powf(b),
    }))
}

/// Equality with numeric coercion (`1 == 1.0 == True`).
pub(crate) fn py_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(a), Value::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(a, b)| py_eq(a, b)),
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|other| py_eq(v, other)))
        },
        _ => match (number(a), number(b)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => a == b,
            (Some(a), Some(b)) => as_float(a) == as_float(b),
            _ => a == b,
        },
    }
}

fn as_float(n: Number) -> f64 {
    match n {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    }
}

/// Ordering for `<`-style comparisons. `Ok(None)` means unordered (NaN).
fn py_cmp(a: &Value, b: &Value) -> Result<Option<Ordering>> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::DateTime(a), Value::DateTime(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if !py_eq(x, y) {
                    return py_cmp(x, y);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        },
        _ => match (number(a), number(b)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => Ok(Some(a.cmp(&b))),
            (Some(a), Some(b)) => Ok(as_float(a).partial_cmp(&as_float(b))),
            _ => exn::bail!(ErrorKind::Type(format!(
                "ordering not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
    Ok(match op {
        CompareOp::Eq => py_eq(left, right),
        CompareOp::Ne => !py_eq(left, right),
        CompareOp::Lt => py_cmp(left, right)? == Some(Ordering::Less),
        CompareOp::Le => matches!(py_cmp(left, right)?, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => py_cmp(left, right)? == Some(Ordering::Greater),
        CompareOp::Ge => matches!(py_cmp(left, right)?, Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::In => contains(right, left)?,
        CompareOp::NotIn => !contains(right, left)?,
        CompareOp::Is => identical(left, right),
        CompareOp::IsNot => !identical(left, right),
    })
}

/// Identity only makes sense for the singletons `None`, `True` and `False`.
fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => false,
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::String(_), other) => exn::bail!(ErrorKind::Type(format!(
            "'in <string>' requires string as left operand, not {}",
            other.type_name()
        ))),
        (Value::List(items), item) => Ok(items.iter().any(|candidate| py_eq(candidate, item))),
        (Value::Map(map), Value::String(key)) => Ok(map.contains_key(key)),
        (Value::Map(_), _) => Ok(false),
        (other, _) => exn::bail!(ErrorKind::Type(format!("argument of type '{}' is not iterable", other.type_name()))),
    }
}
