//! Small Python-flavoured expression language evaluated against a [`Record`].
//!
//! Expressions are compiled once with [`Expression::compile`] and evaluated
//! per record. Names resolve against the record first, then against a fixed
//! set of globals:
//!
//! - `parse_int(value, default=0)`, `urlsplit(url)`
//! - `datetime(y, m, d[, H, M, S])`, `datetime.now()`, `datetime.utcnow()`
//! - `abort()` and `terminate()`, which raise [`ErrorKind::Stop`] and
//!   [`ErrorKind::Terminate`]
//! - the `re` module (`search`, `match`, `fullmatch`, `sub`, `findall`,
//!   `split`, `compile`)
//! - `len`, `int`, `float`, `str`, `bool`, `abs`, `min`, `max`, `any`, `all`
//!
//! ```
//! # use trove_expr::Expression;
//! # use trove_record::Record;
//! let filter = Expression::compile("width >= 1000 and extension in ('jpg', 'png')").unwrap();
//! let record = Record::new().with("width", 1920).with("extension", "png");
//! assert!(filter.test(&record).unwrap());
//! ```

mod error;
mod eval;
mod lexer;
mod parser;
mod re;

pub use crate::error::{Error, ErrorKind, Result};
use crate::parser::Expr;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use trove_record::{Record, Value};

/// A compiled expression. Cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct Expression {
    source: Arc<str>,
    root: Arc<Expr>,
}

impl Debug for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("Expression").field(&self.source).finish()
    }
}

impl Expression {
    /// Parses `source`. Regex literals given to `re.*` functions are compiled
    /// here as well, so an invalid pattern is reported as a syntax error.
    pub fn compile(source: &str) -> Result<Self> {
        let root = parser::parse(source)?;
        tracing::trace!(expression = source, "compiled expression");
        Ok(Self { source: Arc::from(source), root: Arc::new(root) })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, record: &Record) -> Result<Value> {
        eval::evaluate(&self.root, record)?.into_value()
    }

    /// Evaluates the expression and reports its truthiness.
    pub fn test(&self, record: &Record) -> Result<bool> {
        Ok(eval::evaluate(&self.root, record)?.is_truthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record() -> Record {
        serde_json::from_str(
            r#"{
                "id": 42,
                "title": "Sunset over Lake",
                "tags": ["nature", "sky"],
                "user": {"name": "ada", "id": 7},
                "ratio": 1.5,
                "url": "https://Example.com:8080/a/b.jpg?size=large#top",
                "empty": ""
            }"#,
        )
        .unwrap()
    }

    #[rstest]
    #[case("id == 42", Value::Bool(true))]
    #[case("id // 5", Value::Int(8))]
    #[case("-7 // 2", Value::Int(-4))]
    #[case("-7 % 3", Value::Int(2))]
    #[case("7 / 2", Value::Float(3.5))]
    #[case("2 ** 10", Value::Int(1024))]
    #[case("2 ** -1", Value::Float(0.5))]
    #[case("-2 ** 2", Value::Int(-4))]
    #[case("1 < id <= 42", Value::Bool(true))]
    #[case("1 < id < 10", Value::Bool(false))]
    #[case("1 == 1.0", Value::Bool(true))]
    #[case("'sky' in tags", Value::Bool(true))]
    #[case("'Lake' in title", Value::Bool(true))]
    #[case("'id' not in user", Value::Bool(false))]
    #[case("empty or 'fallback'", Value::from("fallback"))]
    #[case("id and title", Value::from("Sunset over Lake"))]
    #[case("'big' if ratio > 1 else 'small'", Value::from("big"))]
    #[case("user.name", Value::from("ada"))]
    #[case("user['id'] + 1", Value::Int(8))]
    #[case("tags[-1]", Value::from("sky"))]
    #[case("title[:6].lower()", Value::from("sunset"))]
    #[case("title[::-1][:4]", Value::from("ekaL"))]
    #[case("title.split()[1]", Value::from("over"))]
    #[case("'-'.join(tags)", Value::from("nature-sky"))]
    #[case("len(tags) + len(title)", Value::Int(18))]
    #[case("max(3, id, 7)", Value::Int(42))]
    #[case("min([3, 1, 2])", Value::Int(1))]
    #[case("int('12') + int(2.9)", Value::Int(14))]
    #[case("int('ff', 16)", Value::Int(255))]
    #[case("str(ratio)", Value::from("1.5"))]
    #[case("any([0, '', 3])", Value::Bool(true))]
    #[case("all(tags)", Value::Bool(true))]
    #[case("user.get('missing', 'x')", Value::from("x"))]
    #[case("user.get('missing') is None", Value::Bool(true))]
    #[case("None is None", Value::Bool(true))]
    #[case("parse_int('1_000')", Value::Int(1000))]
    #[case("parse_int('abc', -1)", Value::Int(-1))]
    #[case("parse_int('abc')", Value::Int(0))]
    #[case("[1, 2] + [3]", Value::from(vec![1, 2, 3]))]
    #[case("'ab' * 2", Value::from("abab"))]
    fn test_eval(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(Expression::compile(source).unwrap().eval(&record()).unwrap(), expected, "{source}");
    }

    #[test]
    fn test_urlsplit() {
        let expr = Expression::compile("urlsplit(url)").unwrap();
        let parts = expr.eval(&record()).unwrap();
        assert_eq!(parts.get("scheme"), Some(&Value::from("https")));
        assert_eq!(parts.get("netloc"), Some(&Value::from("example.com:8080")));
        assert_eq!(parts.get("hostname"), Some(&Value::from("example.com")));
        assert_eq!(parts.get("path"), Some(&Value::from("/a/b.jpg")));
        assert_eq!(parts.get("query"), Some(&Value::from("size=large")));
        assert_eq!(parts.get("fragment"), Some(&Value::from("top")));
        let path = Expression::compile("urlsplit(url).path.endswith('.jpg')").unwrap();
        assert!(path.test(&record()).unwrap());
    }

    #[rstest]
    #[case("text:hello", "text", "", "hello", Value::Null)]
    #[case("http://user:pw@[::1]:8080/x?q", "http", "user:pw@[::1]:8080", "/x", Value::from("::1"))]
    #[case("//cdn.example.com/img.png", "", "cdn.example.com", "/img.png", Value::from("cdn.example.com"))]
    #[case("images/a.jpg?w=10#frag", "", "", "images/a.jpg", Value::Null)]
    #[case("https://exa mple.com/x", "", "", "https://exa mple.com/x", Value::Null)]
    fn test_urlsplit_forms(
        #[case] url: &str,
        #[case] scheme: &str,
        #[case] netloc: &str,
        #[case] path: &str,
        #[case] hostname: Value,
    ) {
        let record = Record::new().with("url", url);
        let parts = Expression::compile("urlsplit(url)").unwrap().eval(&record).unwrap();
        assert_eq!(parts.get("scheme"), Some(&Value::from(scheme)), "{url}");
        assert_eq!(parts.get("netloc"), Some(&Value::from(netloc)), "{url}");
        assert_eq!(parts.get("path"), Some(&Value::from(path)), "{url}");
        assert_eq!(parts.get("hostname"), Some(&hostname), "{url}");
    }

    #[rstest]
    #[case(r"re.search(r'\d+', 'abc 123').group()", Value::from("123"))]
    #[case(r"re.match(r'\d+', 'abc 123')", Value::Null)]
    #[case(r"re.sub(r'(\w+) (\w+)', r'\2 \1', 'hello world')", Value::from("world hello"))]
    #[case(r"re.findall(r'[aeiou]', title)", Value::from(vec!["u", "e", "o", "e", "a", "e"]))]
    #[case(r"re.compile('(s)(k)').search('sky').groups()", Value::from(vec!["s", "k"]))]
    #[case(r"re.fullmatch('[a-z]+', user.name)[0]", Value::from("ada"))]
    #[case(r"re.split(' ', title, 1)", Value::from(vec!["Sunset", "over Lake"]))]
    fn test_regex(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(Expression::compile(source).unwrap().eval(&record()).unwrap(), expected, "{source}");
    }

    #[test]
    fn test_dynamic_regex_pattern() {
        let record = record().with("pattern", r"^sun");
        let expr = Expression::compile("bool(re.match(pattern, title.lower()))").unwrap();
        assert!(expr.test(&record).unwrap());
    }

    #[test]
    fn test_match_is_truthy() {
        let expr = Expression::compile("re.search('', title)").unwrap();
        assert!(expr.test(&record()).unwrap());
    }

    #[test]
    fn test_datetime() {
        let expr = Expression::compile("datetime(2024, 2, 29, 13).hour + datetime(2024, 1, 1).day").unwrap();
        assert_eq!(expr.eval(&Record::new()).unwrap(), Value::Int(14));
        let expr = Expression::compile("datetime.now() > datetime(2000, 1, 1)").unwrap();
        assert!(expr.test(&Record::new()).unwrap());
        let err = Expression::compile("datetime(2023, 2, 29)").unwrap().eval(&Record::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Value(_)));
    }

    #[rstest]
    #[case("abort()", ErrorKind::Stop)]
    #[case("terminate()", ErrorKind::Terminate)]
    #[case("id > 1 and abort()", ErrorKind::Stop)]
    fn test_signals(#[case] source: &str, #[case] expected: ErrorKind) {
        let err = Expression::compile(source).unwrap().test(&record()).unwrap_err();
        assert_eq!(*err, expected);
        assert!(err.is_signal());
    }

    #[test]
    fn test_short_circuit_skips_signal() {
        let expr = Expression::compile("id < 1 and abort()").unwrap();
        assert!(!expr.test(&record()).unwrap());
    }

    #[rstest]
    #[case("nope + 1")]
    #[case("1 / 0")]
    #[case("tags[5]")]
    #[case("user['nope']")]
    #[case("title + 1")]
    #[case("'a' < 1")]
    #[case("len(id)")]
    #[case("int('x')")]
    fn test_runtime_errors(#[case] source: &str) {
        let err = Expression::compile(source).unwrap().eval(&record()).unwrap_err();
        assert!(!err.is_signal(), "{source}");
    }

    #[test]
    fn test_error_kinds() {
        let eval = |source: &str| Expression::compile(source).unwrap().eval(&record()).unwrap_err();
        assert_eq!(*eval("nope"), ErrorKind::Name("nope".to_string()));
        assert_eq!(*eval("1 % 0"), ErrorKind::ZeroDivision);
        assert_eq!(*eval("tags[9]"), ErrorKind::Index);
        assert_eq!(*eval("user['x']"), ErrorKind::Key("x".to_string()));
    }

    #[rstest]
    #[case("'ab' * 9223372036854775807")]
    #[case("9223372036854775807 * tags")]
    #[case("'x' * 16777217")]
    #[case("[0] * 16777217")]
    fn test_repetition_is_bounded(#[case] source: &str) {
        let err = Expression::compile(source).unwrap().eval(&record()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Value(_)), "{source}");
    }

    #[rstest]
    #[case("len('x' * 16777216)", Value::Int(16_777_216))]
    #[case("'ab' * -3", Value::from(""))]
    #[case("tags * 0", Value::from(Vec::<Value>::new()))]
    fn test_repetition_edges(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(Expression::compile(source).unwrap().eval(&record()).unwrap(), expected, "{source}");
    }

    #[test]
    fn test_invalid_regex_literal_is_syntax_error() {
        let err = Expression::compile("re.search('[', title)").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Syntax(_)));
    }

    #[test]
    fn test_record_shadows_globals() {
        let record = Record::new().with("len", 3);
        assert_eq!(Expression::compile("len * 2").unwrap().eval(&record).unwrap(), Value::Int(6));
    }

    #[test]
    fn test_expression_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Expression>();
    }
}
