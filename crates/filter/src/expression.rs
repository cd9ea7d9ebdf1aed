use crate::Predicate;
use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use trove_expr::Expression;
use trove_record::Record;

/// Accepts records for which an expression is truthy.
#[derive(Debug, Clone)]
pub struct FilterPredicate {
    expression: Expression,
}

impl FilterPredicate {
    pub fn new(source: &str) -> Result<Self> {
        let expression = Expression::compile(source).or_raise(|| ErrorKind::Expression(source.to_string()))?;
        Ok(Self { expression })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

impl From<Expression> for FilterPredicate {
    fn from(expression: Expression) -> Self {
        Self { expression }
    }
}

impl Predicate for FilterPredicate {
    fn check(&mut self, _url: &str, record: &Record) -> Result<bool> {
        self.expression.test(record).map_err(reraise)
    }
}

/// `abort()` and `terminate()` keep their meaning. Anything else the
/// expression raises becomes a filter failure for this record only.
#[track_caller]
fn reraise(err: trove_expr::Error) -> Error {
    let kind = match &*err {
        trove_expr::ErrorKind::Stop => ErrorKind::Stop,
        trove_expr::ErrorKind::Terminate => ErrorKind::Terminate,
        other => ErrorKind::Filter(other.to_string()),
    };
    err.raise(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record() -> Record {
        Record::new().with("width", 1920).with("extension", "jpg").with("title", "Sunset")
    }

    #[rstest]
    #[case("width >= 1000", true)]
    #[case("extension == 'png'", false)]
    #[case("title and width", true)]
    #[case("''", false)]
    fn test_truthiness(#[case] source: &str, #[case] expected: bool) {
        assert_eq!(FilterPredicate::new(source).unwrap().check("", &record()).unwrap(), expected);
    }

    #[rstest]
    #[case("abort()", ErrorKind::Stop)]
    #[case("terminate()", ErrorKind::Terminate)]
    fn test_signals_pass_through(#[case] source: &str, #[case] expected: ErrorKind) {
        let err = FilterPredicate::new(source).unwrap().check("", &record()).unwrap_err();
        assert_eq!(*err, expected);
        assert!(err.is_signal());
    }

    #[rstest]
    #[case("height > 10")]
    #[case("title + 1")]
    #[case("width / 0")]
    fn test_runtime_faults_become_filter_errors(#[case] source: &str) {
        let err = FilterPredicate::new(source).unwrap().check("", &record()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Filter(_)), "{source}");
        assert!(!err.is_signal());
    }

    #[test]
    fn test_invalid_expression() {
        let err = FilterPredicate::new("width >").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Expression(_)));
    }
}
