use directories::BaseDirs;
use std::env;

/// Expands a leading `~` to the home directory, then `$VAR` and `${VAR}`.
/// Unset variables are left as they are.
pub fn expand_path(path: &str) -> String {
    let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_string_lossy().into_owned());
    expand_with(path, home.as_deref(), |name| env::var(name).ok())
}

fn expand_with(path: &str, home: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> String {
    let path = match (path.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with(['/', std::path::MAIN_SEPARATOR]) => {
            format!("{home}{rest}")
        },
        _ => path.to_string(),
    };
    let mut out = String::with_capacity(path.len());
    let mut rest = path.as_str();
    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];
        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            },
            None => {
                let end = after.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(after.len());
                (&after[..end], end)
            },
        };
        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[dollar..dollar + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "DATA" => Some("/srv/data".to_string()),
            "USER" => Some("ada".to_string()),
            _ => None,
        }
    }

    #[rstest]
    #[case("~/pictures", "/home/ada/pictures")]
    #[case("~", "/home/ada")]
    #[case("~other/x", "~other/x")]
    #[case("$DATA/trove", "/srv/data/trove")]
    #[case("${DATA}-${USER}", "/srv/data-ada")]
    #[case("$MISSING/${MISSING}", "$MISSING/${MISSING}")]
    #[case("cost: $", "cost: $")]
    #[case("${DATA", "${DATA")]
    fn test_expand(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(expand_with(path, Some("/home/ada"), lookup), expected);
    }
}
