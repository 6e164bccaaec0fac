/// Named Parameter Formatting
///
/// Statement templates name their parameters as `?name`. Each placeholder is
/// replaced with the literal a [`ParamSource`] renders for that name, so the
/// statement sent to the server carries no bind parameters at all.

use super::ParamSource;
use crate::core::{RelbindError, Result};

fn is_name_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Substitutes every `?name` placeholder in `template`.
///
/// `??` produces a literal `?`, a `?` not followed by a name is copied as is,
/// and nothing inside single-quoted strings is substituted.
///
/// # Errors
///
/// Returns whatever `params` reports for an unknown name (normally
/// `UnknownColumn`), or `Query` when the result is not valid UTF-8.
pub fn format_query(template: &str, params: &dyn ParamSource) -> Result<String> {
    let src = template.as_bytes();
    let mut out = Vec::with_capacity(src.len());
    let mut in_string = false;
    let mut i = 0;

    while i < src.len() {
        let c = src[i];
        if c == b'\'' {
            in_string = !in_string;
        }
        if c != b'?' || in_string {
            out.push(c);
            i += 1;
            continue;
        }
        if src.get(i + 1) == Some(&b'?') {
            out.push(b'?');
            i += 2;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < src.len() && is_name_byte(src[end]) {
            end += 1;
        }
        if end == start {
            out.push(b'?');
            i += 1;
            continue;
        }
        params.append_param(&mut out, &template[start..end])?;
        i = end;
    }

    String::from_utf8(out).map_err(|e| RelbindError::Query(format!("Formatted query is not valid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Params(HashMap<&'static str, &'static str>);

    impl ParamSource for Params {
        fn append_param(&self, b: &mut Vec<u8>, name: &str) -> Result<()> {
            match self.0.get(name) {
                Some(literal) => {
                    b.extend_from_slice(literal.as_bytes());
                    Ok(())
                }
                None => Err(RelbindError::UnknownColumn {
                    record: "Params",
                    column: name.to_string(),
                }),
            }
        }
    }

    fn params() -> Params {
        Params(HashMap::from([("id", "10"), ("name", "'user 1'")]))
    }

    #[test]
    fn test_substitutes_named_placeholders() {
        let sql = format_query("SELECT * FROM author WHERE id = ?id AND name = ?name", &params()).unwrap();
        assert_eq!(sql, "SELECT * FROM author WHERE id = 10 AND name = 'user 1'");
    }

    #[test]
    fn test_escapes_and_literals() {
        assert_eq!(format_query("SELECT ??", &params()).unwrap(), "SELECT ?");
        assert_eq!(format_query("SELECT ? , ?id", &params()).unwrap(), "SELECT ? , 10");
        assert_eq!(
            format_query("SELECT '?id' || ?id", &params()).unwrap(),
            "SELECT '?id' || 10"
        );
    }

    #[test]
    fn test_unknown_parameter() {
        match format_query("SELECT ?missing", &params()) {
            Err(RelbindError::UnknownColumn { column, .. }) => assert_eq!(column, "missing"),
            other => panic!("Expected UnknownColumn, got {:?}", other),
        }
    }
}
