//! Literal parameter substitution for dry-run logging.
//!
//! The output is for humans reading logs. It is never executed.

use querypool_protocol::Value;

/// Replaces each `?` placeholder outside quoted literals with the next
/// parameter rendered as an SQL literal.
///
/// Surplus placeholders stay as `?`; surplus parameters are ignored.
#[must_use]
pub fn substitute(sql: &str, parameters: &[Value]) -> String {
    let mut rendered = String::with_capacity(sql.len());
    let mut remaining = parameters.iter();
    let mut quote: Option<char> = None;

    for ch in sql.chars() {
        match (quote, ch) {
            (Some(open), _) if ch == open => {
                quote = None;
                rendered.push(ch);
            }
            (Some(_), _) => rendered.push(ch),
            (None, '\'' | '"') => {
                quote = Some(ch);
                rendered.push(ch);
            }
            (None, '?') => match remaining.next() {
                Some(value) => push_literal(&mut rendered, value),
                None => rendered.push('?'),
            },
            (None, _) => rendered.push(ch),
        }
    }
    rendered
}

fn push_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(true) => out.push_str("TRUE"),
        Value::Bool(false) => out.push_str("FALSE"),
        Value::Integer(number) => out.push_str(&number.to_string()),
        Value::Real(number) => out.push_str(&format!("{number:?}")),
        Value::Text(text) => {
            out.push('\'');
            out.push_str(&text.replace('\'', "''"));
            out.push('\'');
        }
        Value::Blob(bytes) => {
            out.push_str("X'");
            for byte in bytes {
                out.push_str(&format!("{byte:02X}"));
            }
            out.push('\'');
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::integer("select * from t where id = ?", vec![Value::Integer(7)], "select * from t where id = 7")]
    #[case::text("select ?", vec![Value::from("it's")], "select 'it''s'")]
    #[case::null_and_bool("values (?, ?)", vec![Value::Null, Value::Bool(false)], "values (NULL, FALSE)")]
    #[case::real("select ?", vec![Value::Real(2.0)], "select 2.0")]
    #[case::blob("select ?", vec![Value::Blob(vec![0xde, 0xad])], "select X'DEAD'")]
    fn renders_literals(#[case] sql: &str, #[case] parameters: Vec<Value>, #[case] expected: &str) {
        assert_eq!(substitute(sql, &parameters), expected);
    }

    #[test]
    fn placeholders_inside_literals_are_left_alone() {
        let rendered = substitute("select '?', ? from t", &[Value::Integer(1)]);
        assert_eq!(rendered, "select '?', 1 from t");
    }

    #[test]
    fn surplus_placeholders_survive() {
        assert_eq!(substitute("select ?, ?", &[Value::Integer(1)]), "select 1, ?");
    }
}
