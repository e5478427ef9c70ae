// src/utils.rs
// Quote-aware CSV field helpers shared by the metrics store and the
// batch manifest parser

/// Split one CSV line into fields, honoring double-quoted fields and
/// doubled-quote escapes. Embedded newlines are not supported; both the
/// metrics store and the manifest write one record per line.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Quote a field when it contains a delimiter, quote, or newline.
pub fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn join_csv_line(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| escape_csv_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_fields() {
        assert_eq!(split_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv_line("a,,c"), vec!["a", "", "c"]);
    }

    #[test]
    fn splits_quoted_fields() {
        assert_eq!(
            split_csv_line(r#"a,"b, with comma",c"#),
            vec!["a", "b, with comma", "c"]
        );
        assert_eq!(
            split_csv_line(r#""say ""hi""",done"#),
            vec![r#"say "hi""#, "done"]
        );
    }

    #[test]
    fn escape_round_trips() {
        let nasty = r#"rate limit, "again""#;
        let line = join_csv_line(&["x", nasty, "y"]);
        assert_eq!(split_csv_line(&line), vec!["x", nasty, "y"]);
    }

    #[test]
    fn plain_fields_stay_unquoted() {
        assert_eq!(escape_csv_field("plain"), "plain");
        assert_eq!(join_csv_line(&["a", "b"]), "a,b");
    }
}
