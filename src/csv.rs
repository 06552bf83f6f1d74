//! Delimited-text helpers shared by the dataset loader, the file sinks and
//! the assignment table.

/// Escape a value for CSV: wrap in quotes if it contains comma, quote, or newline.
pub fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render one record, terminated by `\n`.
pub fn write_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Parse CSV text into records.
///
/// Quoted fields may span lines and contain doubled quotes. Blank lines are
/// skipped. A leading UTF-8 BOM is ignored.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut current)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut current));
                push_record(&mut records, std::mem::take(&mut record));
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() || !record.is_empty() {
        record.push(current);
        push_record(&mut records, record);
    }
    records
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.len() == 1 && record[0].trim().is_empty();
    if !blank {
        records.push(record);
    }
}

/// Header row mapped to column positions.
#[derive(Debug, Clone)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns: columns.into_iter().map(|c| c.trim().to_string()).collect(),
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get<'a>(&self, record: &'a [String], name: &str) -> Option<&'a str> {
        self.position(name)
            .and_then(|i| record.get(i))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_quotes_only_when_needed() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn parses_quoted_multiline_fields() {
        let text = "id,text\n1,\"first line\nsecond, with comma\"\n2,plain\n";
        let records = parse_records(text);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1][1], "first line\nsecond, with comma");
        assert_eq!(records[2], vec!["2", "plain"]);
    }

    #[test]
    fn handles_crlf_bom_and_blank_lines() {
        let text = "\u{feff}a,b\r\n\r\n1,2\r\n";
        let records = parse_records(text);
        assert_eq!(records, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn keeps_trailing_empty_field() {
        let records = parse_records("x,y,\n");
        assert_eq!(records, vec![vec!["x", "y", ""]]);
    }

    #[test]
    fn written_records_parse_back() {
        let fields = ["u", "7", "He said \"go\", loudly", "multi\nline", ""];
        let line = write_record(&fields);
        let parsed = parse_records(&line);
        assert_eq!(parsed, vec![fields.to_vec()]);
    }

    #[test]
    fn header_looks_up_columns() {
        let header = Header::new(vec!["id".into(), " HATE_SPEECH ".into()]);
        let record = vec!["3".to_string(), "text".to_string()];
        assert_eq!(header.get(&record, "HATE_SPEECH"), Some("text"));
        assert_eq!(header.get(&record, "missing"), None);
    }
}
