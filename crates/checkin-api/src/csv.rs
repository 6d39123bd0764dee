//! Minimal RFC 4180 reading and writing for attendance exports and roster
//! imports.

/// Prepended to exports so spreadsheet tools detect UTF-8.
pub const UTF8_BOM: char = '\u{feff}';

pub fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Appends one CRLF-terminated row.
pub fn write_row<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(field.as_ref()));
    }
    out.push_str("\r\n");
}

/// A parsed row and the 1-based line it starts on.
#[derive(Debug, PartialEq)]
pub struct CsvRow {
    pub line: usize,
    pub fields: Vec<String>,
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("Unterminated quoted field starting on line {line}")]
pub struct CsvError {
    pub line: usize,
}

/// Splits `text` into rows. Quoted fields may contain commas, doubled quotes
/// and line breaks. Blank lines are dropped; a leading BOM is ignored.
pub fn parse(text: &str) -> Result<Vec<CsvRow>, CsvError> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut row_start = 1;
    let mut quote_start = 1;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_start = line;
            }
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                fields.push(std::mem::take(&mut field));
                push_row(&mut rows, row_start, std::mem::take(&mut fields));
                line += 1;
                row_start = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CsvError { line: quote_start });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        push_row(&mut rows, row_start, fields);
    }

    Ok(rows)
}

fn push_row(rows: &mut Vec<CsvRow>, line: usize, fields: Vec<String>) {
    let blank = fields.iter().all(|f| f.trim().is_empty());
    if !blank {
        rows.push(CsvRow { line, fields });
    }
}
