//! CSV decoding with encoding and delimiter auto-detection.
//!
//! Turns uploaded bytes into a [`Table`]. The [`response`] submodule parses
//! generation output, which is always comma-separated UTF-8.

pub mod response;

use std::collections::HashSet;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::{Cell, Table};

pub use response::parse_response;

/// Result of decoding with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Decoded table
    pub table: Table,
    /// Detected encoding
    pub encoding: String,
    /// Detected delimiter
    pub delimiter: char,
    /// Column headers, in file order
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let content = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            let (decoded, _, had_errors) = encoding_rs::ISO_8859_15.decode(bytes);
            if had_errors {
                return Err(CsvError::Encoding(format!("invalid {} sequence", encoding)));
            }
            decoded.into_owned()
        }
        "windows-1252" | "cp1252" => {
            let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
            if had_errors {
                return Err(CsvError::Encoding(format!("invalid {} sequence", encoding)));
            }
            decoded.into_owned()
        }
        // Unknown charset: lossy UTF-8
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    // Excel likes to prepend a byte order mark
    Ok(content.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with an explicit delimiter into a table.
///
/// # Example
/// ```ignore
/// use refiner::parser::parse_csv_str;
///
/// let table = parse_csv_str("name;age\nAlice;30\nBob;", ';').unwrap();
///
/// assert_eq!(table.row_count(), 2);
/// assert_eq!(table.column_names(), vec!["name", "age"]);
/// ```
pub fn parse_csv_str(content: &str, delimiter: char) -> CsvResult<Table> {
    let (_, table) = read_table(content, delimiter)?;
    Ok(table)
}

/// Parse CSV file with auto-detection of encoding and delimiter.
///
/// # Example
/// ```ignore
/// let result = parse_csv_file_auto("/path/to/file.csv")?;
/// println!("Encoding: {}, Delimiter: '{}'", result.encoding, result.delimiter);
/// println!("Rows: {}", result.table.row_count());
/// ```
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CsvError::Empty);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let (headers, table) = read_table(&content, delimiter)?;

    Ok(ParseResult {
        table,
        encoding,
        delimiter,
        headers,
    })
}

/// Read headers and records, inferring cell types.
fn read_table(content: &str, delimiter: char) -> CsvResult<(Vec<String>, Table)> {
    if content.trim().is_empty() {
        return Err(CsvError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    // Blank lines never reach us; a line of bare delimiters is a row of nulls.
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::infer).collect());
    }

    let table = Table::from_rows(dedupe_headers(headers.clone()), rows)?;
    Ok((headers, table))
}

/// Name blank headers `Unnamed: i` and suffix repeats with `.1`, `.2`, ...
pub(crate) fn dedupe_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for (i, name) in raw.into_iter().enumerate() {
        let base = if name.is_empty() { format!("Unnamed: {}", i) } else { name };
        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_csv() {
        let table = parse_csv_str("name;age\nAlice;30\nBob;25", ';').unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("name").unwrap().cells[0], Cell::Text("Alice".into()));
        assert_eq!(table.column("age").unwrap().cells[1], Cell::Number(25.0));
    }

    #[test]
    fn test_quoted_values() {
        let csv = "name;value\n\"Alice\";\"Hello; World\"";
        let table = parse_csv_str(csv, ';').unwrap();

        assert_eq!(table.column("value").unwrap().cells[0], Cell::Text("Hello; World".into()));
    }

    #[test]
    fn test_empty_lines_skipped() {
        let table = parse_csv_str("a,b\n1,2\n\n3,4\n", ',').unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_missing_values_are_null() {
        let table = parse_csv_str("a;b;c\n1;;3\n4", ';').unwrap();

        assert_eq!(table.column("b").unwrap().cells[0], Cell::Null);
        assert_eq!(table.column("c").unwrap().cells[1], Cell::Null);
    }

    #[test]
    fn test_extra_columns_ignored() {
        let table = parse_csv_str("a;b\n1;2;3;4", ';').unwrap();

        assert_eq!(table.column_count(), 2);
        assert_eq!(table.column("b").unwrap().cells[0], Cell::Number(2.0));
    }

    #[test]
    fn test_empty_csv_error() {
        assert!(matches!(parse_csv_str("", ';'), Err(CsvError::Empty)));
        assert!(matches!(parse_bytes_auto(b"  \n"), Err(CsvError::Empty)));
    }

    #[test]
    fn test_header_only_gives_empty_table() {
        let table = parse_csv_str("a,b\n", ',').unwrap();
        assert_eq!(table.column_count(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_repeated_headers_renamed() {
        let result = parse_bytes_auto(b"name,name\nalice,bob\n").unwrap();

        assert_eq!(result.table.column_names(), vec!["name", "name.1"]);
        assert_eq!(result.table.column("name.1").unwrap().cells[0], Cell::Text("bob".into()));
        assert_eq!(result.headers, vec!["name", "name"]);
    }

    #[test]
    fn test_trailing_delimiters_give_unnamed_columns() {
        let result = parse_bytes_auto(b"name,age,,\nalice,3,,\n").unwrap();

        assert_eq!(
            result.table.column_names(),
            vec!["name", "age", "Unnamed: 2", "Unnamed: 3"]
        );
        assert_eq!(result.table.row_count(), 1);
        assert_eq!(result.table.column("Unnamed: 3").unwrap().cells[0], Cell::Null);
    }

    #[test]
    fn test_delimiter_only_rows_kept_as_nulls() {
        let table = parse_csv_str("a,b\n1,2\n,\n", ',').unwrap();

        assert_eq!(table.row_count(), 2);
        assert!(table.row(1).unwrap().iter().all(|c| c.is_null()));
    }

    #[test]
    fn test_delimiter_only_rows_are_not_empty_input() {
        let result = parse_bytes_auto(b"a;b\n;\n").unwrap();
        assert_eq!(result.table.row_count(), 1);
    }

    #[test]
    fn test_detect_delimiter_semicolon() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
    }

    #[test]
    fn test_detect_delimiter_comma() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
    }

    #[test]
    fn test_detect_delimiter_tab() {
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
    }

    #[test]
    fn test_detect_delimiter_single_column() {
        assert_eq!(detect_delimiter("name\nalice"), ',');
    }

    #[test]
    fn test_auto_parse() {
        let result = parse_bytes_auto(b"name;age\nAlice;30\nBob;25").unwrap();

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.table.row_count(), 2);
        assert_eq!(result.headers, vec!["name", "age"]);
    }

    #[test]
    fn test_bom_stripped() {
        let result = parse_bytes_auto("\u{feff}name,age\nAlice,30".as_bytes()).unwrap();
        assert_eq!(result.headers, vec!["name", "age"]);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }
}
