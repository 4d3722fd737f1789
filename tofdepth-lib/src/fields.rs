use std::str::FromStr;

/// Splits a record line into fields without touching the line itself.
///
/// Consecutive delimiters collapse, so `"  1   2"` yields `"1"` and `"2"`.
/// Every field is a slice of the input.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    line: &'a str,
    pos: usize,
    delimiters: &'static [char],
}

pub const WHITESPACE: &[char] = &[' ', '\t', '\r', '\n'];

impl<'a> Fields<'a> {
    pub fn new(line: &'a str) -> Self {
        Self::with_delimiters(line, WHITESPACE)
    }

    pub fn with_delimiters(line: &'a str, delimiters: &'static [char]) -> Self {
        Fields {
            line,
            pos: 0,
            delimiters,
        }
    }

    /// Next field parsed as `T`; `None` when the line is exhausted or the
    /// field does not parse.
    pub fn parse_next<T: FromStr>(&mut self) -> Option<T> {
        self.next().and_then(|field| field.parse().ok())
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let line = self.line;
        let delimiters = self.delimiters;
        let start = match line[self.pos..]
            .char_indices()
            .find(|(_, c)| !delimiters.contains(c))
        {
            Some((offset, _)) => self.pos + offset,
            None => {
                self.pos = line.len();
                return None;
            }
        };
        let end = line[start..]
            .char_indices()
            .find(|(_, c)| delimiters.contains(c))
            .map_or(line.len(), |(offset, _)| start + offset);
        self.pos = end;
        Some(&line[start..end])
    }
}

/// Splits a nuclide label such as `4He` or `He` into mass number and symbol.
///
/// A missing mass number is returned as `None`; a label made only of digits
/// has no symbol and is rejected.
pub fn split_nuclide(label: &str) -> Option<(Option<u32>, &str)> {
    let label = label.trim();
    let digits = label.chars().take_while(|c| c.is_ascii_digit()).count();
    let symbol = label[digits..].trim_start_matches('-');
    if symbol.is_empty() {
        return None;
    }
    let mass_number = if digits > 0 {
        Some(label[..digits].parse().ok()?)
    } else {
        None
    };
    Some((mass_number, symbol))
}
