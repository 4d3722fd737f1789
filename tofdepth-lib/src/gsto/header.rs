use std::io::BufRead;

use log::debug;
use tofdepth_data::{DataFormat, StoppingHeader, StoppingUnit, XScale, XUnit};

use crate::error::{Result, TofDepthError};
use crate::fields::Fields;

pub const END_OF_HEADER: &str = "==END-OF-HEADER==";

/// Comment lines in the data section start with this character.
pub const COMMENT: char = '#';

const HEADER_DELIMITERS: &[char] = &['=', '\n', '\r', '\t'];

fn keyword_match<T: Copy>(value: &str, choices: &[T], keyword: fn(T) -> &'static str) -> Option<T> {
    choices.iter().copied().find(|&c| value.starts_with(keyword(c)))
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str, line: usize) -> Result<T> {
    value.trim().parse().map_err(|_| {
        TofDepthError::StoppingData(format!("line {line}: bad value '{value}' for {key}"))
    })
}

/// Reads header lines up to and including the end-of-header sentinel.
///
/// Returns the header together with the number of lines consumed, so that
/// data line numbers in messages match the file.
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<(StoppingHeader, usize)> {
    let mut header = StoppingHeader::default();
    let mut line = String::new();
    let mut lineno = 0;
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| TofDepthError::StoppingData(e.to_string()))?;
        if read == 0 {
            return Err(TofDepthError::StoppingData(format!(
                "missing {END_OF_HEADER} after {lineno} lines"
            )));
        }
        lineno += 1;
        if line.starts_with(END_OF_HEADER) {
            debug!("end of headers on line {lineno}");
            break;
        }
        let mut fields = Fields::with_delimiters(&line, HEADER_DELIMITERS);
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "source" => header.source = Some(value.to_string()),
            "z1-min" => header.z1_min = Some(parse_value(key, value, lineno)?),
            "z1-max" => header.z1_max = Some(parse_value(key, value, lineno)?),
            "z2-min" => header.z2_min = Some(parse_value(key, value, lineno)?),
            "z2-max" => header.z2_max = Some(parse_value(key, value, lineno)?),
            "sto-unit" => {
                header.stopping_unit =
                    keyword_match(value, &[StoppingUnit::Ev15Cm2], StoppingUnit::keyword)
                        .unwrap_or_default();
            }
            "x-unit" => {
                header.x_unit = keyword_match(
                    value,
                    &[XUnit::MetersPerSecond, XUnit::KevPerNucleon],
                    XUnit::keyword,
                )
                .unwrap_or_default();
            }
            "format" => {
                header.format =
                    keyword_match(value, &[DataFormat::Ascii, DataFormat::Binary], DataFormat::keyword)
                        .unwrap_or_default();
            }
            "x-scale" => {
                header.x_scale =
                    keyword_match(value, &[XScale::Linear, XScale::Log10], XScale::keyword)
                        .unwrap_or_default();
            }
            "x-min" => header.x_min = parse_value(key, value, lineno)?,
            "x-max" => header.x_max = parse_value(key, value, lineno)?,
            "x-points" => header.x_points = parse_value(key, value, lineno)?,
            other => debug!("ignoring header key '{other}' on line {lineno}"),
        }
    }
    validate(&header)?;
    Ok((header, lineno))
}

fn validate(header: &StoppingHeader) -> Result<()> {
    if header.x_points < 2 {
        return Err(TofDepthError::StoppingData(format!(
            "x-points must be at least 2, got {}",
            header.x_points
        )));
    }
    if !(header.x_max > header.x_min) {
        return Err(TofDepthError::StoppingData(format!(
            "x-max {} must exceed x-min {}",
            header.x_max, header.x_min
        )));
    }
    if header.x_scale == XScale::Log10 && header.x_min <= 0.0 {
        return Err(TofDepthError::StoppingData(
            "log10 scale needs a positive x-min".to_string(),
        ));
    }
    Ok(())
}

/// Header text as found at the top of a stopping file.
pub fn write_header(header: &StoppingHeader) -> String {
    let mut out = String::new();
    if let Some(source) = &header.source {
        out.push_str(&format!("source={source}\n"));
    }
    for (key, value) in [
        ("z1-min", header.z1_min),
        ("z1-max", header.z1_max),
        ("z2-min", header.z2_min),
        ("z2-max", header.z2_max),
    ] {
        if let Some(value) = value {
            out.push_str(&format!("{key}={value}\n"));
        }
    }
    out.push_str(&format!("sto-unit={}\n", header.stopping_unit.keyword()));
    out.push_str(&format!("x-unit={}\n", header.x_unit.keyword()));
    out.push_str(&format!("format={}\n", header.format.keyword()));
    out.push_str(&format!("x-min={:e}\n", header.x_min));
    out.push_str(&format!("x-max={:e}\n", header.x_max));
    out.push_str(&format!("x-points={}\n", header.x_points));
    out.push_str(&format!("x-scale={}\n", header.x_scale.keyword()));
    out.push_str(END_OF_HEADER);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
source=srim2013
z1-min=1
z1-max=92
z2-min=1
z2-max=92
sto-unit=eV/(1e15 atoms/cm2)
x-unit=keV/u
format=ascii
x-min=10
x-max=10000
x-points=500
x-scale=log10
==END-OF-HEADER==
1.0
";

    #[test]
    fn test_read_header() {
        let mut reader = HEADER.as_bytes();
        let (header, lines) = read_header(&mut reader).unwrap();
        assert_eq!(lines, 13);
        assert_eq!(header.source.as_deref(), Some("srim2013"));
        assert_eq!(header.z1_max, Some(92));
        assert_eq!(header.stopping_unit, StoppingUnit::Ev15Cm2);
        assert_eq!(header.x_unit, XUnit::KevPerNucleon);
        assert_eq!(header.format, DataFormat::Ascii);
        assert_eq!(header.x_scale, XScale::Log10);
        assert_eq!(header.x_points, 500);
        assert_eq!(header.x_min, 10.0);
        assert_eq!(header.x_max, 10000.0);
        // the reader is left on the first data line
        assert_eq!(reader, b"1.0\n");
    }

    #[test]
    fn test_binary_format_keyword() {
        let text = HEADER.replace("format=ascii", "format=binary");
        let (header, _) = read_header(&mut text.as_bytes()).unwrap();
        assert_eq!(header.format, DataFormat::Binary);
    }

    #[test]
    fn test_missing_sentinel() {
        let text = "x-min=1\nx-max=2\n";
        assert!(read_header(&mut text.as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_empty_domain() {
        let text = HEADER.replace("x-max=10000", "x-max=10");
        assert!(read_header(&mut text.as_bytes()).is_err());
    }

    #[test]
    fn test_written_header_reads_back() {
        let (header, _) = read_header(&mut HEADER.as_bytes()).unwrap();
        let text = write_header(&header);
        let (again, _) = read_header(&mut text.as_bytes()).unwrap();
        assert_eq!(header, again);
    }
}
