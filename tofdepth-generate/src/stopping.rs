use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tofdepth::gsto::{read_header, write_header};
use tofdepth_data::DataFormat;

/// Copies the header of an ASCII stopping file with `format=binary` and
/// writes every data value as a little-endian f64. Returns the number of
/// values written.
pub fn convert_to_binary(input: &Path, output: &Path) -> usize {
    let file = File::open(input).expect("failed to open stopping file");
    let mut reader = BufReader::new(file);
    let (mut header, header_lines) = read_header(&mut reader).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    });
    if header.format != DataFormat::Ascii {
        eprintln!("Error: {:?} is not an ASCII stopping file", input);
        std::process::exit(1);
    }
    header.format = DataFormat::Binary;

    let out = File::create(output).expect("failed to create output file");
    let mut out = BufWriter::new(out);
    out.write_all(write_header(&header).as_bytes())
        .expect("failed to write header");

    let mut values = 0;
    for (i, line) in reader.lines().enumerate() {
        let line = line.expect("failed to read stopping file");
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value: f64 = line.parse().unwrap_or_else(|_| {
            eprintln!("Error: line {}: '{line}' is not a number", header_lines + i + 1);
            std::process::exit(4);
        });
        out.write_all(&value.to_le_bytes())
            .expect("failed to write data");
        values += 1;
    }
    out.flush().expect("failed to write data");

    if values % header.x_points != 0 {
        eprintln!(
            "Warning: {values} values do not fill whole blocks of {} points",
            header.x_points
        );
    }
    values
}
