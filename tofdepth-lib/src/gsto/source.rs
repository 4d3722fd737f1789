use std::io::{BufRead, Read, Seek, SeekFrom};
use std::path::PathBuf;

use log::debug;
use tofdepth_data::{DataFormat, StoppingHeader, StoppingKind, XUnit};

use crate::constants::{SPEED_OF_LIGHT_SQUARED, STOPPING_AMU, STOPPING_KEV};
use crate::error::{Result, TofDepthError};
use crate::gsto::header::{COMMENT, read_header};
use crate::interp::{grid_position, lerp_at};

/// What a caller declares about a stopping file before it is read.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub kind: StoppingKind,
    pub z1_min: u32,
    pub z1_max: u32,
    pub z2_min: u32,
    pub z2_max: u32,
}

/// One stopping data file and the blocks read from it.
///
/// Values are held in a single buffer with one `x_points` block per
/// (Z1, Z2) of the declared range, clipped to the owning table's maximum
/// atomic numbers. Only blocks assigned to this source are filled.
#[derive(Debug, Clone)]
pub struct StoppingSource {
    pub(crate) descriptor: SourceDescriptor,
    pub(crate) header: StoppingHeader,
    z1_last: u32,
    z2_last: u32,
    data: Vec<f64>,
    loaded: bool,
}

impl StoppingSource {
    pub(crate) fn new(descriptor: SourceDescriptor) -> Self {
        StoppingSource {
            descriptor,
            header: StoppingHeader::default(),
            z1_last: 0,
            z2_last: 0,
            data: Vec::new(),
            loaded: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    /// Header as read from the file; defaults until the source is loaded.
    pub fn header(&self) -> &StoppingHeader {
        &self.header
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn covers(&self, z1: u32, z2: u32) -> bool {
        let d = &self.descriptor;
        (d.z1_min..=d.z1_max).contains(&z1) && (d.z2_min..=d.z2_max).contains(&z2)
    }

    fn block_offset(&self, z1: u32, z2: u32) -> usize {
        let d = &self.descriptor;
        let row = (self.z2_last - d.z2_min + 1) as usize;
        ((z1 - d.z1_min) as usize * row + (z2 - d.z2_min) as usize) * self.header.x_points
    }

    /// Tabulated values for (`z1`, `z2`); empty if not loaded.
    pub fn values(&self, z1: u32, z2: u32) -> &[f64] {
        if !self.loaded || !self.covers(z1, z2) || z1 > self.z1_last || z2 > self.z2_last {
            return &[];
        }
        let start = self.block_offset(z1, z2);
        &self.data[start..start + self.header.x_points]
    }

    /// Converts a speed in m/s into this file's x unit.
    pub fn native_x(&self, v: f64) -> f64 {
        match self.header.x_unit {
            XUnit::KevPerNucleon => {
                let gamma = 1.0 / (1.0 - v * v / SPEED_OF_LIGHT_SQUARED).sqrt();
                (gamma - 1.0) * SPEED_OF_LIGHT_SQUARED / (STOPPING_KEV / STOPPING_AMU)
            }
            XUnit::MetersPerSecond | XUnit::None => v,
        }
    }

    /// Stopping for (`z1`, `z2`) at speed `v`, zero outside the open domain.
    pub(crate) fn interpolate(&self, z1: u32, z2: u32, v: f64) -> f64 {
        let h = &self.header;
        let x = self.native_x(v);
        if !(x > h.x_min && x < h.x_max) {
            return 0.0;
        }
        let values = self.values(z1, z2);
        if values.len() < h.x_points {
            return 0.0;
        }
        let position = grid_position(x, h.x_min, h.x_max, h.x_points, h.x_scale);
        lerp_at(values, position)
    }

    /// Reads the header and the blocks `is_assigned` selects.
    ///
    /// Blocks are stored Z1-major, then Z2, then x. Records past
    /// (`z1_limit`, `z2_limit`) are never needed and are not read.
    pub(crate) fn load_from<R, F>(
        &mut self,
        reader: &mut R,
        z1_limit: u32,
        z2_limit: u32,
        is_assigned: F,
    ) -> Result<()>
    where
        R: BufRead + Seek,
        F: Fn(u32, u32) -> bool,
    {
        let (header, header_lines) = read_header(reader)?;
        self.header = header;
        let d = &self.descriptor;
        self.z1_last = d.z1_max.min(z1_limit);
        self.z2_last = d.z2_max.min(z2_limit);
        if self.z1_last < d.z1_min || self.z2_last < d.z2_min {
            self.data.clear();
            self.loaded = true;
            return Ok(());
        }
        let blocks = (self.z1_last - d.z1_min + 1) as usize * (self.z2_last - d.z2_min + 1) as usize;
        self.data = vec![0.0; blocks * self.header.x_points];

        let wanted: Vec<(u32, u32)> = (d.z1_min..=self.z1_last)
            .flat_map(|z1| (d.z2_min..=d.z2_max).map(move |z2| (z1, z2)))
            .collect();
        let last_wanted = wanted
            .iter()
            .rposition(|&(z1, z2)| z2 <= self.z2_last && is_assigned(z1, z2));
        let Some(last_wanted) = last_wanted else {
            debug!("{}: no assigned combinations, nothing read", d.name);
            self.loaded = true;
            return Ok(());
        };

        let mut cursor = DataCursor {
            lineno: header_lines,
            line: String::new(),
            name: &self.descriptor.name,
        };
        let format = self.header.format;
        let points = self.header.x_points;
        for &(z1, z2) in &wanted[..=last_wanted] {
            if z2 <= self.z2_last && is_assigned(z1, z2) {
                let start = self.block_offset(z1, z2);
                let block = &mut self.data[start..start + points];
                match format {
                    DataFormat::Binary => cursor.read_binary(reader, block, z1, z2)?,
                    DataFormat::Ascii | DataFormat::None => {
                        cursor.read_ascii(reader, block, z1, z2)?
                    }
                }
            } else {
                match format {
                    DataFormat::Binary => cursor.skip_binary(reader, points)?,
                    DataFormat::Ascii | DataFormat::None => cursor.skip_ascii(reader, points)?,
                }
            }
        }
        self.loaded = true;
        Ok(())
    }
}

struct DataCursor<'a> {
    lineno: usize,
    line: String,
    name: &'a str,
}

impl DataCursor<'_> {
    fn premature_end(&self, z1: u32, z2: u32) -> TofDepthError {
        TofDepthError::StoppingData(format!(
            "{} ended prematurely at line {} while reading Z1={z1} Z2={z2}",
            self.name, self.lineno
        ))
    }

    /// Advances to the next non-comment line; `false` at end of file.
    fn next_data_line<R: BufRead>(&mut self, reader: &mut R) -> Result<bool> {
        loop {
            self.line.clear();
            let read = reader
                .read_line(&mut self.line)
                .map_err(|e| TofDepthError::StoppingData(format!("{}: {e}", self.name)))?;
            if read == 0 {
                return Ok(false);
            }
            self.lineno += 1;
            if self.line.starts_with(COMMENT) {
                debug!("{}: comment on line {}: {}", self.name, self.lineno, self.line[1..].trim_end());
                continue;
            }
            return Ok(true);
        }
    }

    fn read_ascii<R: BufRead>(&mut self, reader: &mut R, block: &mut [f64], z1: u32, z2: u32) -> Result<()> {
        for value in block.iter_mut() {
            if !self.next_data_line(reader)? {
                return Err(self.premature_end(z1, z2));
            }
            let field = self.line.split_whitespace().next().unwrap_or("");
            *value = field.parse().map_err(|_| {
                TofDepthError::StoppingData(format!(
                    "{}: line {}: cannot read stopping value '{field}'",
                    self.name, self.lineno
                ))
            })?;
        }
        Ok(())
    }

    fn skip_ascii<R: BufRead>(&mut self, reader: &mut R, points: usize) -> Result<()> {
        for _ in 0..points {
            if !self.next_data_line(reader)? {
                return Err(TofDepthError::StoppingData(format!(
                    "{} ended prematurely at line {} while skipping",
                    self.name, self.lineno
                )));
            }
        }
        Ok(())
    }

    fn read_binary<R: Read>(&mut self, reader: &mut R, block: &mut [f64], z1: u32, z2: u32) -> Result<()> {
        let mut bytes = [0u8; 8];
        for value in block.iter_mut() {
            reader
                .read_exact(&mut bytes)
                .map_err(|_| self.premature_end(z1, z2))?;
            *value = f64::from_le_bytes(bytes);
        }
        Ok(())
    }

    fn skip_binary<R: Seek>(&mut self, reader: &mut R, points: usize) -> Result<()> {
        reader
            .seek(SeekFrom::Current((points * 8) as i64))
            .map_err(|e| TofDepthError::StoppingData(format!("{}: {e}", self.name)))?;
        Ok(())
    }
}
