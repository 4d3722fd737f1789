//! Output binning, normalisation and the profile files written after a
//! reconstruction, plus reading those files back.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::constants::{AREAL_1E15_CM2, NM, UG_CM2};
use crate::error::{Result, TofDepthError};
use crate::events::{Event, EventCensus};
use crate::fields::Fields;
use crate::interp::interp_one;
use crate::masses::IsotopeTable;
use crate::setup::DepthSetup;

/// Output bins kept above the surface to show straggling and roughness.
pub const BINS_ABOVE_SURFACE: usize = 10;

/// The stable region ends where the total weight moves this many
/// counting uncertainties away from its first value.
pub const STABLE_REGION_SIGMAS: f64 = 4.0;

#[derive(Debug, Clone, Default)]
struct NuclideBins {
    weight: Vec<f64>,
    count: Vec<u32>,
}

/// Reconstructed events binned on the output depth grid.
#[derive(Debug, Clone)]
pub struct OutputProfile {
    output_step: f64,
    density: f64,
    nuclides: BTreeMap<(u32, u32), NuclideBins>,
    weight_sum: Vec<f64>,
    /// Areal mass of each bin (kg/m²).
    mass: Vec<f64>,
    count_sum: Vec<u32>,
    scale: f64,
}

impl OutputProfile {
    /// Bins `events` and derives the normalisation, either from the
    /// configured scaling window or from the stable region below the
    /// surface. Events that could not be placed (zero weight) are left out.
    pub fn new(setup: &DepthSetup, events: &[Event]) -> Self {
        let output_step = setup.output_step();
        let bins = (setup.depth_steps as f64 * setup.depth_step / output_step) as usize
            + BINS_ABOVE_SURFACE;
        let mut profile = OutputProfile {
            output_step,
            density: setup.density,
            nuclides: BTreeMap::new(),
            weight_sum: vec![0.0; bins],
            mass: vec![0.0; bins],
            count_sum: vec![0; bins],
            scale: 1.0,
        };

        let mut skipped = 0usize;
        for event in events {
            if event.weight <= 0.0 {
                skipped += 1;
                continue;
            }
            let ip = profile.bin_of(event.depth);
            let nuclide = profile
                .nuclides
                .entry((event.z, event.a))
                .or_insert_with(|| NuclideBins {
                    weight: vec![0.0; bins],
                    count: vec![0; bins],
                });
            nuclide.weight[ip] += event.weight;
            nuclide.count[ip] += 1;
            profile.weight_sum[ip] += event.weight;
            profile.mass[ip] += event.mass * event.weight;
            profile.count_sum[ip] += 1;
        }
        if skipped > 0 {
            debug!("{skipped} unplaced events left out of the output");
        }

        for (mass, &w) in profile.mass.iter_mut().zip(&profile.weight_sum) {
            *mass = if w > 0.0 { *mass * output_step / w } else { 0.0 };
        }

        profile.scale = match setup.scaling {
            Some((min, max)) => profile.window_mean(min, max),
            None => profile.stable_region_mean(),
        };
        info!("output concentrations scaled by {:.5e}", profile.scale);
        profile
    }

    pub fn bins(&self) -> usize {
        self.weight_sum.len()
    }

    pub fn output_step(&self) -> f64 {
        self.output_step
    }

    /// Output bin of `depth`, clamped to the grid.
    pub fn bin_of(&self, depth: f64) -> usize {
        let ip = (depth / self.output_step + BINS_ABOVE_SURFACE as f64) as i64;
        ip.clamp(0, self.bins() as i64 - 1) as usize
    }

    /// Depth at the middle of bin `ip`; negative above the surface.
    pub fn bin_centre(&self, ip: usize) -> f64 {
        (ip as f64 - BINS_ABOVE_SURFACE as f64 + 0.5) * self.output_step
    }

    /// Normalisation constant every written concentration is divided by.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Nuclides with at least one binned event.
    pub fn nuclides(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.nuclides.keys().copied()
    }

    pub fn weight(&self, z: u32, a: u32, ip: usize) -> f64 {
        self.nuclides.get(&(z, a)).map_or(0.0, |n| n.weight[ip])
    }

    pub fn count(&self, z: u32, a: u32, ip: usize) -> u32 {
        self.nuclides.get(&(z, a)).map_or(0, |n| n.count[ip])
    }

    pub fn total_weight(&self, ip: usize) -> f64 {
        self.weight_sum[ip]
    }

    pub fn total_count(&self, ip: usize) -> u32 {
        self.count_sum[ip]
    }

    /// Areal mass of bin `ip` (kg/m²).
    pub fn mass(&self, ip: usize) -> f64 {
        self.mass[ip]
    }

    fn window_mean(&self, min: f64, max: f64) -> f64 {
        let (minp, maxp) = (self.bin_of(min), self.bin_of(max));
        let sum: f64 = self.weight_sum[minp..maxp.max(minp)].iter().sum();
        if sum <= 0.0 || minp >= maxp {
            1.0
        } else {
            sum / (maxp - minp) as f64
        }
    }

    fn stable_region_mean(&self) -> f64 {
        let start = BINS_ABOVE_SURFACE + 2;
        let Some(&nominal) = self.weight_sum.get(start) else {
            return 1.0;
        };
        let max_change = STABLE_REGION_SIGMAS * nominal / (self.count_sum[start] as f64).sqrt();
        let (n, sum) = self.weight_sum[start..]
            .iter()
            .take_while(|&&w| (w - nominal).abs() < max_change)
            .fold((0usize, 0.0), |(n, sum), &w| (n + 1, sum + w));
        let mean = sum / n as f64;
        if mean.is_finite() && mean > 0.0 {
            debug!("stable region spans {n} output bins");
            mean
        } else {
            1.0
        }
    }

    /// Mass and linear depth of the surface, summed over the bins above it.
    fn surface(&self) -> (f64, f64) {
        let mass: f64 = self.mass.iter().take(BINS_ABOVE_SURFACE).sum();
        (mass, mass / self.density)
    }

    /// Writes the profile of one nuclide, one line per output bin.
    pub fn write_nuclide<W: Write>(&self, z: u32, a: u32, out: &mut W) -> io::Result<()> {
        let (mdep0, dep0) = self.surface();
        let (mut mdep, mut dep) = (0.0, 0.0);
        for ip in 0..self.bins() {
            let w = self.weight(z, a, ip);
            let n = self.count(z, a, ip);
            let relerr = if n > 0 { 1.0 / (n as f64).sqrt() } else { 1.0 };
            writeln!(
                out,
                "{:10.3} {:10.3} {:10.3}   {:10.5}  {:>14}  {:10.5}  {:10}",
                self.bin_centre(ip) / AREAL_1E15_CM2,
                (mdep - mdep0) / UG_CM2,
                (dep - dep0) / NM,
                w / self.scale,
                sci(w, 5),
                relerr * w / self.scale,
                n
            )?;
            mdep += self.mass[ip];
            dep += self.mass[ip] / self.density;
        }
        Ok(())
    }

    /// Writes the summed profile of all elements.
    pub fn write_total<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let (mdep0, dep0) = self.surface();
        let (mut mdep, mut dep) = (0.0, 0.0);
        for ip in 0..self.bins() {
            writeln!(
                out,
                "{:7.2} {:10.3} {:10.3} {:>10}",
                self.bin_centre(ip) / AREAL_1E15_CM2,
                (mdep - mdep0) / UG_CM2,
                (dep - dep0) / NM,
                sci(self.weight_sum[ip] / self.scale, 4)
            )?;
            mdep += self.mass[ip];
            dep += self.mass[ip] / self.density;
        }
        Ok(())
    }

    /// Writes `<prefix>.<Symbol>` per nuclide (`<prefix>.<A><Symbol>` when
    /// the element was seen with several mass numbers) and `<prefix>.total`.
    pub fn write_files(
        &self,
        prefix: &str,
        census: &EventCensus,
        masses: &IsotopeTable,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (z, a) in self.nuclides() {
            let symbol = masses.symbol(z).ok_or(TofDepthError::UnknownElement(z))?;
            let path = if census.mass_numbers(z).len() > 1 {
                PathBuf::from(format!("{prefix}.{a}{symbol}"))
            } else {
                PathBuf::from(format!("{prefix}.{symbol}"))
            };
            write_to(&path, |out| self.write_nuclide(z, a, out))?;
            written.push(path);
        }
        let path = PathBuf::from(format!("{prefix}.total"));
        write_to(&path, |out| self.write_total(out))?;
        written.push(path);
        info!("{} profile files written", written.len());
        Ok(written)
    }
}

fn write_to<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = File::create(path).map_err(|e| TofDepthError::Output {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut out = BufWriter::new(file);
    write(&mut out)
        .and_then(|()| out.flush())
        .map_err(|e| TofDepthError::io(path, e))
}

/// Scientific notation with a signed, two digit exponent (`1.23450e+04`).
fn sci(value: f64, precision: usize) -> String {
    let s = format!("{value:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

/// Depth column used when reading a profile back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthUnit {
    /// First column, 1e15 atoms/cm².
    #[default]
    Areal,
    /// Third column, nm.
    Nanometre,
}

/// A depth profile read from a written output file. Depths are SI (atoms/m²
/// or m, depending on the unit read), concentrations as written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepthProfile {
    pub depth: Vec<f64>,
    pub concentration: Vec<f64>,
}

impl DepthProfile {
    pub fn from_file(path: impl AsRef<Path>, unit: DepthUnit) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TofDepthError::io(path, e))?;
        Self::from_reader(BufReader::new(file), path, unit)
    }

    /// Reads depth and the normalised concentration (fourth column) from
    /// either the per-nuclide or the total layout.
    pub fn from_reader<R: BufRead>(reader: R, origin: &Path, unit: DepthUnit) -> Result<Self> {
        let mut profile = DepthProfile::default();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| TofDepthError::io(origin, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let columns: Vec<f64> = Fields::new(&line).map_while(|f| f.parse().ok()).collect();
            if columns.len() < 4 {
                return Err(TofDepthError::MalformedRecord {
                    path: origin.to_path_buf(),
                    line: i + 1,
                    message: "expected at least four numeric columns".to_string(),
                });
            }
            profile.depth.push(match unit {
                DepthUnit::Areal => columns[0] * AREAL_1E15_CM2,
                DepthUnit::Nanometre => columns[2] * NM,
            });
            profile.concentration.push(columns[3]);
        }
        Ok(profile)
    }

    pub fn len(&self) -> usize {
        self.depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }

    /// Concentration at `depth`, linear between points and clamped at
    /// the ends. Zero for an empty profile.
    pub fn concentration_at(&self, depth: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        interp_one(depth, &self.depth, &self.concentration)
    }

    /// Element-wise sum, keeping the depths of `self`. `None` when the
    /// profiles differ in length.
    pub fn checked_add(&self, other: &DepthProfile) -> Option<DepthProfile> {
        self.combine(other, |a, b| a + b)
    }

    /// Element-wise difference, keeping the depths of `self`.
    pub fn checked_sub(&self, other: &DepthProfile) -> Option<DepthProfile> {
        self.combine(other, |a, b| a - b)
    }

    fn combine(&self, other: &DepthProfile, op: impl Fn(f64, f64) -> f64) -> Option<DepthProfile> {
        if self.len() != other.len() {
            return None;
        }
        Some(DepthProfile {
            depth: self.depth.clone(),
            concentration: self
                .concentration
                .iter()
                .zip(&other.concentration)
                .map(|(&a, &b)| op(a, b))
                .collect(),
        })
    }
}
