use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::{debug, warn};
use tofdepth_data::{IsotopeBundle, IsotopeRecord};

use crate::constants::{AMU, SPEED_OF_LIGHT, SPEED_OF_LIGHT_SQUARED};
use crate::error::{Result, TofDepthError};
use crate::fields::{Fields, split_nuclide};

/// A single nuclide from the mass table.
#[derive(Debug, Clone, PartialEq)]
pub struct Isotope {
    /// Canonical `A-Symbol` name, e.g. `4-He`.
    pub name: String,
    pub symbol: String,
    pub n: u32,
    pub z: u32,
    pub a: u32,
    /// Mass in kg.
    pub mass: f64,
    /// Natural abundance as a fraction.
    pub abundance: f64,
}

impl From<IsotopeRecord> for Isotope {
    fn from(record: IsotopeRecord) -> Self {
        Isotope {
            name: canonical_name(record.a, &record.symbol),
            symbol: record.symbol,
            n: record.n,
            z: record.z,
            a: record.a,
            mass: record.mass,
            abundance: record.abundance,
        }
    }
}

impl From<&Isotope> for IsotopeRecord {
    fn from(isotope: &Isotope) -> Self {
        IsotopeRecord {
            symbol: isotope.symbol.clone(),
            n: isotope.n,
            z: isotope.z,
            a: isotope.a,
            mass: isotope.mass,
            abundance: isotope.abundance,
        }
    }
}

fn canonical_name(a: u32, symbol: &str) -> String {
    format!("{a}-{symbol}")
}

/// Read-only isotope table, loaded once and then shared by reference.
#[derive(Debug, Clone, Default)]
pub struct IsotopeTable {
    isotopes: Vec<Isotope>,
    by_name: HashMap<String, usize>,
    symbol_to_z: HashMap<String, u32>,
}

impl IsotopeTable {
    pub fn from_isotopes(isotopes: Vec<Isotope>) -> Self {
        let mut by_name = HashMap::new();
        let mut symbol_to_z = HashMap::new();
        for (index, isotope) in isotopes.iter().enumerate() {
            by_name.entry(isotope.name.clone()).or_insert(index);
            symbol_to_z.entry(isotope.symbol.clone()).or_insert(isotope.z);
        }
        IsotopeTable {
            isotopes,
            by_name,
            symbol_to_z,
        }
    }

    /// Loads a mass table file (`N Z A Symbol Mass[µu] Abundance[%]`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let failed = |e| TofDepthError::MassTable {
            path: path.to_path_buf(),
            source: e,
        };
        let file = File::open(path).map_err(failed)?;
        let table = Self::from_reader(BufReader::new(file)).map_err(failed)?;
        debug!("loaded {} isotopes from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parses mass table records until end of input.
    ///
    /// A line that does not hold six fields ends the scan, as the table is
    /// expected to be contiguous.
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut isotopes = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_mass_line(&line) {
                Some(isotope) => {
                    if isotope.n + isotope.z != isotope.a {
                        warn!(
                            "mass number A={} does not match N={} and Z={}",
                            isotope.a, isotope.n, isotope.z
                        );
                    }
                    isotopes.push(isotope);
                }
                None => {
                    warn!("mass table scan stopped at malformed line {}", index + 1);
                    break;
                }
            }
        }
        Ok(Self::from_isotopes(isotopes))
    }

    /// Decodes a bundle produced by `tofdepth-generate masses`.
    pub fn from_compressed(bytes: &[u8]) -> Result<Self> {
        let mut decoder = ruzstd::decoding::StreamingDecoder::new(bytes)
            .map_err(|e| TofDepthError::Bundle(e.to_string()))?;
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| TofDepthError::Bundle(e.to_string()))?;
        let bundle: IsotopeBundle = postcard::from_bytes(&decompressed)
            .map_err(|e| TofDepthError::Bundle(e.to_string()))?;
        debug!(
            "unpacked {} isotopes from bundle of {}",
            bundle.isotopes.len(),
            bundle.source
        );
        Ok(Self::from_isotopes(
            bundle.isotopes.into_iter().map(Isotope::from).collect(),
        ))
    }

    pub fn to_bundle(&self, source: &str) -> IsotopeBundle {
        IsotopeBundle {
            source: source.to_string(),
            isotopes: self.isotopes.iter().map(IsotopeRecord::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.isotopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.isotopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Isotope> {
        self.isotopes.iter()
    }

    /// Looks up `4-He`; the compact `4He` spelling is accepted as well.
    pub fn find_by_name(&self, name: &str) -> Option<&Isotope> {
        if let Some(&index) = self.by_name.get(name) {
            return Some(&self.isotopes[index]);
        }
        match split_nuclide(name)? {
            (Some(a), symbol) => self
                .by_name
                .get(&canonical_name(a, symbol))
                .map(|&index| &self.isotopes[index]),
            (None, _) => None,
        }
    }

    pub fn find_isotope(&self, z: u32, a: u32) -> Option<&Isotope> {
        self.isotopes.iter().find(|i| i.z == z && i.a == a)
    }

    pub fn first_isotope(&self, z: u32) -> Option<&Isotope> {
        self.isotopes.iter().find(|i| i.z == z)
    }

    /// The isotope of `z` with the largest natural abundance.
    ///
    /// Equal abundances resolve to the lowest mass number. Elements without
    /// any natural abundance listed give `None`.
    pub fn most_abundant(&self, z: u32) -> Option<&Isotope> {
        self.isotopes
            .iter()
            .filter(|i| i.z == z && i.abundance > 0.0)
            .fold(None, |best: Option<&Isotope>, candidate| match best {
                Some(b)
                    if b.abundance > candidate.abundance
                        || (b.abundance == candidate.abundance && b.a <= candidate.a) =>
                {
                    Some(b)
                }
                _ => Some(candidate),
            })
    }

    /// Abundance-weighted mass of element `z` in kg.
    pub fn average_mass(&self, z: u32) -> f64 {
        self.isotopes
            .iter()
            .filter(|i| i.z == z)
            .map(|i| i.mass * i.abundance)
            .sum()
    }

    /// Mass of nuclide (`z`, `a`); `a == 0` asks for the average mass.
    pub fn mass(&self, z: u32, a: u32) -> Option<f64> {
        if a == 0 {
            let mass = self.average_mass(z);
            return (mass > 0.0).then_some(mass);
        }
        self.find_isotope(z, a).map(|i| i.mass)
    }

    pub fn z_by_symbol(&self, symbol: &str) -> Option<u32> {
        self.symbol_to_z.get(symbol).copied()
    }

    pub fn symbol(&self, z: u32) -> Option<&str> {
        self.first_isotope(z).map(|i| i.symbol.as_str())
    }

    /// Resolves a beam or event label such as `4He`, `35-Cl` or `Si`.
    ///
    /// Without a mass number the most abundant isotope is returned.
    pub fn resolve_nuclide(&self, label: &str) -> Result<&Isotope> {
        let unknown = || TofDepthError::UnknownNuclide(label.to_string());
        let (mass_number, symbol) = split_nuclide(label).ok_or_else(unknown)?;
        let z = self.z_by_symbol(symbol).ok_or_else(unknown)?;
        match mass_number {
            Some(a) => self.find_isotope(z, a).ok_or_else(unknown),
            None => self.most_abundant(z).ok_or_else(unknown),
        }
    }
}

fn parse_mass_line(line: &str) -> Option<Isotope> {
    let mut fields = Fields::new(line);
    let n = fields.parse_next()?;
    let z = fields.parse_next()?;
    let a = fields.parse_next()?;
    let symbol = fields.next()?.to_string();
    let micro_mass: f64 = fields.parse_next()?;
    let percent: f64 = fields.parse_next()?;
    Some(Isotope {
        name: canonical_name(a, &symbol),
        symbol,
        n,
        z,
        a,
        mass: micro_mass / 1e6 * AMU,
        abundance: percent / 1e2,
    })
}

/// Relativistic speed (m/s) of a particle with kinetic energy `e` (J).
pub fn velocity(e: f64, mass: f64) -> f64 {
    let gamma = 1.0 + e / (mass * SPEED_OF_LIGHT_SQUARED);
    ((1.0 - gamma.powi(-2)) * SPEED_OF_LIGHT_SQUARED).sqrt()
}

/// Relativistic kinetic energy (J) of a particle moving at `v` (m/s).
pub fn energy(v: f64, mass: f64) -> f64 {
    mass * SPEED_OF_LIGHT_SQUARED * ((1.0 - (v / SPEED_OF_LIGHT).powi(2)).powf(-0.5) - 1.0)
}
