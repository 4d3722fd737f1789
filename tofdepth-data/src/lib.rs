#![no_std]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// Packed isotope table, as written by `tofdepth-generate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IsotopeBundle {
    pub source: String,
    pub isotopes: Vec<IsotopeRecord>,
}

/// One line of the mass table.
///
/// `mass` is in kilograms and `abundance` a fraction in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotopeRecord {
    pub symbol: String,
    pub n: u32,
    pub z: u32,
    pub a: u32,
    pub mass: f64,
    pub abundance: f64,
}

/// Quantity a stopping file is tabulated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum XUnit {
    #[default]
    None,
    MetersPerSecond,
    KevPerNucleon,
}

/// Spacing of the tabulated points between `x_min` and `x_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum XScale {
    #[default]
    None,
    Linear,
    Log10,
}

/// Encoding of the data section that follows the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataFormat {
    #[default]
    None,
    Ascii,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoppingUnit {
    #[default]
    None,
    /// eV/(1e15 atoms/cm²)
    Ev15Cm2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoppingKind {
    #[default]
    None,
    Nuclear,
    Electronic,
    Total,
}

impl XUnit {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::MetersPerSecond => "m/s",
            Self::KevPerNucleon => "keV/u",
        }
    }
}

impl XScale {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Linear => "linear",
            Self::Log10 => "log10",
        }
    }
}

impl DataFormat {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ascii => "ascii",
            Self::Binary => "binary",
        }
    }
}

impl StoppingUnit {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ev15Cm2 => "eV/(1e15 atoms/cm2)",
        }
    }
}

impl StoppingKind {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Nuclear => "nuclear",
            Self::Electronic => "electronic",
            Self::Total => "total",
        }
    }
}

/// Header block of a stopping data file.
///
/// The range fields mirror the `z1-min` .. `z2-max` keys; they are optional
/// because the source list already declares the covered range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoppingHeader {
    pub source: Option<String>,
    pub z1_min: Option<u32>,
    pub z1_max: Option<u32>,
    pub z2_min: Option<u32>,
    pub z2_max: Option<u32>,
    pub stopping_unit: StoppingUnit,
    pub x_unit: XUnit,
    pub format: DataFormat,
    pub x_min: f64,
    pub x_max: f64,
    pub x_points: usize,
    pub x_scale: XScale,
}
