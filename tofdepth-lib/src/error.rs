use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TofDepthError {
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read mass table {}: {source}", .path.display())]
    MassTable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read stopping file {}: {source}", .path.display())]
    StoppingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open setup file {}: {source}", .path.display())]
    SetupFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open output file {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {message}", .path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("error in setup file {} at line {line}: {message}", .path.display())]
    Setup {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("nuclide not found: {0}")]
    UnknownNuclide(String),

    #[error("no isotope data for Z={0}")]
    UnknownElement(u32),

    #[error("Z={z} out of range (1..={max})")]
    AtomicNumberOutOfRange { z: u32, max: u32 },

    #[error("invalid stopping range for {name}: Z1 {z1_min}..{z1_max}, Z2 {z2_min}..{z2_max}")]
    InvalidRange {
        name: String,
        z1_min: u32,
        z1_max: u32,
        z2_min: u32,
        z2_max: u32,
    },

    #[error("no stopping file assigned to Z1={z1} Z2={z2}")]
    UnassignedPair { z1: u32, z2: u32 },

    #[error("event type neither ERD nor RBS at line {line}: {found}")]
    InvalidEventType { line: usize, found: String },

    #[error("stopping data error: {0}")]
    StoppingData(String),

    #[error("bundle error: {0}")]
    Bundle(String),
}

pub type Result<T> = std::result::Result<T, TofDepthError>;

impl TofDepthError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for the failure site this error came from.
    ///
    /// Batch drivers exit with these so operators can tell a bad setup file
    /// from a missing data file without reading the log.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { .. } => 1,
            Self::InvalidEventType { .. } => 2,
            Self::Setup { .. } => 3,
            Self::MalformedRecord { .. } | Self::MassTable { .. } | Self::Bundle(_) => 4,
            Self::UnknownNuclide(_) => 5,
            Self::SetupFile { .. } | Self::Output { .. } => 6,
            Self::UnknownElement(_) => 7,
            Self::StoppingFile { .. }
            | Self::AtomicNumberOutOfRange { .. }
            | Self::InvalidRange { .. }
            | Self::UnassignedPair { .. }
            | Self::StoppingData(_) => 8,
        }
    }
}
