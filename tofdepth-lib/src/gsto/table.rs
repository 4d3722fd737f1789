use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tofdepth_data::StoppingKind;

use crate::error::{Result, TofDepthError};
use crate::fields::Fields;
use crate::gsto::header::COMMENT;
use crate::gsto::source::{SourceDescriptor, StoppingSource};

/// Stopping powers for every (Z1, Z2) the caller asked for.
///
/// Sources are registered first, then pairs are assigned to them, then
/// [`StoppingTable::load`] reads exactly the assigned blocks. Lookups go
/// through the assignment matrix, so a pair is answered by one source only.
#[derive(Debug, Clone)]
pub struct StoppingTable {
    z1_max: u32,
    z2_max: u32,
    sources: Vec<StoppingSource>,
    assigned: Vec<Option<usize>>,
}

const KINDS: [StoppingKind; 3] = [
    StoppingKind::Nuclear,
    StoppingKind::Electronic,
    StoppingKind::Total,
];

/// Kind named by the first three letters of `word`; `None` for anything else.
fn parse_kind(word: &str) -> StoppingKind {
    let prefix = word.get(..3).unwrap_or(word);
    KINDS
        .into_iter()
        .find(|kind| kind.keyword().starts_with(prefix) && prefix.len() == 3)
        .unwrap_or_default()
}

impl StoppingTable {
    pub fn new(z1_max: u32, z2_max: u32) -> Self {
        StoppingTable {
            z1_max,
            z2_max,
            sources: Vec::new(),
            assigned: vec![None; (z1_max * z2_max) as usize],
        }
    }

    /// Builds a table from a source list with one file per line:
    /// `file type z1min z1max z2min z2max origin name`.
    ///
    /// Relative file names are taken relative to the list itself.
    pub fn from_settings(z_max: u32, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let failed = |e| TofDepthError::StoppingFile {
            path: path.to_path_buf(),
            source: e,
        };
        let file = File::open(path).map_err(failed)?;
        let base = path.parent().unwrap_or(Path::new(""));
        Self::from_settings_reader(z_max, BufReader::new(file), base).map_err(failed)
    }

    pub fn from_settings_reader<R: BufRead>(
        z_max: u32,
        reader: R,
        base_dir: &Path,
    ) -> std::io::Result<Self> {
        let mut table = StoppingTable::new(z_max, z_max);
        let (mut lines, mut added, mut failed) = (0usize, 0usize, 0usize);
        for line in reader.lines() {
            let line = line?;
            lines += 1;
            if line.starts_with(COMMENT) {
                continue;
            }
            let columns: Vec<&str> = Fields::new(&line).collect();
            if columns.is_empty() {
                continue;
            }
            if columns.len() < 8 {
                warn!("stopping list line {lines}: expected 8 columns, got {}", columns.len());
                failed += 1;
                continue;
            }
            let kind = parse_kind(columns[1]);
            if kind == StoppingKind::None {
                debug!("stopping list line {lines}: type '{}', not used", columns[1]);
                failed += 1;
                continue;
            }
            let range: Vec<u32> = columns[2..6].iter().filter_map(|c| c.parse().ok()).collect();
            let [z1_min, z1_max, z2_min, z2_max] = range[..] else {
                warn!("stopping list line {lines}: unreadable Z range");
                failed += 1;
                continue;
            };
            let descriptor = SourceDescriptor {
                name: columns[7].to_string(),
                path: base_dir.join(columns[0]),
                kind,
                z1_min,
                z1_max,
                z2_min,
                z2_max,
            };
            match table.register_source(descriptor) {
                Ok(_) => added += 1,
                Err(e) => {
                    warn!("{e}");
                    failed += 1;
                }
            }
        }
        debug!("read {lines} lines from stopping list, added {added} files, {failed} failed");
        Ok(table)
    }

    pub fn z1_max(&self) -> u32 {
        self.z1_max
    }

    pub fn z2_max(&self) -> u32 {
        self.z2_max
    }

    pub fn sources(&self) -> &[StoppingSource] {
        &self.sources
    }

    /// Appends a source to the candidate list and returns its index.
    pub fn register_source(&mut self, descriptor: SourceDescriptor) -> Result<usize> {
        if descriptor.z1_min > descriptor.z1_max || descriptor.z2_min > descriptor.z2_max {
            return Err(TofDepthError::InvalidRange {
                name: descriptor.name,
                z1_min: descriptor.z1_min,
                z1_max: descriptor.z1_max,
                z2_min: descriptor.z2_min,
                z2_max: descriptor.z2_max,
            });
        }
        debug!(
            "adding stopping file {} ({}), {}<=Z1<={}, {}<=Z2<={}",
            descriptor.name,
            descriptor.path.display(),
            descriptor.z1_min,
            descriptor.z1_max,
            descriptor.z2_min,
            descriptor.z2_max
        );
        self.sources.push(StoppingSource::new(descriptor));
        Ok(self.sources.len() - 1)
    }

    fn slot(&self, z1: u32, z2: u32) -> Result<usize> {
        if z1 == 0 || z1 > self.z1_max {
            return Err(TofDepthError::AtomicNumberOutOfRange { z: z1, max: self.z1_max });
        }
        if z2 == 0 || z2 > self.z2_max {
            return Err(TofDepthError::AtomicNumberOutOfRange { z: z2, max: self.z2_max });
        }
        Ok(((z1 - 1) * self.z2_max + (z2 - 1)) as usize)
    }

    /// Points (`z1`, `z2`) at a registered source, overriding any earlier
    /// assignment.
    pub fn assign(&mut self, z1: u32, z2: u32, source: usize) -> Result<()> {
        let slot = self.slot(z1, z2)?;
        if source >= self.sources.len() {
            return Err(TofDepthError::StoppingData(format!(
                "no stopping source with index {source}"
            )));
        }
        self.assigned[slot] = Some(source);
        Ok(())
    }

    /// Assigns the first registered source covering (`z1`, `z2`).
    pub fn auto_assign(&mut self, z1: u32, z2: u32) -> bool {
        let Ok(slot) = self.slot(z1, z2) else {
            return false;
        };
        match self.sources.iter().position(|s| s.covers(z1, z2)) {
            Some(index) => {
                self.assigned[slot] = Some(index);
                true
            }
            None => false,
        }
    }

    /// [`auto_assign`](Self::auto_assign) over a rectangle clipped to the
    /// table; returns how many pairs got a source.
    pub fn auto_assign_range(&mut self, z1_min: u32, z1_max: u32, z2_min: u32, z2_max: u32) -> usize {
        let z1_max = z1_max.min(self.z1_max);
        let z2_max = z2_max.min(self.z2_max);
        let mut assigned = 0;
        for z1 in z1_min.max(1)..=z1_max {
            for z2 in z2_min.max(1)..=z2_max {
                if self.auto_assign(z1, z2) {
                    assigned += 1;
                }
            }
        }
        assigned
    }

    /// Index of the source answering (`z1`, `z2`), if any.
    pub fn assigned_source(&self, z1: u32, z2: u32) -> Option<usize> {
        self.slot(z1, z2).ok().and_then(|slot| self.assigned[slot])
    }

    /// Every assigned pair with the name of its source, Z1-major.
    pub fn assignments(&self) -> impl Iterator<Item = (u32, u32, &str)> + '_ {
        (1..=self.z1_max)
            .flat_map(move |z1| (1..=self.z2_max).map(move |z2| (z1, z2)))
            .filter_map(|(z1, z2)| {
                self.assigned_source(z1, z2)
                    .map(|index| (z1, z2, self.sources[index].name()))
            })
    }

    pub fn log_assignments(&self) {
        for (z1, z2, name) in self.assignments() {
            info!("stopping for Z1={z1} in Z2={z2} assigned to {name}");
        }
    }

    /// Opens every source that has at least one assignment and reads its
    /// assigned blocks. The first failure aborts the whole load.
    pub fn load(&mut self) -> Result<()> {
        for index in 0..self.sources.len() {
            if !self.assigned.contains(&Some(index)) {
                debug!("{}: nothing assigned, not opened", self.sources[index].name());
                continue;
            }
            let path: PathBuf = self.sources[index].descriptor().path.clone();
            let file = File::open(&path).map_err(|e| TofDepthError::StoppingFile {
                path: path.clone(),
                source: e,
            })?;
            self.load_source_from(index, &mut BufReader::new(file))?;
        }
        Ok(())
    }

    /// Reads source `index` from an already opened stream.
    pub fn load_source_from<R: BufRead + Seek>(&mut self, index: usize, reader: &mut R) -> Result<()> {
        if index >= self.sources.len() {
            return Err(TofDepthError::StoppingData(format!(
                "no stopping source with index {index}"
            )));
        }
        let (z1_max, z2_max) = (self.z1_max, self.z2_max);
        let assigned = &self.assigned;
        let is_assigned = |z1: u32, z2: u32| {
            z1 > 0 && z2 > 0 && assigned[((z1 - 1) * z2_max + (z2 - 1)) as usize] == Some(index)
        };
        self.sources[index].load_from(reader, z1_max, z2_max, is_assigned)?;
        let h = self.sources[index].header();
        debug!(
            "loaded {}: x-points={}, x-scale={}, x-unit={}, format={}",
            self.sources[index].name(),
            h.x_points,
            h.x_scale.keyword(),
            h.x_unit.keyword(),
            h.format.keyword()
        );
        Ok(())
    }

    /// Stopping in eV/(1e15 atoms/cm²) for `z1` moving at `v` (m/s) in `z2`.
    ///
    /// Speeds outside the tabulated interval give zero.
    pub fn stopping(&self, z1: u32, z2: u32, v: f64) -> Result<f64> {
        let slot = self.slot(z1, z2)?;
        let index = self.assigned[slot].ok_or(TofDepthError::UnassignedPair { z1, z2 })?;
        let source = &self.sources[index];
        if !source.is_loaded() {
            return Err(TofDepthError::StoppingData(format!(
                "{} assigned to Z1={z1} Z2={z2} but not loaded",
                source.name()
            )));
        }
        Ok(source.interpolate(z1, z2, v))
    }

    /// Like [`stopping`](Self::stopping), but logs failures and answers 0.
    pub fn lookup(&self, z1: u32, z2: u32, v: f64) -> f64 {
        self.stopping(z1, z2, v).unwrap_or_else(|e| {
            warn!("{e}");
            0.0
        })
    }

    /// `points` lookups at evenly spaced speeds from `v_min` to `v_max`.
    pub fn table_over_range(&self, z1: u32, z2: u32, v_min: f64, v_max: f64, points: usize) -> Vec<f64> {
        let v_step = if points > 1 {
            (v_max - v_min) / (points - 1) as f64
        } else {
            0.0
        };
        (0..points)
            .map(|i| self.lookup(z1, z2, v_min + v_step * i as f64))
            .collect()
    }

    /// Tabulated value number `point` for (`z1`, `z2`), without interpolation.
    pub fn raw(&self, z1: u32, z2: u32, point: usize) -> Result<f64> {
        let slot = self.slot(z1, z2)?;
        let index = self.assigned[slot].ok_or(TofDepthError::UnassignedPair { z1, z2 })?;
        let values = self.sources[index].values(z1, z2);
        values.get(point).copied().ok_or_else(|| {
            TofDepthError::StoppingData(format!(
                "stopping point {point} out of range for Z1={z1} Z2={z2}"
            ))
        })
    }
}
