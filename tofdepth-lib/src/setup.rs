use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info};

use crate::constants::{AREAL_1E15_CM2, DEG, G_CM3, MEV, MM};
use crate::cross_section::CrossSectionModel;
use crate::error::{Result, TofDepthError};
use crate::fields::Fields;
use crate::masses::{Isotope, IsotopeTable};

pub const DEFAULT_DEPTH_STEPS: usize = 201;
pub const DEFAULT_ITERATIONS: usize = 4;

/// Beam species.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Beam {
    pub z: u32,
    pub a: u32,
    /// kg
    pub mass: f64,
}

impl From<&Isotope> for Beam {
    fn from(isotope: &Isotope) -> Self {
        Beam {
            z: isotope.z,
            a: isotope.a,
            mass: isotope.mass,
        }
    }
}

/// Measurement geometry and reconstruction settings, all in SI units.
///
/// Depths are areal densities in atoms/m².
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSetup {
    pub beam: Beam,
    /// Beam energy (J).
    pub energy: f64,
    pub detector_angle: f64,
    /// Angle between beam and target surface.
    pub target_angle: f64,
    pub detector_distance: f64,
    /// Width of the depth bins used while iterating.
    pub depth_step: f64,
    /// Width of the output bins; the iteration step when unset.
    pub output_step: Option<f64>,
    /// kg/m³, only used for the linear depth column.
    pub density: f64,
    /// Depth window whose mean total weight scales the output. Without it
    /// the stable region below the surface is found automatically.
    pub scaling: Option<(f64, f64)>,
    pub cross_section: CrossSectionModel,
    pub depth_steps: usize,
    pub iterations: usize,
    /// Stop early once the beam energy table changes less than this,
    /// relative to the beam energy.
    pub convergence: Option<f64>,
}

impl Default for DepthSetup {
    fn default() -> Self {
        DepthSetup {
            beam: Beam::default(),
            energy: 0.0,
            detector_angle: 0.0,
            target_angle: 0.0,
            detector_distance: 0.0,
            depth_step: 100.0 * AREAL_1E15_CM2,
            output_step: None,
            density: 5.0 * G_CM3,
            scaling: None,
            cross_section: CrossSectionModel::default(),
            depth_steps: DEFAULT_DEPTH_STEPS,
            iterations: DEFAULT_ITERATIONS,
            convergence: None,
        }
    }
}

const BEAM: &str = "Beam:";
const ENERGY: &str = "Energy:";
const DETECTOR_ANGLE: &str = "Detector angle:";
const TARGET_ANGLE: &str = "Target angle:";
const DETECTOR_DISTANCE: &str = "Detector distance:";
const STOPPING_STEP: &str = "Depth step for stopping:";
const OUTPUT_STEP: &str = "Depth step for output:";
const DENSITY: &str = "Target density:";
const SCALING: &str = "Depths for concentration scaling:";
const CROSS_SECTION: &str = "Cross section:";
const DEPTH_STEPS: &str = "Number of depth steps:";
const ITERATIONS: &str = "Number of iterations:";

impl DepthSetup {
    pub fn output_step(&self) -> f64 {
        self.output_step.unwrap_or(self.depth_step)
    }

    /// Reads a setup file; the beam label is resolved through `masses`.
    pub fn load(path: impl AsRef<Path>, masses: &IsotopeTable) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TofDepthError::SetupFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("using setup file {}", path.display());
        Self::from_reader(BufReader::new(file), path, masses)
    }

    /// Parses `Key: value` lines. Lines with other keys are ignored.
    pub fn from_reader<R: BufRead>(reader: R, origin: &Path, masses: &IsotopeTable) -> Result<Self> {
        let mut setup = DepthSetup::default();
        for (i, line) in reader.lines().enumerate() {
            let lineno = i + 1;
            let line = line.map_err(|e| TofDepthError::io(origin, e))?;
            let line = line.trim_start();
            let bad = |what: &str| TofDepthError::Setup {
                path: origin.to_path_buf(),
                line: lineno,
                message: format!("cannot read {what}"),
            };

            if let Some(value) = line.strip_prefix(BEAM) {
                let label = Fields::new(value).next().ok_or_else(|| bad("beam"))?;
                setup.beam = Beam::from(masses.resolve_nuclide(label)?);
            } else if let Some(value) = line.strip_prefix(ENERGY) {
                setup.energy = first::<f64>(value).ok_or_else(|| bad("energy"))? * MEV;
            } else if let Some(value) = line.strip_prefix(DETECTOR_ANGLE) {
                setup.detector_angle = first::<f64>(value).ok_or_else(|| bad("detector angle"))? * DEG;
            } else if let Some(value) = line.strip_prefix(TARGET_ANGLE) {
                setup.target_angle = first::<f64>(value).ok_or_else(|| bad("target angle"))? * DEG;
            } else if let Some(value) = line.strip_prefix(DETECTOR_DISTANCE) {
                setup.detector_distance = first::<f64>(value).ok_or_else(|| bad("detector distance"))? * MM;
            } else if let Some(value) = line.strip_prefix(STOPPING_STEP) {
                setup.depth_step = first::<f64>(value).ok_or_else(|| bad("depth step"))? * AREAL_1E15_CM2;
            } else if let Some(value) = line.strip_prefix(OUTPUT_STEP) {
                let step: f64 = first(value).ok_or_else(|| bad("output step"))?;
                setup.output_step = Some(step * AREAL_1E15_CM2);
            } else if let Some(value) = line.strip_prefix(DENSITY) {
                setup.density = first::<f64>(value).ok_or_else(|| bad("density"))? * G_CM3;
            } else if let Some(value) = line.strip_prefix(SCALING) {
                let mut fields = Fields::new(value);
                let (Some(min), Some(max)) = (fields.parse_next::<f64>(), fields.parse_next::<f64>())
                else {
                    return Err(bad("scaling depths"));
                };
                setup.scaling = Some((min * AREAL_1E15_CM2, max * AREAL_1E15_CM2));
            } else if let Some(value) = line.strip_prefix(CROSS_SECTION) {
                setup.cross_section = first::<i32>(value)
                    .and_then(CrossSectionModel::from_code)
                    .ok_or_else(|| bad("cross section"))?;
            } else if let Some(value) = line.strip_prefix(DEPTH_STEPS) {
                setup.depth_steps = first(value).ok_or_else(|| bad("number of depth steps"))?;
            } else if let Some(value) = line.strip_prefix(ITERATIONS) {
                setup.iterations = first(value).ok_or_else(|| bad("number of iterations"))?;
            } else {
                debug!("setup line {lineno} ignored");
            }
        }
        setup.validate(origin)?;
        Ok(setup)
    }

    /// Checks the values the reconstruction cannot do without.
    pub fn validate(&self, origin: &Path) -> Result<()> {
        let invalid = |message: &str| {
            Err(TofDepthError::Setup {
                path: origin.to_path_buf(),
                line: 0,
                message: message.to_string(),
            })
        };
        if self.beam.z == 0 || self.beam.mass <= 0.0 {
            return invalid("no beam given");
        }
        if self.energy <= 0.0 {
            return invalid("beam energy must be positive");
        }
        if self.target_angle.sin() <= 0.0 {
            return invalid("target angle must be between 0 and 180 degrees");
        }
        if self.depth_step <= 0.0 || self.output_step() <= 0.0 {
            return invalid("depth steps must be positive");
        }
        if self.depth_steps < 2 {
            return invalid("at least two depth steps are needed");
        }
        Ok(())
    }
}

fn first<T: std::str::FromStr>(value: &str) -> Option<T> {
    Fields::new(value).parse_next()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASSES: &str = "\
2 2 4 He 4002603.254 99.999863
1 2 3 He 3016029.322 0.000137
18 17 35 Cl 34968852.68 75.76
";

    const SETUP: &str = "\
Beam: 35Cl
Energy: 8.515
Detector angle: 41.12
Target angle: 20.6
Toflen: 623.5
Detector distance: 623.5
Depth step for stopping: 50
Depth step for output: 25
Target density: 2.33
Cross section: 3
Number of depth steps: 150
Number of iterations: 5
";

    fn masses() -> IsotopeTable {
        IsotopeTable::from_reader(MASSES.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_setup() {
        let setup = DepthSetup::from_reader(SETUP.as_bytes(), Path::new("tof.in"), &masses()).unwrap();
        assert_eq!(setup.beam.z, 17);
        assert_eq!(setup.beam.a, 35);
        assert!((setup.energy - 8.515 * MEV).abs() < 1e-20);
        assert!((setup.detector_angle - 41.12 * DEG).abs() < 1e-12);
        assert!((setup.depth_step - 50.0 * AREAL_1E15_CM2).abs() < 1.0);
        assert!((setup.output_step() - 25.0 * AREAL_1E15_CM2).abs() < 1.0);
        assert_eq!(setup.cross_section, CrossSectionModel::Andersen);
        assert_eq!(setup.depth_steps, 150);
        assert_eq!(setup.iterations, 5);
        assert!(setup.scaling.is_none());
    }

    #[test]
    fn test_defaults() {
        let text = "Beam: He\nEnergy: 2.0\nTarget angle: 20\n";
        let setup = DepthSetup::from_reader(text.as_bytes(), Path::new("x"), &masses()).unwrap();
        assert_eq!(setup.beam.a, 4);
        assert_eq!(setup.depth_steps, DEFAULT_DEPTH_STEPS);
        assert_eq!(setup.iterations, DEFAULT_ITERATIONS);
        assert_eq!(setup.output_step(), setup.depth_step);
        assert_eq!(setup.cross_section, CrossSectionModel::Rutherford);
        assert_eq!(setup.density, 5.0 * G_CM3);
    }

    #[test]
    fn test_scaling_window() {
        let text = format!("{SETUP}Depths for concentration scaling: 100 300\n");
        let setup = DepthSetup::from_reader(text.as_bytes(), Path::new("x"), &masses()).unwrap();
        let (min, max) = setup.scaling.unwrap();
        assert!((min - 100.0 * AREAL_1E15_CM2).abs() < 1.0);
        assert!((max - 300.0 * AREAL_1E15_CM2).abs() < 1.0);
    }

    #[test]
    fn test_bad_value_names_line() {
        let text = SETUP.replace("Energy: 8.515", "Energy: lots");
        let err = DepthSetup::from_reader(text.as_bytes(), Path::new("x"), &masses()).unwrap_err();
        assert!(matches!(err, TofDepthError::Setup { line: 2, .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_unknown_beam() {
        let text = SETUP.replace("35Cl", "Xx");
        let err = DepthSetup::from_reader(text.as_bytes(), Path::new("x"), &masses()).unwrap_err();
        assert!(matches!(err, TofDepthError::UnknownNuclide(_)));
    }

    #[test]
    fn test_missing_setup_file() {
        let path = std::env::temp_dir().join("tofdepth-no-such-setup.in");
        let err = DepthSetup::load(&path, &masses()).unwrap_err();
        assert!(matches!(err, TofDepthError::SetupFile { .. }));
        assert_eq!(err.exit_code(), 6);
        assert!(err.to_string().starts_with("cannot open setup file"));
    }
}
