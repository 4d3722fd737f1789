use std::fmt;
use std::str::FromStr;

/// Which particle reached the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Recoiled target atom.
    Erd,
    /// Backscattered beam ion.
    Rbs,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Erd => "ERD",
            Self::Rbs => "RBS",
        }
    }

    /// Ratio of detected energy to beam energy just before the collision.
    ///
    /// `theta` is the recoil (ERD) or scattering (RBS) angle in radians.
    pub fn kinematic_factor(self, beam_mass: f64, target_mass: f64, theta: f64) -> f64 {
        let total = beam_mass + target_mass;
        match self {
            Self::Erd => 4.0 * beam_mass * target_mass * theta.cos().powi(2) / (total * total),
            Self::Rbs => {
                let k = (target_mass.powi(2) - (beam_mass * theta.sin()).powi(2)).sqrt()
                    + beam_mass * theta.cos();
                (k / total).powi(2)
            }
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    /// Only the first three characters are significant.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.get(..3) {
            Some("ERD") => Ok(Self::Erd),
            Some("RBS") => Ok(Self::Rbs),
            _ => Err(s.to_string()),
        }
    }
}
