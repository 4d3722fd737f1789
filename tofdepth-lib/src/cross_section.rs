//! Rutherford cross sections for recoiling and backscattering, with
//! optional electron screening corrections.

use std::f64::consts::PI;
use std::fmt;

use crate::constants::{ELEMENTARY_CHARGE, EPSILON_0, EV};

/// Correction factor applied on top of the Rutherford cross section.
///
/// `e_cm` is the centre-of-mass energy (J), `theta_cm` the centre-of-mass
/// scattering angle (rad).
pub trait ScreeningModel {
    fn screening(&self, z1: u32, z2: u32, e_cm: f64, theta_cm: f64) -> f64;
}

/// Screening models selectable from a setup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossSectionModel {
    #[default]
    Rutherford,
    Lecuyer,
    Andersen,
}

impl CrossSectionModel {
    /// Model for the numeric code used in setup files (1, 2 or 3).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Rutherford),
            2 => Some(Self::Lecuyer),
            3 => Some(Self::Andersen),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Rutherford => 1,
            Self::Lecuyer => 2,
            Self::Andersen => 3,
        }
    }
}

impl fmt::Display for CrossSectionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rutherford => "Rutherford",
            Self::Lecuyer => "L'Ecuyer corrected Rutherford",
            Self::Andersen => "Andersen corrected Rutherford",
        })
    }
}

impl ScreeningModel for CrossSectionModel {
    fn screening(&self, z1: u32, z2: u32, e_cm: f64, theta_cm: f64) -> f64 {
        match self {
            Self::Rutherford => 1.0,
            Self::Lecuyer => lecuyer(z1, z2, e_cm),
            Self::Andersen => andersen(z1, z2, e_cm, theta_cm),
        }
    }
}

/// L'Ecuyer screening factor. Only meaningful for backward angles.
pub fn lecuyer(z1: u32, z2: u32, e_cm: f64) -> f64 {
    1.0 - 48.73 * EV * z1 as f64 * (z2 as f64).powf(4.0 / 3.0) / e_cm
}

/// Andersen screening factor, angle dependent.
pub fn andersen(z1: u32, z2: u32, e_cm: f64, theta_cm: f64) -> f64 {
    let (z1, z2) = (z1 as f64, z2 as f64);
    let r_ve = 48.73 * EV * z1 * z2 * (z1.powf(2.0 / 3.0) + z2.powf(2.0 / 3.0)).sqrt() / e_cm;
    let a = 1.0 + 0.5 * r_ve;
    let b = 1.0 + r_ve + (0.5 * r_ve / (theta_cm / 2.0).sin()).powi(2);
    (a * a) / (b * b)
}

/// Lab-frame cross section (m²/sr) for a beam `z1`/`m1` of energy `energy`
/// recoiling a target atom `z2`/`m2` to lab angle `recoil_angle`.
pub fn erd_cross_section<S: ScreeningModel + ?Sized>(
    model: &S,
    (z1, m1): (u32, f64),
    (z2, m2): (u32, f64),
    recoil_angle: f64,
    energy: f64,
) -> f64 {
    let e_cm = m2 * energy / (m1 + m2);
    let theta_cm = PI - 2.0 * recoil_angle;
    let coulomb = z1 as f64 * z2 as f64 * ELEMENTARY_CHARGE * ELEMENTARY_CHARGE;
    let rutherford = (coulomb / (8.0 * PI * EPSILON_0 * energy)).powi(2) * (1.0 + m1 / m2).powi(2)
        / recoil_angle.cos().powi(3);
    model.screening(z1, z2, e_cm, theta_cm) * rutherford
}

/// Lab-frame cross section (m²/sr) for a beam `z1`/`m1` of energy `energy`
/// scattered off `z2`/`m2` to lab angle `angle`.
pub fn rbs_cross_section<S: ScreeningModel + ?Sized>(
    model: &S,
    (z1, m1): (u32, f64),
    (z2, m2): (u32, f64),
    angle: f64,
    energy: f64,
) -> f64 {
    let e_cm = m2 * energy / (m1 + m2);
    let theta_cm = angle + (m1 / m2 * angle.sin()).asin();
    let lab = centre_of_mass_to_lab(rutherford_cm(z1, z2, theta_cm, e_cm), theta_cm, angle);
    model.screening(z1, z2, e_cm, theta_cm) * lab
}

fn rutherford_cm(z1: u32, z2: u32, theta_cm: f64, e_cm: f64) -> f64 {
    let coulomb = z1 as f64 * z2 as f64 * ELEMENTARY_CHARGE * ELEMENTARY_CHARGE;
    (coulomb / (4.0 * PI * EPSILON_0)).powi(2) * (1.0 / (4.0 * e_cm)).powi(2)
        / (theta_cm / 2.0).sin().powi(4)
}

fn centre_of_mass_to_lab(sigma_cm: f64, theta_cm: f64, theta: f64) -> f64 {
    sigma_cm * theta_cm.sin().powi(2) / (theta.sin().powi(2) * (theta_cm - theta).cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{AMU, DEG, MEV};

    const BARN: f64 = 1.0e-28;

    #[test]
    fn test_rbs_helium_on_silicon() {
        // 2 MeV 4He on Si at 170 degrees: about 0.25 b/sr
        let sigma = rbs_cross_section(
            &CrossSectionModel::Rutherford,
            (2, 4.0026 * AMU),
            (14, 27.977 * AMU),
            170.0 * DEG,
            2.0 * MEV,
        );
        let barn = sigma / BARN;
        assert!(barn > 0.23 && barn < 0.27, "{barn}");
    }

    #[test]
    fn test_erd_scales_with_inverse_energy_squared() {
        let model = CrossSectionModel::Rutherford;
        let a = erd_cross_section(&model, (17, 35.0 * AMU), (1, AMU), 40.0 * DEG, 10.0 * MEV);
        let b = erd_cross_section(&model, (17, 35.0 * AMU), (1, AMU), 40.0 * DEG, 20.0 * MEV);
        assert!((a / b - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_screening_reduces_cross_section() {
        let e_cm = 0.5 * MEV;
        let l = CrossSectionModel::Lecuyer.screening(2, 79, e_cm, 170.0 * DEG);
        let a = CrossSectionModel::Andersen.screening(2, 79, e_cm, 170.0 * DEG);
        assert!(l < 1.0 && l > 0.9);
        assert!(a < 1.0 && a > 0.9);
        assert_eq!(CrossSectionModel::Rutherford.screening(2, 79, e_cm, 0.1), 1.0);
    }

    #[test]
    fn test_model_codes() {
        for code in 1..=3 {
            assert_eq!(CrossSectionModel::from_code(code).unwrap().code(), code);
        }
        assert_eq!(CrossSectionModel::from_code(0), None);
    }
}
