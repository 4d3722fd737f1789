/// Speed of light (m/s)
pub const SPEED_OF_LIGHT: f64 = 2.9979246e8;

/// Speed of light squared (m²/s²)
pub const SPEED_OF_LIGHT_SQUARED: f64 = 8.9875518e16;

/// Atomic mass unit used by the stopping library (kg)
pub const STOPPING_AMU: f64 = 1.66044e-27;

/// keV used by the stopping library (J)
pub const STOPPING_KEV: f64 = 1.6021917e-16;

/// Elementary charge (C)
pub const ELEMENTARY_CHARGE: f64 = 1.60217733e-19;

/// Vacuum permittivity (F/m)
pub const EPSILON_0: f64 = 8.85419e-12;

/// Atomic mass unit used by the depth reconstruction (kg)
pub const AMU: f64 = 1.6605402e-27;

/// eV in J
pub const EV: f64 = ELEMENTARY_CHARGE;

/// MeV in J
pub const MEV: f64 = 1_000_000.0 * EV;

/// Degree in radians
pub const DEG: f64 = std::f64::consts::PI / 180.0;

pub const NM: f64 = 1.0e-9;
pub const MM: f64 = 1.0e-3;
pub const CM2: f64 = 1.0e-4;

/// 1e15 atoms/cm² in atoms/m²
pub const AREAL_1E15_CM2: f64 = 1.0e15 / CM2;

/// eV/(1e15 atoms/cm²) in J·m²/atom
pub const EVCM2_1E15ATOMS: f64 = EV * CM2 / 1.0e15;

/// g/cm³ in kg/m³
pub const G_CM3: f64 = 1000.0;

/// µg/cm² in kg/m²
pub const UG_CM2: f64 = 1.0e-9 / CM2;
