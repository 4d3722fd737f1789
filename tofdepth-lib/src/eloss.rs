//! Energy lost by an ion over a path through the target.

/// Largest relative change of the stopping accepted across one sub-step.
pub const MAX_STOPPING_CHANGE: f64 = 0.05;

/// Relative slack when deciding whether another full sub-step still fits.
const END_TOLERANCE: f64 = 1.0e-6;

/// Sub-steps are never halved below this fraction of the requested path.
const MIN_STEP_FRACTION: f64 = 1.0e-12;

/// Stopping (J·m²/atom) of species `z` moving at `v` (m/s) at areal depth
/// `depth` (atoms/m²).
pub trait StoppingLookup {
    fn stopping(&self, z: u32, v: f64, depth: f64) -> f64;
}

impl<F> StoppingLookup for F
where
    F: Fn(u32, f64, f64) -> f64,
{
    fn stopping(&self, z: u32, v: f64, depth: f64) -> f64 {
        self(z, v, depth)
    }
}

/// Energy (J) lost by species `z` of mass `mass` (kg) starting with
/// `energy` at `depth` and travelling `path` atoms/m².
///
/// Trapezoidal steps start at the whole path and are halved while the
/// stopping changes by more than [`MAX_STOPPING_CHANGE`] across a step;
/// they never grow back. The speed is taken from the incoming energy for
/// every step. Returns 0 when a step would take more energy than the ion
/// has.
pub fn energy_loss<S>(stopping: &S, z: u32, mass: f64, energy: f64, depth: f64, path: f64) -> f64
where
    S: StoppingLookup + ?Sized,
{
    if energy <= 0.0 || path <= 0.0 {
        return 0.0;
    }
    let v = (2.0 * energy / mass).sqrt();
    let end = depth + path;
    let min_step = path * MIN_STEP_FRACTION;

    let mut d = depth;
    let mut step = path;
    let mut loss = 0.0;
    let (mut s1, mut s2) = (0.0, 0.0);

    while end - d >= step * (1.0 - END_TOLERANCE) {
        loop {
            s1 = stopping.stopping(z, v, d);
            if energy < s1 * step {
                return 0.0;
            }
            let v2 = (2.0 * (energy - s1 * step) / mass).sqrt();
            s2 = stopping.stopping(z, v2, d + step);
            let change = if s1 > 0.0 { (s2 - s1).abs() / s1 } else { 0.0 };
            if change > MAX_STOPPING_CHANGE && step > min_step {
                step /= 2.0;
            } else {
                break;
            }
        }
        loss += 0.5 * (s1 + s2) * step;
        d += step;
    }
    loss + (end - d).max(0.0) * 0.5 * (s1 + s2)
}
