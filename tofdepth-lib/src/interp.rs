use tofdepth_data::XScale;

/// Fractional index of `x` on a grid of `points` values spanning
/// `[x_min, x_max]`.
///
/// Log10 grids place the points evenly in `log10(x)`; the caller still
/// interpolates the tabulated values linearly between the two neighbours.
#[inline]
pub fn grid_position(x: f64, x_min: f64, x_max: f64, points: usize, scale: XScale) -> f64 {
    let last = (points - 1) as f64;
    match scale {
        XScale::Log10 => (x.log10() - x_min.log10()) / (x_max.log10() - x_min.log10()) * last,
        XScale::Linear | XScale::None => (x - x_min) / (x_max - x_min) * last,
    }
}

/// Grid value at fractional index `position`.
///
/// `values` needs at least two points. Positions at or past the last point
/// (rounding can put one there) use the last interval.
#[inline]
pub fn lerp_at(values: &[f64], position: f64) -> f64 {
    let i = (position.floor().max(0.0) as usize).min(values.len() - 2);
    let low = values[i];
    let high = values[i + 1];
    (high - low) * (position - i as f64) + low
}

/// Linear interpolation on sorted abscissae, clamped to the end values.
pub fn interp_one(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[xp.len() - 1] {
        return fp[fp.len() - 1];
    }

    let idx = xp.partition_point(|&v| v < x);
    if xp[idx] == x {
        return fp[idx];
    }

    let lo = idx - 1;
    let t = (x - xp[lo]) / (xp[idx] - xp[lo]);
    fp[lo] + t * (fp[idx] - fp[lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_position() {
        let p = grid_position(3.0e5, 1.0e5, 5.0e5, 5, XScale::Linear);
        assert_eq!(p, 2.0);
    }

    #[test]
    fn test_log_position() {
        let p = grid_position(10.0, 1.0, 100.0, 3, XScale::Log10);
        assert_eq!(p, 1.0);
        let half = grid_position(10f64.powf(0.5), 1.0, 100.0, 3, XScale::Log10);
        assert!((half - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_lerp_is_linear_in_value() {
        let values = [10.0, 20.0, 40.0];
        assert_eq!(lerp_at(&values, 1.0), 20.0);
        assert!((lerp_at(&values, 1.25) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_lerp_at_last_point_stays_in_bounds() {
        let values = [10.0, 20.0, 40.0];
        assert_eq!(lerp_at(&values, 2.0), 40.0);
        assert_eq!(lerp_at(&values, -0.0), 10.0);
    }

    #[test]
    fn test_log_position_one_ulp_below_end() {
        let x_max = 1.0e4f64;
        let below = f64::from_bits(x_max.to_bits() - 1);
        let p = grid_position(below, 1.0, x_max, 5, XScale::Log10);
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let v = lerp_at(&values, p);
        assert!((v - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_interp_clamping() {
        let xp = vec![1.0, 2.0, 3.0];
        let fp = vec![10.0, 20.0, 30.0];

        assert!((interp_one(0.0, &xp, &fp) - 10.0).abs() < 1e-10);
        assert!((interp_one(4.0, &xp, &fp) - 30.0).abs() < 1e-10);
        assert!((interp_one(2.5, &xp, &fp) - 25.0).abs() < 1e-10);
    }
}
