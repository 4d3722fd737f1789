use crate::concentration::ConcentrationProfile;
use crate::constants::EVCM2_1E15ATOMS;
use crate::eloss::StoppingLookup;
use crate::gsto::StoppingTable;

/// Number of samples on the velocity axis.
pub const VELOCITY_STEPS: usize = 1001;

/// The velocity axis reaches this far past the fastest particle.
pub const VELOCITY_MARGIN: f64 = 1.2;

/// Stopping of every present element in every present element, sampled on
/// a common velocity grid from zero up to `v_max`. Values are J·m²/atom.
#[derive(Debug, Clone)]
pub struct ElementStopping {
    elements: Vec<u32>,
    v_max: f64,
    v_steps: usize,
    /// `[z1 index][z2 index]` velocity tables, flattened row-major
    tables: Vec<Vec<f64>>,
}

impl ElementStopping {
    /// Samples `stopping(z1, z2, v)` for every ordered pair of `elements`.
    ///
    /// `v_steps` is raised to 2 if smaller, the grid needs both ends.
    pub fn from_fn<F>(elements: &[u32], v_max: f64, v_steps: usize, stopping: F) -> Self
    where
        F: Fn(u32, u32, f64) -> f64,
    {
        let v_steps = v_steps.max(2);
        let mut elements = elements.to_vec();
        elements.sort_unstable();
        elements.dedup();
        let v_step = v_max / (v_steps - 1) as f64;
        let mut tables = Vec::with_capacity(elements.len() * elements.len());
        for &z1 in &elements {
            for &z2 in &elements {
                tables.push((0..v_steps).map(|i| stopping(z1, z2, v_step * i as f64)).collect());
            }
        }
        ElementStopping {
            elements,
            v_max,
            v_steps,
            tables,
        }
    }

    /// Cuts the velocity tables out of a loaded stopping table.
    ///
    /// `fastest` is the highest speed in the run; the grid extends
    /// [`VELOCITY_MARGIN`] times past it. Pairs without a source stay zero.
    pub fn from_table(table: &StoppingTable, elements: &[u32], fastest: f64) -> Self {
        let v_max = fastest * VELOCITY_MARGIN;
        let mut stopping = Self::from_fn(elements, v_max, VELOCITY_STEPS, |_, _, _| 0.0);
        let n = stopping.elements.len();
        for i in 0..n {
            for j in 0..n {
                let (z1, z2) = (stopping.elements[i], stopping.elements[j]);
                if table.assigned_source(z1, z2).is_none() {
                    continue;
                }
                stopping.tables[i * n + j] = table
                    .table_over_range(z1, z2, 0.0, v_max, VELOCITY_STEPS)
                    .into_iter()
                    .map(|s| s * EVCM2_1E15ATOMS)
                    .collect();
            }
        }
        stopping
    }

    pub fn elements(&self) -> &[u32] {
        &self.elements
    }

    pub fn v_max(&self) -> f64 {
        self.v_max
    }

    pub fn v_steps(&self) -> usize {
        self.v_steps
    }

    /// Velocity table of `z1` in `z2`, if both are present.
    pub fn table(&self, z1: u32, z2: u32) -> Option<&[f64]> {
        let i = self.elements.iter().position(|&z| z == z1)?;
        let j = self.elements.iter().position(|&z| z == z2)?;
        Some(&self.tables[i * self.elements.len() + j])
    }
}

/// Stopping of each present element in the current target composition,
/// tabulated over velocity and depth bin.
#[derive(Debug, Clone)]
pub struct CompositeStopping {
    index: Vec<Option<usize>>,
    v_div: f64,
    d_div: f64,
    v_steps: usize,
    depth_steps: usize,
    /// per projectile: `[iv * depth_steps + id]`
    sums: Vec<Vec<f64>>,
}

impl CompositeStopping {
    pub fn new(elements: &ElementStopping, depth_step: f64, depth_steps: usize) -> Self {
        let depth_steps = depth_steps.max(2);
        let max_z = elements.elements.last().copied().unwrap_or(0) as usize;
        let mut index = vec![None; max_z + 1];
        for (i, &z) in elements.elements.iter().enumerate() {
            index[z as usize] = Some(i);
        }
        let v_step = elements.v_max / (elements.v_steps - 1) as f64;
        CompositeStopping {
            index,
            v_div: if v_step > 0.0 { 1.0 / v_step } else { 0.0 },
            d_div: 1.0 / depth_step,
            v_steps: elements.v_steps,
            depth_steps,
            sums: vec![vec![0.0; elements.v_steps * depth_steps]; elements.elements.len()],
        }
    }

    /// Rebuilds the sums from the fractions of `conc`.
    ///
    /// Elements of `elements` missing from `conc` contribute nothing.
    pub fn update(&mut self, elements: &ElementStopping, conc: &ConcentrationProfile) {
        let n = elements.elements.len();
        let depth_steps = self.depth_steps.min(conc.depth_steps());
        for (i, sum) in self.sums.iter_mut().enumerate() {
            sum.fill(0.0);
            for (j, &z2) in elements.elements.iter().enumerate() {
                let Some(k) = conc.element_index(z2) else {
                    continue;
                };
                let fractions = conc.fraction_row(k);
                let table = &elements.tables[i * n + j];
                for (iv, &s) in table.iter().enumerate() {
                    let row = &mut sum[iv * self.depth_steps..iv * self.depth_steps + depth_steps];
                    for (cell, &w) in row.iter_mut().zip(fractions) {
                        *cell += w * s;
                    }
                }
            }
        }
    }

    /// Bilinear interpolation in (velocity, depth). Indices are clamped so
    /// that speeds or depths past the grid extrapolate from the last cell.
    fn interpolate(&self, element: usize, v: f64, d: f64) -> f64 {
        let s = &self.sums[element];
        let x = v * self.v_div;
        let y = d * self.d_div;
        let iv = (x.trunc().max(0.0) as usize).min(self.v_steps - 2);
        let id = (y.trunc().max(0.0) as usize).min(self.depth_steps - 2);
        let at = |iv: usize, id: usize| s[iv * self.depth_steps + id];
        let fv = x - iv as f64;
        let s1 = at(iv, id) + fv * (at(iv + 1, id) - at(iv, id));
        let s2 = at(iv, id + 1) + fv * (at(iv + 1, id + 1) - at(iv, id + 1));
        s1 + (y - id as f64) * (s2 - s1)
    }
}

impl StoppingLookup for CompositeStopping {
    fn stopping(&self, z: u32, v: f64, depth: f64) -> f64 {
        match self.index.get(z as usize).copied().flatten() {
            Some(element) => self.interpolate(element, v, depth),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements() -> ElementStopping {
        // stopping grows with velocity; heavier targets stop harder
        ElementStopping::from_fn(&[14, 2], 10.0, 11, |_, z2, v| z2 as f64 * (1.0 + v))
    }

    #[test]
    fn test_velocity_tables() {
        let ele = elements();
        assert_eq!(ele.elements(), &[2, 14]);
        let t = ele.table(2, 14).unwrap();
        assert_eq!(t.len(), 11);
        assert_eq!(t[0], 14.0);
        assert_eq!(t[10], 14.0 * 11.0);
        assert!(ele.table(3, 14).is_none());
    }

    #[test]
    fn test_mixture_is_fraction_weighted() {
        let ele = elements();
        let mut conc = ConcentrationProfile::new(&[2, 14], 1.0, 4);
        for _ in 0..3 {
            conc.deposit(14, 0, 1.0);
        }
        conc.deposit(2, 0, 1.0);
        conc.normalize();
        let mut composite = CompositeStopping::new(&ele, 1.0, 4);
        composite.update(&ele, &conc);
        let expected = 0.75 * 14.0 * 3.0 + 0.25 * 2.0 * 3.0;
        assert!((composite.stopping(2, 2.0, 1.0) - expected).abs() < 1e-12);
        assert!((composite.stopping(2, 2.5, 0.5) - 0.75 * 14.0 * 3.5 - 0.25 * 2.0 * 3.5).abs() < 1e-12);
        assert_eq!(composite.stopping(7, 2.0, 1.0), 0.0);
    }

    #[test]
    fn test_degenerate_grids_are_widened() {
        let ele = ElementStopping::from_fn(&[14], 10.0, 1, |_, _, _| 3.0);
        assert_eq!(ele.v_steps(), 2);
        assert_eq!(ele.table(14, 14).unwrap(), &[3.0, 3.0]);

        let mut conc = ConcentrationProfile::new(&[14], 1.0, 1);
        conc.deposit(14, 0, 1.0);
        conc.normalize();
        let mut composite = CompositeStopping::new(&ele, 1.0, 1);
        composite.update(&ele, &conc);
        assert_eq!(composite.stopping(14, 4.0, 0.0), 3.0);
    }

    #[test]
    fn test_past_grid_extrapolates_last_cell() {
        let ele = elements();
        let mut conc = ConcentrationProfile::new(&[14], 1.0, 3);
        conc.deposit(14, 0, 1.0);
        conc.normalize();
        let mut composite = CompositeStopping::new(&ele, 1.0, 3);
        composite.update(&ele, &conc);
        // linear data, so extrapolation stays on the line
        assert!((composite.stopping(14, 12.0, 50.0) - 14.0 * 13.0).abs() < 1e-9);
    }
}
