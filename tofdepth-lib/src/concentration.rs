use log::debug;

/// Per-element event weights binned in depth, and the elemental fractions
/// derived from them.
///
/// Bin `i` covers `[i·depth_step, (i+1)·depth_step)`. Raw weights and counts
/// accumulate through [`deposit`](Self::deposit); [`normalize`](Self::normalize)
/// turns them into fractions of each bin's total weight.
#[derive(Debug, Clone)]
pub struct ConcentrationProfile {
    elements: Vec<u32>,
    index: Vec<Option<usize>>,
    depth_step: f64,
    depth_steps: usize,
    weight: Vec<Vec<f64>>,
    count: Vec<Vec<u32>>,
    fraction: Vec<Vec<f64>>,
    weight_sum: Vec<f64>,
    count_sum: Vec<u32>,
}

impl ConcentrationProfile {
    /// Empty profile for `elements` (atomic numbers, any order).
    pub fn new(elements: &[u32], depth_step: f64, depth_steps: usize) -> Self {
        let mut elements = elements.to_vec();
        elements.sort_unstable();
        elements.dedup();
        let max_z = elements.last().copied().unwrap_or(0) as usize;
        let mut index = vec![None; max_z + 1];
        for (i, &z) in elements.iter().enumerate() {
            index[z as usize] = Some(i);
        }
        let n = elements.len();
        ConcentrationProfile {
            elements,
            index,
            depth_step,
            depth_steps,
            weight: vec![vec![0.0; depth_steps]; n],
            count: vec![vec![0; depth_steps]; n],
            fraction: vec![vec![0.0; depth_steps]; n],
            weight_sum: vec![0.0; depth_steps],
            count_sum: vec![0; depth_steps],
        }
    }

    pub fn elements(&self) -> &[u32] {
        &self.elements
    }

    pub fn depth_step(&self) -> f64 {
        self.depth_step
    }

    pub fn depth_steps(&self) -> usize {
        self.depth_steps
    }

    pub(crate) fn element_index(&self, z: u32) -> Option<usize> {
        self.index.get(z as usize).copied().flatten()
    }

    /// Bin holding areal depth `depth`; negative depths map to the surface
    /// bin and depths past the end to the last bin.
    pub fn bin_of(&self, depth: f64) -> usize {
        if depth <= 0.0 {
            return 0;
        }
        ((depth / self.depth_step) as usize).min(self.depth_steps - 1)
    }

    /// Zeroes weights and counts. Fractions are kept until the next
    /// [`normalize`](Self::normalize).
    pub fn clear(&mut self) {
        for row in &mut self.weight {
            row.fill(0.0);
        }
        for row in &mut self.count {
            row.fill(0);
        }
        self.weight_sum.fill(0.0);
        self.count_sum.fill(0);
    }

    /// Adds one event of element `z` with weight `w` to `bin`.
    ///
    /// Returns `false` and changes nothing if `z` is not tracked.
    pub fn deposit(&mut self, z: u32, bin: usize, w: f64) -> bool {
        let Some(i) = self.element_index(z) else {
            return false;
        };
        let bin = bin.min(self.depth_steps - 1);
        self.weight[i][bin] += w;
        self.count[i][bin] += 1;
        self.weight_sum[bin] += w;
        self.count_sum[bin] += 1;
        true
    }

    pub fn weight(&self, z: u32, bin: usize) -> f64 {
        self.element_index(z).map_or(0.0, |i| self.weight[i][bin])
    }

    pub fn count(&self, z: u32, bin: usize) -> u32 {
        self.element_index(z).map_or(0, |i| self.count[i][bin])
    }

    /// Fraction of element `z` in `bin` after the last normalisation.
    pub fn fraction(&self, z: u32, bin: usize) -> f64 {
        self.element_index(z).map_or(0.0, |i| self.fraction[i][bin])
    }

    pub(crate) fn fraction_row(&self, element: usize) -> &[f64] {
        &self.fraction[element]
    }

    pub fn total_weight(&self, bin: usize) -> f64 {
        self.weight_sum[bin]
    }

    pub fn total_count(&self, bin: usize) -> u32 {
        self.count_sum[bin]
    }

    /// Replaces the fractions with the normalised weights.
    ///
    /// Bins with too few events to be trusted borrow their composition:
    /// those above the first well-populated bin copy it, later ones copy
    /// the bin before them. A bin is sparse when it holds at most
    /// `max(1, N / (20·occupied bins))` events.
    pub fn normalize(&mut self) {
        for (i, row) in self.weight.iter().enumerate() {
            for (bin, &w) in row.iter().enumerate() {
                let sum = self.weight_sum[bin];
                self.fraction[i][bin] = if sum > 0.0 { w / sum } else { w };
            }
        }

        let occupied = self.count_sum.iter().filter(|&&n| n > 0).count() as u32;
        if occupied == 0 {
            debug!("no events in profile, nothing to normalise");
            return;
        }
        let total: u32 = self.count_sum.iter().sum();
        let sparse_limit = (total / (20 * occupied)).max(1);

        let first = self
            .count_sum
            .iter()
            .position(|&n| n > sparse_limit)
            .unwrap_or_else(|| {
                // no bin is above the limit: take the densest one
                let max = self.count_sum.iter().copied().max().unwrap_or(0);
                self.count_sum.iter().position(|&n| n == max).unwrap_or(0)
            });

        for row in &mut self.fraction {
            let value = row[first];
            row[..first].fill(value);
            for bin in first + 1..self.depth_steps {
                if self.count_sum[bin] <= sparse_limit {
                    row[bin] = row[bin - 1];
                }
            }
        }
    }
}
