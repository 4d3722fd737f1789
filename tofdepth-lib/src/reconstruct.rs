//! Iterative reconstruction of depth profiles from detected events.
//!
//! Each pass computes the beam energy at every depth bin through the
//! current composition, places every event at the depth where its energy
//! matches the kinematics, corrects its weight by the cross section there,
//! and rebins the events into a new composition.

use std::path::Path;

use log::{debug, info};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::composite::{CompositeStopping, ElementStopping};
use crate::concentration::ConcentrationProfile;
use crate::cross_section::{erd_cross_section, rbs_cross_section};
use crate::eloss::energy_loss;
use crate::error::{Result, TofDepthError};
use crate::events::{Event, EventCensus};
use crate::gsto::StoppingTable;
use crate::kinematics::EventKind;
use crate::setup::DepthSetup;

/// Where a [`Reconstructor`] is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    StoppingLoaded,
    ConcentrationSeeded,
    PrimaryEnergyComputed,
    DepthAssigned,
    ConcentrationRebinned,
}

/// Depth and corrected weight found for one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub depth: f64,
    /// Zero when the event could not be placed inside the depth range.
    pub weight: f64,
}

#[derive(Debug, Clone)]
struct StoppingState {
    elements: ElementStopping,
    composite: CompositeStopping,
}

pub struct Reconstructor {
    setup: DepthSetup,
    events: Vec<Event>,
    census: EventCensus,
    stopping: Option<StoppingState>,
    conc: ConcentrationProfile,
    beam_energy: Vec<f64>,
    stage: Stage,
    passes: usize,
}

impl Reconstructor {
    pub fn new(setup: DepthSetup, events: Vec<Event>) -> Result<Self> {
        setup.validate(Path::new("setup"))?;
        let census = EventCensus::new(&events, setup.beam.z);
        let conc = ConcentrationProfile::new(&census.elements(), setup.depth_step, setup.depth_steps);
        let beam_energy = vec![0.0; setup.depth_steps];
        Ok(Reconstructor {
            setup,
            events,
            census,
            stopping: None,
            conc,
            beam_energy,
            stage: Stage::Init,
            passes: 0,
        })
    }

    pub fn setup(&self) -> &DepthSetup {
        &self.setup
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn census(&self) -> &EventCensus {
        &self.census
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn concentration(&self) -> &ConcentrationProfile {
        &self.conc
    }

    /// Beam energy (J) at the top of every depth bin.
    pub fn beam_energy(&self) -> &[f64] {
        &self.beam_energy
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Highest classical speed of the beam or any detected particle.
    pub fn fastest(&self) -> f64 {
        let beam = (2.0 * self.setup.energy / self.setup.beam.mass).sqrt();
        self.events.iter().map(Event::velocity).fold(beam, f64::max)
    }

    /// Assigns every pair of present elements in `table`, loads the data
    /// and samples it for the run.
    ///
    /// A present pair that no source covers, or that lies past the table's
    /// largest Z, fails the run before anything is read.
    pub fn load_stopping(&mut self, table: &mut StoppingTable) -> Result<()> {
        let elements = self.census.elements();
        for &z1 in &elements {
            for &z2 in &elements {
                if table.auto_assign(z1, z2) {
                    continue;
                }
                if z1 > table.z1_max() {
                    return Err(TofDepthError::AtomicNumberOutOfRange { z: z1, max: table.z1_max() });
                }
                if z2 > table.z2_max() {
                    return Err(TofDepthError::AtomicNumberOutOfRange { z: z2, max: table.z2_max() });
                }
                return Err(TofDepthError::UnassignedPair { z1, z2 });
            }
        }
        table.load()?;
        table.log_assignments();
        let sampled = ElementStopping::from_table(table, &elements, self.fastest());
        self.set_stopping(sampled)
    }

    /// Uses already sampled element stopping instead of a table.
    pub fn set_stopping(&mut self, elements: ElementStopping) -> Result<()> {
        if let Some(&z) = self
            .census
            .elements()
            .iter()
            .find(|z| !elements.elements().contains(z))
        {
            return Err(TofDepthError::StoppingData(format!(
                "no sampled stopping for Z={z}"
            )));
        }
        let composite = CompositeStopping::new(&elements, self.setup.depth_step, self.setup.depth_steps);
        self.stopping = Some(StoppingState { elements, composite });
        self.stage = Stage::StoppingLoaded;
        Ok(())
    }

    fn state(&self) -> Result<&StoppingState> {
        self.stopping
            .as_ref()
            .ok_or_else(|| TofDepthError::StoppingData("stopping not loaded".to_string()))
    }

    /// First guess: every event at the surface with a weight that roughly
    /// undoes the Rutherford scaling.
    pub fn seed(&mut self) -> Result<()> {
        self.state()?;
        let beam_mass = self.setup.beam.mass;
        self.conc.clear();
        for event in &mut self.events {
            event.depth = 0.0;
            event.weight = event.seed_weight(beam_mass);
            self.conc.deposit(event.z, 0, event.weight);
        }
        self.rebuild_composition();
        self.stage = Stage::ConcentrationSeeded;
        Ok(())
    }

    fn rebuild_composition(&mut self) {
        self.conc.normalize();
        if let Some(state) = self.stopping.as_mut() {
            state.composite.update(&state.elements, &self.conc);
        }
    }

    /// Beam energy at every depth bin through the current composition.
    pub fn calculate_primary_energy(&mut self) -> Result<()> {
        let state = self.stopping.as_ref().ok_or_else(|| {
            TofDepthError::StoppingData("stopping not loaded".to_string())
        })?;
        let beam = self.setup.beam;
        let dstep = self.setup.depth_step;
        let path = dstep / self.setup.target_angle.sin();
        let mut e = self.setup.energy;
        let mut d = 0.0;
        for slot in self.beam_energy.iter_mut() {
            *slot = e;
            e -= energy_loss(&state.composite, beam.z, beam.mass, e, d, path);
            d += dstep;
        }
        self.stage = Stage::PrimaryEnergyComputed;
        Ok(())
    }

    /// Depth and weight of `event` for the current beam energy table.
    pub fn place(&self, event: &Event) -> Result<Placement> {
        let state = self.state()?;
        Ok(self.place_with(&state.composite, event))
    }

    fn place_with(&self, composite: &CompositeStopping, event: &Event) -> Placement {
        let setup = &self.setup;
        let beam = setup.beam;
        let ebeam = &self.beam_energy;
        let n = ebeam.len();
        let dstep = setup.depth_step;
        let path = dstep / (event.theta - setup.target_angle).sin();
        let k = event.kind.kinematic_factor(beam.mass, event.mass, event.theta);
        let (out_z, out_mass) = match event.kind {
            EventKind::Erd => (event.z, event.mass),
            EventKind::Rbs => (beam.z, beam.mass),
        };
        let crossing = |above: f64, below: f64, found: f64, de: f64| {
            let rk = de / dstep;
            let bk = (below - above) / dstep;
            if rk - bk > 0.0 { (above - (found - de)) / (rk - bk) } else { 0.0 }
        };

        let mut rec_e = event.energy;
        let (depth, beam_e) = if rec_e >= ebeam[0] * k {
            // came out with more than the surface allows: place above it
            let de = energy_loss(composite, out_z, out_mass, rec_e, 0.0, path);
            let depth = -0.5 * dstep + crossing(ebeam[0] * k, ebeam[1] * k, rec_e, de);
            (depth, ebeam[0])
        } else {
            let mut id = 0;
            let mut d = 0.0;
            let mut de = 0.0;
            let mut beam_k = ebeam[0] * k;
            while id < n && rec_e < beam_k {
                de = energy_loss(composite, out_z, out_mass, rec_e, d, path);
                rec_e += de;
                id += 1;
                d += dstep;
                if id < n {
                    beam_k = ebeam[id] * k;
                }
            }
            if id >= n {
                return Placement { depth: d, weight: 0.0 };
            }
            let depth = (d - dstep) + crossing(ebeam[id - 1] * k, beam_k, rec_e, de);
            let beam_e = ebeam[id] + (depth - id as f64 * dstep) * (ebeam[id] - ebeam[id - 1]) / dstep;
            (depth, beam_e)
        };

        let sigma = match event.kind {
            EventKind::Erd => erd_cross_section(
                &setup.cross_section,
                (beam.z, beam.mass),
                (event.z, event.mass),
                event.theta,
                beam_e,
            ),
            EventKind::Rbs => rbs_cross_section(
                &setup.cross_section,
                (beam.z, beam.mass),
                (event.z, event.mass),
                event.theta,
                beam_e,
            ),
        };
        let weight = if sigma > 0.0 && sigma.is_finite() {
            event.raw_weight / sigma
        } else {
            0.0
        };
        Placement { depth, weight }
    }

    /// Places every event and rebins the composition from them.
    pub fn calculate_recoil_depths(&mut self) -> Result<()> {
        let state = self.state()?;
        #[cfg(feature = "parallel")]
        let placements: Vec<Placement> = self
            .events
            .par_iter()
            .map(|event| self.place_with(&state.composite, event))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let placements: Vec<Placement> = self
            .events
            .iter()
            .map(|event| self.place_with(&state.composite, event))
            .collect();
        self.stage = Stage::DepthAssigned;

        self.conc.clear();
        let mut dropped = 0usize;
        for (event, placement) in self.events.iter_mut().zip(placements) {
            event.depth = placement.depth;
            event.weight = placement.weight;
            if placement.weight > 0.0 {
                let bin = self.conc.bin_of(placement.depth);
                self.conc.deposit(event.z, bin, placement.weight);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("{dropped} events beyond the depth range");
        }
        self.rebuild_composition();
        self.stage = Stage::ConcentrationRebinned;
        Ok(())
    }

    /// One full pass. Returns the largest change of the beam energy table
    /// relative to the beam energy.
    pub fn iterate(&mut self) -> Result<f64> {
        let previous = self.beam_energy.clone();
        self.calculate_primary_energy()?;
        let change = previous
            .iter()
            .zip(&self.beam_energy)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
            / self.setup.energy;
        self.calculate_recoil_depths()?;
        self.passes += 1;
        Ok(change)
    }

    /// Seeds and runs the configured number of passes, stopping early when
    /// a convergence threshold is set and met.
    pub fn run(&mut self) -> Result<()> {
        info!("using {} cross sections", self.setup.cross_section);
        self.seed()?;
        for pass in 0..self.setup.iterations {
            let change = self.iterate()?;
            info!("pass {} done, beam energy table changed by {change:.3e}", pass + 1);
            if let Some(limit) = self.setup.convergence {
                if pass > 0 && change < limit {
                    info!("converged after {} passes", pass + 1);
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{AMU, AREAL_1E15_CM2, DEG, EVCM2_1E15ATOMS, MEV};
    use crate::gsto::SourceDescriptor;
    use crate::setup::Beam;
    use tofdepth_data::StoppingKind;

    fn setup() -> DepthSetup {
        DepthSetup {
            beam: Beam { z: 2, a: 4, mass: 4.0026 * AMU },
            energy: 2.0 * MEV,
            detector_angle: 40.0 * DEG,
            target_angle: 20.0 * DEG,
            depth_steps: 20,
            ..Default::default()
        }
    }

    fn rbs(energy_mev: f64) -> Event {
        Event {
            theta: 40.0 * DEG,
            azimuth: 0.0,
            energy: energy_mev * MEV,
            kind: EventKind::Rbs,
            z: 14,
            a: 28,
            mass: 27.977 * AMU,
            raw_weight: 1.0,
            count: 1,
            weight: 1.0,
            depth: 0.0,
        }
    }

    fn flat_stopping(elements: &[u32], fastest: f64) -> ElementStopping {
        ElementStopping::from_fn(elements, fastest * 1.2, 101, |_, _, _| 50.0 * EVCM2_1E15ATOMS)
    }

    #[test]
    fn test_requires_stopping() {
        let mut r = Reconstructor::new(setup(), vec![rbs(1.0)]).unwrap();
        assert_eq!(r.stage(), Stage::Init);
        assert!(r.seed().is_err());
        assert!(r.set_stopping(flat_stopping(&[2], 1.0e7)).is_err());
    }

    #[test]
    fn test_beam_energy_decreases_linearly() {
        let mut r = Reconstructor::new(setup(), vec![rbs(1.0)]).unwrap();
        let fastest = r.fastest();
        r.set_stopping(flat_stopping(&[2, 14], fastest)).unwrap();
        r.seed().unwrap();
        r.calculate_primary_energy().unwrap();
        let loss = 50.0 * EVCM2_1E15ATOMS * 100.0 * AREAL_1E15_CM2 / (20.0 * DEG).sin();
        for pair in r.beam_energy().windows(2) {
            assert!(((pair[0] - pair[1]) - loss).abs() < 1e-6 * loss);
        }
    }

    #[test]
    fn test_surface_event_lands_above_surface() {
        let mut r = Reconstructor::new(setup(), vec![rbs(1.95)]).unwrap();
        let fastest = r.fastest();
        r.set_stopping(flat_stopping(&[2, 14], fastest)).unwrap();
        r.seed().unwrap();
        r.calculate_primary_energy().unwrap();
        let event = r.events()[0].clone();
        let placement = r.place(&event).unwrap();
        assert!(placement.depth < 0.0);
        assert!(placement.weight > 0.0);
    }

    fn table_covering(z_max: u32, covered: u32) -> StoppingTable {
        let mut table = StoppingTable::new(z_max, z_max);
        table
            .register_source(SourceDescriptor {
                name: "light".to_string(),
                path: "light.dat".into(),
                kind: StoppingKind::Total,
                z1_min: 1,
                z1_max: covered,
                z2_min: 1,
                z2_max: covered,
            })
            .unwrap();
        table
    }

    #[test]
    fn test_uncovered_pair_fails_load() {
        let mut r = Reconstructor::new(setup(), vec![rbs(1.0)]).unwrap();
        let mut table = table_covering(20, 2);
        let err = r.load_stopping(&mut table).unwrap_err();
        assert!(matches!(err, TofDepthError::UnassignedPair { z1: 2, z2: 14 }));
        assert_eq!(err.exit_code(), 8);
        assert_eq!(r.stage(), Stage::Init);
        assert!(r.run().is_err());
    }

    #[test]
    fn test_element_past_table_fails_load() {
        let mut r = Reconstructor::new(setup(), vec![rbs(1.0)]).unwrap();
        let mut table = table_covering(10, 10);
        let err = r.load_stopping(&mut table).unwrap_err();
        assert!(matches!(err, TofDepthError::AtomicNumberOutOfRange { z: 14, max: 10 }));
        assert_eq!(err.exit_code(), 8);
    }

    #[test]
    fn test_too_deep_is_dropped() {
        let mut r = Reconstructor::new(setup(), vec![rbs(0.05)]).unwrap();
        let fastest = r.fastest();
        r.set_stopping(flat_stopping(&[2, 14], fastest)).unwrap();
        r.run().unwrap();
        assert_eq!(r.events()[0].weight, 0.0);
        assert_eq!(r.passes(), 4);
    }
}
