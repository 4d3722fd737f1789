use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use log::{info, warn};

use crate::constants::{AMU, MEV};
use crate::error::{Result, TofDepthError};
use crate::fields::Fields;
use crate::kinematics::EventKind;

/// Default cap on the number of events read from one list.
pub const MAX_EVENTS: usize = 10_000_000;

/// One detected particle.
///
/// `depth` and `weight` are rewritten by every reconstruction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Recoil or scattering angle in the lab (rad).
    pub theta: f64,
    /// Azimuthal offset as given in the list.
    pub azimuth: f64,
    /// Detected energy (J).
    pub energy: f64,
    pub kind: EventKind,
    pub z: u32,
    /// Mass number, the rounded mass in u.
    pub a: u32,
    /// Mass (kg).
    pub mass: f64,
    pub raw_weight: f64,
    pub count: u32,
    pub weight: f64,
    pub depth: f64,
}

impl Event {
    /// Classical speed of the detected particle.
    pub fn velocity(&self) -> f64 {
        (2.0 * self.energy / self.mass).sqrt()
    }

    /// Weight used before any depth is known, roughly removing the
    /// Rutherford dependence on the target.
    pub fn seed_weight(&self, beam_mass: f64) -> f64 {
        let scale = self.z as f64 * (1.0 + beam_mass / self.mass);
        self.raw_weight / (scale * scale)
    }

    /// Parses `x y E(MeV) Z M(u) type w n`. `Ok(None)` means the line is
    /// not a complete record.
    fn parse(line: &str, lineno: usize, detector_angle: f64) -> Result<Option<Event>> {
        let mut fields = Fields::new(line);
        let (Some(x), Some(y), Some(e), Some(z), Some(m)) = (
            fields.parse_next::<f64>(),
            fields.parse_next::<f64>(),
            fields.parse_next::<f64>(),
            fields.parse_next::<u32>(),
            fields.parse_next::<f64>(),
        ) else {
            return Ok(None);
        };
        let Some(kind) = fields.next() else {
            return Ok(None);
        };
        let kind: EventKind = kind
            .parse()
            .map_err(|found| TofDepthError::InvalidEventType { line: lineno, found })?;
        let (Some(w), Some(n)) = (fields.parse_next::<f64>(), fields.parse_next::<u32>()) else {
            return Ok(None);
        };
        Ok(Some(Event {
            theta: detector_angle + x,
            azimuth: y,
            energy: e * MEV,
            kind,
            z,
            a: (m + 0.5) as u32,
            mass: m * AMU,
            raw_weight: w,
            count: n,
            weight: w,
            depth: 0.0,
        }))
    }
}

/// Reads an event list. `origin` only names the stream in errors.
///
/// Incomplete lines are logged and skipped; an event type other than ERD
/// or RBS stops the read. At most `max_events` events are kept.
pub fn read_events<R: BufRead>(
    reader: R,
    origin: &Path,
    detector_angle: f64,
    max_events: usize,
) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let lineno = i + 1;
        let line = line.map_err(|e| TofDepthError::io(origin, e))?;
        if line.trim().is_empty() {
            continue;
        }
        if events.len() >= max_events {
            warn!("too many events, reading stopped at line {lineno}");
            break;
        }
        match Event::parse(&line, lineno, detector_angle)? {
            Some(event) => events.push(event),
            None => warn!("problems at input line {lineno} of {}", origin.display()),
        }
    }
    info!("{} events read", events.len());
    Ok(events)
}

/// Opens `path` (`-` for standard input) and reads it with [`read_events`].
pub fn load_events(path: &Path, detector_angle: f64, max_events: usize) -> Result<Vec<Event>> {
    if path == Path::new("-") {
        return read_events(io::stdin().lock(), path, detector_angle, max_events);
    }
    let file = File::open(path).map_err(|e| TofDepthError::io(path, e))?;
    read_events(BufReader::new(file), path, detector_angle, max_events)
}

/// Elements and nuclides present in a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventCensus {
    /// Z -> mass number -> number of events
    nuclides: BTreeMap<u32, BTreeMap<u32, usize>>,
}

impl EventCensus {
    /// Census of `events`; `beam_z` is always listed as an element even
    /// without events of its own.
    pub fn new(events: &[Event], beam_z: u32) -> Self {
        let mut nuclides: BTreeMap<u32, BTreeMap<u32, usize>> = BTreeMap::new();
        nuclides.entry(beam_z).or_default();
        for event in events {
            *nuclides.entry(event.z).or_default().entry(event.a).or_default() += 1;
        }
        EventCensus { nuclides }
    }

    /// Atomic numbers in increasing order.
    pub fn elements(&self) -> Vec<u32> {
        self.nuclides.keys().copied().collect()
    }

    /// Mass numbers seen for `z`, increasing.
    pub fn mass_numbers(&self, z: u32) -> Vec<u32> {
        self.nuclides
            .get(&z)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn events_of(&self, z: u32, a: u32) -> usize {
        self.nuclides.get(&z).and_then(|m| m.get(&a)).copied().unwrap_or(0)
    }

    /// Every (Z, A) with at least one event.
    pub fn nuclides(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.nuclides
            .iter()
            .flat_map(|(&z, m)| m.keys().map(move |&a| (z, a)))
    }
}
