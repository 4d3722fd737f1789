use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use tofdepth::constants::{AMU, AREAL_1E15_CM2, DEG, EVCM2_1E15ATOMS, MEV};
use tofdepth::cross_section::rbs_cross_section;
use tofdepth::events::{MAX_EVENTS, read_events};
use tofdepth::gsto::write_header;
use tofdepth::tofdepth_data::{DataFormat, StoppingHeader, StoppingUnit, XScale, XUnit};
use tofdepth::{
    Beam, CrossSectionModel, DepthProfile, DepthSetup, ElementStopping, Event, EventKind,
    IsotopeTable, OutputProfile, Reconstructor, Stage, StoppingTable, energy_loss, load_events,
};

const STOPPING: f64 = 50.0;
const SILICON: f64 = 27.977;

fn helium_on_silicon(depth_steps: usize) -> DepthSetup {
    DepthSetup {
        beam: Beam {
            z: 2,
            a: 4,
            mass: 4.0026 * AMU,
        },
        energy: 2.0 * MEV,
        detector_angle: 40.0 * DEG,
        target_angle: 20.0 * DEG,
        depth_steps,
        ..Default::default()
    }
}

fn flat_stopping(r: &Reconstructor) -> ElementStopping {
    ElementStopping::from_fn(r.census().elements().as_slice(), r.fastest() * 1.2, 1001, |_, _, _| {
        STOPPING * EVCM2_1E15ATOMS
    })
}

fn rbs_factor(m1: f64, m2: f64, theta: f64) -> f64 {
    let root = (m2 * m2 - (m1 * theta.sin()).powi(2)).sqrt();
    ((root + m1 * theta.cos()) / (m1 + m2)).powi(2)
}

/// Depth of an RBS event of energy `e` for a constant stopping, with equal
/// entry and exit angles of 20° to the surface.
fn expected_depth(setup: &DepthSetup, e: f64) -> f64 {
    let k = rbs_factor(setup.beam.mass, SILICON * AMU, 40.0 * DEG);
    let s = STOPPING * EVCM2_1E15ATOMS / (20.0 * DEG).sin();
    (setup.energy * k - e) / (s * (1.0 + k))
}

fn spectrum() -> String {
    (0..50)
        .map(|i| {
            let e = 0.3 + 1.5 * i as f64 / 49.0;
            format!("0.0 0.0 {e:.6} 14 {SILICON} RBS 1.0 1\n")
        })
        .collect()
}

#[test]
fn test_helium_rbs_on_silicon() {
    let setup = helium_on_silicon(100);
    let events = read_events(spectrum().as_bytes(), Path::new("spectrum"), setup.detector_angle, MAX_EVENTS).unwrap();
    assert_eq!(events.len(), 50);

    let mut r = Reconstructor::new(setup, events).unwrap();
    let stopping = flat_stopping(&r);
    r.set_stopping(stopping).unwrap();
    r.run().unwrap();
    assert_eq!(r.stage(), Stage::ConcentrationRebinned);
    assert_eq!(r.passes(), 4);

    assert!(r.beam_energy().windows(2).all(|pair| pair[1] < pair[0]));

    let step = r.setup().depth_step;
    for event in [&r.events()[0], &r.events()[49]] {
        let expected = expected_depth(r.setup(), event.energy);
        assert!(
            (event.depth - expected).abs() < 0.01 * step,
            "{} vs {} (1e15 at/cm²)",
            event.depth / AREAL_1E15_CM2,
            expected / AREAL_1E15_CM2
        );
        assert!(event.weight > 0.0);
    }

    let conc = r.concentration();
    let landed: BTreeSet<usize> = r.events().iter().map(|e| conc.bin_of(e.depth)).collect();
    for bin in 0..conc.depth_steps() {
        assert_eq!(conc.weight(14, bin) > 0.0, landed.contains(&bin), "bin {bin}");
        assert_eq!(conc.weight(2, bin), 0.0);
    }
}

#[test]
fn test_uniform_slab_round_trip() {
    let setup = helium_on_silicon(40);
    let beam = setup.beam;
    let mass = SILICON * AMU;
    let k = rbs_factor(beam.mass, mass, 40.0 * DEG);
    let flat = |_: u32, _: f64, _: f64| STOPPING * EVCM2_1E15ATOMS;
    let sin = (20.0 * DEG).sin();

    // 2000e15 at/cm² of Si, events spread evenly and weighted by the
    // cross section so that every corrected weight is one
    let events: Vec<Event> = (0..400)
        .map(|j| {
            let x = (j as f64 + 0.5) * 5.0 * AREAL_1E15_CM2;
            let e_beam = setup.energy - energy_loss(&flat, 2, beam.mass, setup.energy, 0.0, x / sin);
            let e_out = k * e_beam;
            let energy = e_out - energy_loss(&flat, 2, beam.mass, e_out, 0.0, x / sin);
            let sigma = rbs_cross_section(
                &CrossSectionModel::Rutherford,
                (beam.z, beam.mass),
                (14, mass),
                40.0 * DEG,
                e_beam,
            );
            Event {
                theta: 40.0 * DEG,
                azimuth: 0.0,
                energy,
                kind: EventKind::Rbs,
                z: 14,
                a: 28,
                mass,
                raw_weight: sigma,
                count: 1,
                weight: sigma,
                depth: 0.0,
            }
        })
        .collect();

    let mut r = Reconstructor::new(setup, events).unwrap();
    let stopping = flat_stopping(&r);
    r.set_stopping(stopping).unwrap();
    r.run().unwrap();

    let profile = OutputProfile::new(r.setup(), r.events());
    assert_eq!(profile.bins(), 50);
    assert_relative_eq!(profile.scale(), 20.0, max_relative = 1e-6);
    for ip in 0..profile.bins() {
        let c = profile.weight(14, 28, ip) / profile.scale();
        if (10..30).contains(&ip) {
            assert_relative_eq!(c, 1.0, max_relative = 1e-2);
        } else {
            assert_eq!(c, 0.0, "bin {ip}");
        }
    }
}

const MASSES: &str = "\
2 2 4 He 4002603.254 99.999863
1 2 3 He 3016029.322 0.000137
14 14 28 Si 27976926.535 92.2297
15 14 29 Si 28976494.665 4.6832
16 14 30 Si 29973770.171 3.0872
";

const SETUP: &str = "\
Beam: 4He
Energy: 2.0
Detector angle: 40
Target angle: 20
Toflen: 684.0
Depth step for stopping: 100
Number of depth steps: 100
Number of iterations: 3
";

fn write_run_files(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("masses.dat"), MASSES).unwrap();
    fs::write(dir.join("erd_depth.in"), SETUP).unwrap();
    fs::write(dir.join("events.txt"), spectrum()).unwrap();
    fs::write(dir.join("stoppings.txt"), "flat.dat total 1 14 1 14 test flat\n").unwrap();

    let header = StoppingHeader {
        stopping_unit: StoppingUnit::Ev15Cm2,
        x_unit: XUnit::MetersPerSecond,
        format: DataFormat::Ascii,
        x_min: 1.0e4,
        x_max: 3.0e7,
        x_points: 3,
        x_scale: XScale::Linear,
        ..Default::default()
    };
    let mut text = write_header(&header);
    for _ in 0..14 * 14 * 3 {
        text.push_str(&format!("{STOPPING}\n"));
    }
    fs::write(dir.join("flat.dat"), text).unwrap();
}

#[test]
fn test_pipeline_from_files() {
    let dir: PathBuf = std::env::temp_dir().join(format!("tofdepth-run-{}", std::process::id()));
    write_run_files(&dir);

    let masses = IsotopeTable::load(dir.join("masses.dat")).unwrap();
    let setup = DepthSetup::load(dir.join("erd_depth.in"), &masses).unwrap();
    assert_eq!(setup.iterations, 3);
    let events = load_events(&dir.join("events.txt"), setup.detector_angle, MAX_EVENTS).unwrap();

    let mut r = Reconstructor::new(setup, events).unwrap();
    let z_max = r.census().elements().last().copied().unwrap();
    let mut table = StoppingTable::from_settings(z_max, dir.join("stoppings.txt")).unwrap();
    r.load_stopping(&mut table).unwrap();
    assert_eq!(r.stage(), Stage::StoppingLoaded);
    r.run().unwrap();
    assert_eq!(r.passes(), 3);

    let step = r.setup().depth_step;
    let first = &r.events()[0];
    assert!((first.depth - expected_depth(r.setup(), first.energy)).abs() < 0.01 * step);

    let profile = OutputProfile::new(r.setup(), r.events());
    let prefix = dir.join("depth");
    let written = profile
        .write_files(prefix.to_str().unwrap(), r.census(), &masses)
        .unwrap();
    assert_eq!(written, [dir.join("depth.Si"), dir.join("depth.total")]);

    let silicon = DepthProfile::from_file(&written[0], tofdepth::DepthUnit::Areal).unwrap();
    assert_eq!(silicon.len(), profile.bins());
    let total = DepthProfile::from_file(&written[1], tofdepth::DepthUnit::Areal).unwrap();
    // one element, so its profile is the total
    let diff = silicon.checked_sub(&total).unwrap();
    for (d, t) in diff.concentration.iter().zip(&total.concentration) {
        assert!(d.abs() <= 1e-4 + 1e-3 * t.abs(), "{d} off {t}");
    }
    fs::remove_dir_all(&dir).unwrap();
}
