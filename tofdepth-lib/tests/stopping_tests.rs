use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;
use tofdepth::gsto::write_header;
use tofdepth::tofdepth_data::{DataFormat, StoppingHeader, StoppingKind, StoppingUnit, XScale, XUnit};
use tofdepth::{StoppingTable, TofDepthError};

const LIST: &str = "\
# file type z1min z1max z2min z2max origin name
data/stop.dat total 1 3 1 4 test synthetic
data/other.dat none 1 92 1 92 test unused
broken.dat total 5 2 1 4 test inverted
data/wide.dat electronic 1 92 1 92 test wide
";

fn value(z1: u32, z2: u32, i: usize) -> f64 {
    (100 * z1 + 10 * z2) as f64 + i as f64
}

/// Writes the stopping list and the synthetic data file; `wide.dat` is
/// left missing on purpose.
fn write_fixture(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tofdepth-{name}-{}", std::process::id()));
    fs::create_dir_all(dir.join("data")).unwrap();
    let header = StoppingHeader {
        stopping_unit: StoppingUnit::Ev15Cm2,
        x_unit: XUnit::MetersPerSecond,
        format: DataFormat::Ascii,
        x_min: 1.0e5,
        x_max: 1.1e6,
        x_points: 11,
        x_scale: XScale::Linear,
        ..Default::default()
    };
    let mut text = write_header(&header);
    for z1 in 1..=3 {
        for z2 in 1..=4 {
            text.push_str(&format!("# Z1={z1} Z2={z2}\n"));
            for i in 0..11 {
                text.push_str(&format!("{}\n", value(z1, z2, i)));
            }
        }
    }
    fs::write(dir.join("data/stop.dat"), text).unwrap();
    fs::write(dir.join("stoppings.txt"), LIST).unwrap();
    dir
}

#[test]
fn test_settings_list() {
    let dir = write_fixture("list");
    let table = StoppingTable::from_settings(6, dir.join("stoppings.txt")).unwrap();
    let names: Vec<&str> = table.sources().iter().map(|s| s.name()).collect();
    assert_eq!(names, ["synthetic", "wide"]);
    assert_eq!(table.sources()[0].descriptor().kind, StoppingKind::Total);
    assert_eq!(table.sources()[1].descriptor().kind, StoppingKind::Electronic);
    assert_eq!(table.sources()[0].descriptor().path, dir.join("data/stop.dat"));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_missing_data_file_aborts_load() {
    let dir = write_fixture("missing");
    let mut table = StoppingTable::from_settings(6, dir.join("stoppings.txt")).unwrap();
    assert_eq!(table.auto_assign_range(1, 6, 1, 6), 36);
    assert_eq!(table.assigned_source(3, 4), Some(0));
    assert_eq!(table.assigned_source(5, 5), Some(1));
    let err = table.load().unwrap_err();
    assert!(matches!(err, TofDepthError::StoppingFile { .. }));
    assert_eq!(err.exit_code(), 8);
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_lookup_from_files() {
    let dir = write_fixture("lookup");
    let mut table = StoppingTable::from_settings(6, dir.join("stoppings.txt")).unwrap();
    assert_eq!(table.auto_assign_range(1, 3, 1, 4), 12);
    // wide.dat has nothing assigned and is never opened
    table.load().unwrap();

    assert_relative_eq!(table.lookup(2, 3, 4.0e5), value(2, 3, 3), max_relative = 1e-12);
    assert_relative_eq!(table.lookup(2, 3, 4.5e5), value(2, 3, 3) + 0.5, max_relative = 1e-12);
    assert_eq!(table.raw(2, 3, 10).unwrap(), value(2, 3, 10));

    // open interval: both ends and beyond give zero
    assert_eq!(table.lookup(1, 1, 1.0e5), 0.0);
    assert_eq!(table.lookup(1, 1, 1.1e6), 0.0);
    assert_eq!(table.lookup(1, 1, 2.0e6), 0.0);

    let sampled = table.table_over_range(1, 1, 2.0e5, 6.0e5, 5);
    for (i, s) in sampled.iter().enumerate() {
        assert_relative_eq!(*s, value(1, 1, i + 1), max_relative = 1e-12);
    }

    assert!(matches!(
        table.stopping(5, 5, 4.0e5),
        Err(TofDepthError::UnassignedPair { z1: 5, z2: 5 })
    ));
    assert_eq!(table.lookup(5, 5, 4.0e5), 0.0);
    let err = table.stopping(7, 1, 4.0e5).unwrap_err();
    assert!(matches!(err, TofDepthError::AtomicNumberOutOfRange { z: 7, .. }));
    assert_eq!(err.exit_code(), 8);
    fs::remove_dir_all(&dir).unwrap();
}
