//! Test feeder shared by the unit tests.
//!
//! ```text
//! sourcebus -l0- b1 -sw1- b2 -l2- b3
//!                 |        `-sw4- b40 . . sw7 (NA) . . b27
//!                 |-sw2- b30 -sw6- b50 . . sw8 (NA) . . b14
//!                 `-sw5- b20 -l20- b21 - ... - b27
//!                         `-sw3- b12 -l12- b13 -l13- b14
//! ```
//!
//! Opening sw3 drops {b12, b13, b14} = 45.2 kW; opening sw5 drops the whole
//! b20..b27 chain plus the sw3 branch = 60.0 kW.

use crate::case::*;
use crate::load::LoadModel;
use crate::topology::Topology;

pub fn lines() -> Vec<Line> {
    let mut lines = vec![
        Line::new("l0", "sourcebus", "b1", LineKind::Fixed),
        Line::new("sw1", "b1", "b2", LineKind::Nf),
        Line::new("l2", "b2", "b3", LineKind::Fixed),
        Line::new("sw4", "b2", "b40", LineKind::Nf),
        Line::new("sw2", "b1", "b30", LineKind::Nf),
        Line::new("sw6", "b30", "b50", LineKind::Nf),
        Line::new("sw5", "b1", "b20", LineKind::Nf),
        Line::new("sw3", "b20", "b12", LineKind::Nf),
        Line::new("l12", "b12", "b13", LineKind::Fixed),
        Line::new("l13", "b13", "b14", LineKind::Fixed),
        Line::new("sw7", "b40", "b27", LineKind::Na),
        Line::new("sw8", "b50", "b14", LineKind::Na),
    ];
    for i in 20..27 {
        lines.push(Line::new(
            &format!("l{i}"),
            &format!("b{i}"),
            &format!("b{}", i + 1),
            LineKind::Fixed,
        ));
    }
    lines
}

pub fn loads() -> Vec<LoadEntry> {
    vec![
        LoadEntry::new("s1", "b1", 5.0),
        LoadEntry::new("s2", "b2", 10.0),
        LoadEntry::new("s3", "b3", 4.0),
        LoadEntry::new("s30", "b30", 7.0),
        LoadEntry::new("s40", "b40", 8.0),
        LoadEntry::new("s50", "b50", 6.0),
        LoadEntry::new("s12", "b12", 15.0),
        LoadEntry::new("s13", "b13.2", 20.2),
        LoadEntry::new("s14", "B14", 10.0),
        LoadEntry::new("s20", "b20", 2.0),
        LoadEntry::new("s21", "b21", 2.0),
        LoadEntry::new("s22", "b22", 2.0),
        LoadEntry::new("s23", "b23", 2.0),
        LoadEntry::new("s24", "b24", 2.0),
        LoadEntry::new("s25", "b25", 2.0),
        LoadEntry::new("s26", "b26", 1.4),
        LoadEntry::new("s27", "b27", 1.4),
    ]
}

pub fn topology() -> Topology {
    Topology::build(BusId::new("sourcebus"), lines()).expect("fixture feeder is radial")
}

pub fn load_model() -> LoadModel {
    LoadModel::from_entries(loads())
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
