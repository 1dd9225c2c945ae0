use crate::grid::{BACK_OFFSET, FACE_COLUMNS, ROWS};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Row of the back face nearest the limb's root.
pub const ROOT_ROW: usize = ROWS - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Named regions of the vest used by the limb mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Zone {
    /// Bottom row, center pair: where the limb attaches.
    RootCenter,
    LowerCenter,
    MidCenter,
    UpperCenter,
    /// Outer columns of the two bottom rows.
    TipDiffuse,
    SwayLeft,
    SwayRight,
}

impl Zone {
    pub const ALL: [Zone; 7] = [
        Zone::RootCenter,
        Zone::LowerCenter,
        Zone::MidCenter,
        Zone::UpperCenter,
        Zone::TipDiffuse,
        Zone::SwayLeft,
        Zone::SwayRight,
    ];

    /// Center clusters ordered from the root upward.
    pub const SPINE: [Zone; 4] = [
        Zone::RootCenter,
        Zone::LowerCenter,
        Zone::MidCenter,
        Zone::UpperCenter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Zone::RootCenter => "root-center",
            Zone::LowerCenter => "lower-center",
            Zone::MidCenter => "mid-center",
            Zone::UpperCenter => "upper-center",
            Zone::TipDiffuse => "tip-diffuse",
            Zone::SwayLeft => "sway-left",
            Zone::SwayRight => "sway-right",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown haptic zone {0:?}")]
pub struct UnknownZone(pub String);

impl FromStr for Zone {
    type Err = UnknownZone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zone::ALL
            .into_iter()
            .find(|z| z.name() == s)
            .ok_or_else(|| UnknownZone(s.to_string()))
    }
}

/// Front and back index of the outer column on `side` for `row`.
/// `None` when `row` is past the last row.
pub fn side_columns(row: usize, side: Side) -> Option<[usize; 2]> {
    if row >= ROWS {
        return None;
    }
    let col = match side {
        Side::Left => 0,
        Side::Right => FACE_COLUMNS - 1,
    };
    let front = row * FACE_COLUMNS + col;
    Some([front, BACK_OFFSET + front])
}

/// The two middle back-face actuators of `row`.
pub fn center_pair(row: usize) -> Option<[usize; 2]> {
    if row >= ROWS {
        return None;
    }
    let base = BACK_OFFSET + row * FACE_COLUMNS;
    Some([base + 1, base + 2])
}

/// Top three actuators of a torso column, 0..4 across the front and 4..8
/// around the back, so that adjacent columns are adjacent on the body.
pub fn column_indices(column: usize) -> Option<[usize; 3]> {
    let start = match column {
        0..=3 => column,
        4..=7 => BACK_OFFSET + (7 - column),
        _ => return None,
    };
    Some([start, start + FACE_COLUMNS, start + 2 * FACE_COLUMNS])
}

/// Immutable table from [`Zone`] to actuator indices.
#[derive(Debug, Clone)]
pub struct HapticZoneMap {
    entries: Vec<(Zone, Vec<usize>)>,
}

impl HapticZoneMap {
    pub fn new() -> Self {
        let spine = |offset: usize| center_pair(ROOT_ROW - offset).map(Vec::from).unwrap_or_default();
        let sway = |side: Side| -> Vec<usize> {
            (1..ROOT_ROW)
                .filter_map(|row| side_columns(row, side).map(|[_, back]| back))
                .collect()
        };
        let tip: Vec<usize> = [ROOT_ROW - 1, ROOT_ROW]
            .into_iter()
            .flat_map(|row| {
                [Side::Left, Side::Right]
                    .into_iter()
                    .filter_map(move |side| side_columns(row, side).map(|[_, back]| back))
            })
            .collect();

        let entries = vec![
            (Zone::RootCenter, spine(0)),
            (Zone::LowerCenter, spine(1)),
            (Zone::MidCenter, spine(2)),
            (Zone::UpperCenter, spine(3)),
            (Zone::TipDiffuse, sorted(tip)),
            (Zone::SwayLeft, sway(Side::Left)),
            (Zone::SwayRight, sway(Side::Right)),
        ];
        Self { entries }
    }

    pub fn zone_indices(&self, zone: Zone) -> &[usize] {
        self.entries
            .iter()
            .find(|(z, _)| *z == zone)
            .map(|(_, indices)| indices.as_slice())
            .unwrap_or(&[])
    }

    /// Lookup by name, e.g. `"root-center"`.
    pub fn by_name(&self, name: &str) -> Option<&[usize]> {
        name.parse::<Zone>().ok().map(|zone| self.zone_indices(zone))
    }
}

impl Default for HapticZoneMap {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(mut v: Vec<usize>) -> Vec<usize> {
    v.sort_unstable();
    v
}
