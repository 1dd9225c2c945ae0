use serde::{Serialize, Serializer};
use std::fmt;

/// Number of actuators on the vest.
pub const GRID_LEN: usize = 40;
/// Rows per face.
pub const ROWS: usize = 5;
/// Columns per face.
pub const FACE_COLUMNS: usize = 4;
/// First index of the back face.
pub const BACK_OFFSET: usize = ROWS * FACE_COLUMNS;
pub const MAX_INTENSITY: u8 = 100;

/// Intensities for every actuator, `0..=100`. Indices `0..20` are the front
/// face and `20..40` the back, each row-major with 4 columns.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActuatorGrid([u8; GRID_LEN]);

impl ActuatorGrid {
    pub const ZERO: Self = Self([0; GRID_LEN]);

    pub fn new() -> Self {
        Self::ZERO
    }

    /// Set one actuator, clamping to [`MAX_INTENSITY`]. Out-of-range indices
    /// are ignored.
    pub fn set(&mut self, index: usize, intensity: u8) {
        if let Some(cell) = self.0.get_mut(index) {
            *cell = intensity.min(MAX_INTENSITY);
        }
    }

    /// Set every index in `indices` to `intensity`.
    pub fn light<I>(&mut self, indices: I, intensity: u8)
    where
        I: IntoIterator<Item = usize>,
    {
        for index in indices {
            self.set(index, intensity);
        }
    }

    pub fn get(&self, index: usize) -> u8 {
        self.0.get(index).copied().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0)
    }

    /// Indices with a non-zero intensity, ascending.
    pub fn lit(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > 0)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn max_intensity(&self) -> u8 {
        self.0.iter().copied().max().unwrap_or(0)
    }

    pub fn as_array(&self) -> &[u8; GRID_LEN] {
        &self.0
    }
}

impl Default for ActuatorGrid {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for ActuatorGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().enumerate().filter(|(_, &v)| v > 0))
            .finish()
    }
}

/// Renders two 5x4 blocks side by side: front, then back.
impl fmt::Display for ActuatorGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..ROWS {
            if row > 0 {
                writeln!(f)?;
            }
            for col in 0..FACE_COLUMNS {
                write!(f, "{:>4}", self.0[row * FACE_COLUMNS + col])?;
            }
            write!(f, "  |")?;
            for col in 0..FACE_COLUMNS {
                write!(f, "{:>4}", self.0[BACK_OFFSET + row * FACE_COLUMNS + col])?;
            }
        }
        Ok(())
    }
}

impl Serialize for ActuatorGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clamps_and_ignores_out_of_range() {
        let mut grid = ActuatorGrid::new();
        grid.set(3, 250);
        grid.set(40, 10);
        assert_eq!(grid.get(3), MAX_INTENSITY);
        assert_eq!(grid.get(40), 0);
        assert_eq!(grid.lit(), vec![3]);
    }

    #[test]
    fn zero_grid_is_zero() {
        assert!(ActuatorGrid::ZERO.is_zero());
        let mut grid = ActuatorGrid::default();
        grid.light([37, 38], 1);
        assert!(!grid.is_zero());
        assert_eq!(grid.max_intensity(), 1);
    }

    #[test]
    fn serializes_as_flat_array() {
        let mut grid = ActuatorGrid::new();
        grid.set(0, 7);
        grid.set(39, 9);
        let json = serde_json::to_value(grid).unwrap();
        let arr = json.as_array().unwrap();
        assert_eq!(arr.len(), GRID_LEN);
        assert_eq!(arr[0], 7);
        assert_eq!(arr[39], 9);
    }

    #[test]
    fn display_places_back_face_on_the_right() {
        let mut grid = ActuatorGrid::new();
        grid.set(BACK_OFFSET + 4 * FACE_COLUMNS + 3, 55);
        let text = grid.to_string();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), ROWS);
        assert!(rows[4].ends_with("  55"));
        assert!(rows[0].contains('|'));
    }
}
