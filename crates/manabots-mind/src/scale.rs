//! Piecewise scale mapping from raw world measurements to heat values.

use std::borrow::Cow;

use crate::MindError;

/// How queries between breakpoints resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleMode {
    /// Return the output of the first breakpoint at or above the query.
    #[default]
    Stepped,
    /// Linearly interpolate between the surrounding breakpoints.
    Smooth,
}

/// A strictly ascending `(input, output)` breakpoint table.
///
/// Queries below the table clamp to the first output, queries above it to
/// the last. Evaluation is pure.
#[derive(Debug, Clone)]
pub struct ScaleMap {
    table: Cow<'static, [(f32, f32)]>,
    mode: ScaleMode,
}

impl ScaleMap {
    /// Build a map after validating the breakpoint table.
    pub fn new(
        table: impl Into<Cow<'static, [(f32, f32)]>>,
        mode: ScaleMode,
    ) -> Result<Self, MindError> {
        let table = table.into();
        if table.is_empty() {
            return Err(MindError::InvalidScale("table must not be empty"));
        }
        let mut previous = f32::NEG_INFINITY;
        for &(input, output) in table.iter() {
            if !input.is_finite() || !output.is_finite() {
                return Err(MindError::InvalidScale("breakpoints must be finite"));
            }
            if input <= previous {
                return Err(MindError::InvalidScale(
                    "breakpoint inputs must be strictly ascending",
                ));
            }
            previous = input;
        }
        Ok(Self { table, mode })
    }

    /// Stepped-mode map over `table`.
    pub fn stepped(table: impl Into<Cow<'static, [(f32, f32)]>>) -> Result<Self, MindError> {
        Self::new(table, ScaleMode::Stepped)
    }

    /// Smooth-mode map over `table`.
    pub fn smooth(table: impl Into<Cow<'static, [(f32, f32)]>>) -> Result<Self, MindError> {
        Self::new(table, ScaleMode::Smooth)
    }

    #[must_use]
    pub const fn mode(&self) -> ScaleMode {
        self.mode
    }

    /// Map `input` through the table.
    #[must_use]
    pub fn eval(&self, input: f32) -> f32 {
        let table = self.table.as_ref();
        let (first_in, first_out) = table[0];
        if input <= first_in {
            return first_out;
        }
        let (last_in, last_out) = table[table.len() - 1];
        if input > last_in {
            return last_out;
        }
        // first breakpoint whose input is >= the query; the clamps above
        // guarantee it exists and has a predecessor
        let upper = table.partition_point(|&(x, _)| x < input);
        let (bx, by) = table[upper];
        match self.mode {
            ScaleMode::Stepped => by,
            ScaleMode::Smooth => {
                let (ax, ay) = table[upper - 1];
                let t = (input - ax) / (bx - ax);
                ay + (by - ay) * t
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[(f32, f32)] = &[(0.0, 1.0), (10.0, 0.5), (20.0, 0.0)];

    #[test]
    fn stepped_returns_ceiling_breakpoint() {
        let map = ScaleMap::stepped(TABLE).expect("map");
        assert_eq!(map.eval(5.0), 0.5);
        assert_eq!(map.eval(10.0), 0.5);
        assert_eq!(map.eval(10.5), 0.0);
    }

    #[test]
    fn queries_outside_the_table_clamp() {
        let map = ScaleMap::stepped(TABLE).expect("map");
        assert_eq!(map.eval(-3.0), 1.0);
        assert_eq!(map.eval(25.0), 0.0);

        let map = ScaleMap::smooth(TABLE).expect("map");
        assert_eq!(map.eval(-3.0), 1.0);
        assert_eq!(map.eval(25.0), 0.0);
    }

    #[test]
    fn smooth_interpolates_between_breakpoints() {
        let map = ScaleMap::smooth(TABLE).expect("map");
        assert!((map.eval(5.0) - 0.75).abs() < 1e-6);
        assert!((map.eval(15.0) - 0.25).abs() < 1e-6);
        assert_eq!(map.eval(0.0), 1.0);
        assert_eq!(map.eval(20.0), 0.0);
    }

    #[test]
    fn single_breakpoint_is_constant() {
        let map = ScaleMap::smooth(&[(3.0, 0.4)][..]).expect("map");
        assert_eq!(map.eval(-10.0), 0.4);
        assert_eq!(map.eval(3.0), 0.4);
        assert_eq!(map.eval(10.0), 0.4);
    }

    #[test]
    fn invalid_tables_are_rejected() {
        assert!(ScaleMap::stepped(&[][..]).is_err());
        assert!(ScaleMap::stepped(&[(0.0, 1.0), (0.0, 0.5)][..]).is_err());
        assert!(ScaleMap::stepped(&[(5.0, 1.0), (1.0, 0.5)][..]).is_err());
        assert!(ScaleMap::stepped(&[(f32::NAN, 1.0)][..]).is_err());
    }
}
