//! Pointer motion planning.
//!
//! [`plan`] turns a source and destination into a finite path of
//! intermediate points. Travelling through every point, instead of jumping,
//! makes the application see hover, enter and exit events the way a real
//! user's pointer would produce them.
//!
//! The number of interpolation steps is the rounded Euclidean distance,
//! clamped to `1..=200`: short moves still produce a direct jump and very long
//! moves do not flood the event queue.

use serde::{Deserialize, Serialize};

use crate::geometry::ScreenPoint;

/// Fewest interpolation steps for a non-zero move.
pub const MIN_STEPS: usize = 1;

/// Most interpolation steps for any move.
pub const MAX_STEPS: usize = 200;

/// How the pointer travels between two points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    /// Use the target's preferred motion, or [`Motion::Direct`].
    #[default]
    Default,
    /// Straight line, both axes in lock-step.
    Direct,
    /// Horizontal leg first, then vertical.
    HorizontalFirst,
    /// Vertical leg first, then horizontal.
    VerticalFirst,
}

impl Motion {
    /// Replaces [`Motion::Default`] with the target's preference, falling
    /// back to [`Motion::Direct`]. Explicit requests are kept as they are.
    pub fn resolve(self, preferred: Option<Self>) -> Self {
        match self {
            Self::Default => match preferred {
                Some(Self::Default) | None => Self::Direct,
                Some(preferred) => preferred,
            },
            explicit => explicit,
        }
    }
}

/// An ordered, finite path of pointer positions.
///
/// The first point is the source and the last is the destination. The
/// path is consumed by iteration and cannot be restarted.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPath {
    points: Vec<ScreenPoint>,
}

impl MotionPath {
    /// Number of points, always at least one.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of interpolation steps (points minus one).
    pub fn steps(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// The starting point.
    pub fn source(&self) -> ScreenPoint {
        self.points[0]
    }

    /// The final point.
    pub fn destination(&self) -> ScreenPoint {
        self.points[self.points.len() - 1]
    }

    /// Borrowed view of the points.
    pub fn points(&self) -> &[ScreenPoint] {
        &self.points
    }
}

impl IntoIterator for MotionPath {
    type Item = ScreenPoint;
    type IntoIter = std::vec::IntoIter<ScreenPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

/// Step count for a move of `distance` pixels.
pub fn step_count(distance: f64) -> usize {
    if !distance.is_finite() {
        return MAX_STEPS;
    }
    (distance.round() as usize).clamp(MIN_STEPS, MAX_STEPS)
}

/// Plans the pointer path from `source` to `destination`.
///
/// [`Motion::Default`] is treated as [`Motion::Direct`]; callers that know
/// the target should call [`Motion::resolve`] first.
pub fn plan(source: ScreenPoint, destination: ScreenPoint, motion: Motion) -> MotionPath {
    if source == destination {
        return MotionPath {
            points: vec![source],
        };
    }
    let points = match motion.resolve(None) {
        Motion::HorizontalFirst => {
            let corner = ScreenPoint::new(destination.x, source.y);
            two_legs(source, corner, destination)
        }
        Motion::VerticalFirst => {
            let corner = ScreenPoint::new(source.x, destination.y);
            two_legs(source, corner, destination)
        }
        Motion::Direct | Motion::Default => {
            interpolate(source, destination, step_count(source.distance(destination)))
        }
    };
    MotionPath { points }
}

/// `steps + 1` points from `from` to `to`, inclusive, ending exactly on `to`.
fn interpolate(from: ScreenPoint, to: ScreenPoint, steps: usize) -> Vec<ScreenPoint> {
    let steps = steps.max(1);
    let mut points: Vec<ScreenPoint> = (0..steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            ScreenPoint::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
        })
        .collect();
    points.push(to);
    points
}

/// Two straight legs through `corner`, with steps split by each leg's share
/// of the Manhattan distance so travel time follows distance on screen.
fn two_legs(source: ScreenPoint, corner: ScreenPoint, destination: ScreenPoint) -> Vec<ScreenPoint> {
    let first_len = source.distance(corner);
    let second_len = corner.distance(destination);
    let total_steps = step_count(source.distance(destination));
    // A single step cannot visit the corner.
    if first_len == 0.0 || second_len == 0.0 || total_steps < 2 {
        return interpolate(source, destination, total_steps);
    }

    let share = first_len / (first_len + second_len);
    let first_steps = ((total_steps as f64 * share).round() as usize).clamp(1, total_steps - 1);
    let second_steps = total_steps - first_steps;

    let mut points = interpolate(source, corner, first_steps);
    // The corner ends the first leg and starts the second.
    points.extend(interpolate(corner, destination, second_steps).into_iter().skip(1));
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> ScreenPoint {
        ScreenPoint::new(x, y)
    }

    fn within_bounds(path: &MotionPath, a: ScreenPoint, b: ScreenPoint) -> bool {
        const EPS: f64 = 1e-9;
        path.points().iter().all(|q| {
            q.x >= a.x.min(b.x) - EPS
                && q.x <= a.x.max(b.x) + EPS
                && q.y >= a.y.min(b.y) - EPS
                && q.y <= a.y.max(b.y) + EPS
        })
    }

    #[test]
    fn direct_path_starts_and_ends_on_endpoints() {
        let (src, dst) = (p(10.0, 10.0), p(40.0, 50.0));
        let path = plan(src, dst, Motion::Direct);
        assert_eq!(path.source(), src);
        assert_eq!(path.destination(), dst);
        assert_eq!(path.steps(), 50);
        assert!(within_bounds(&path, src, dst));
    }

    #[test]
    fn zero_distance_yields_single_point() {
        for motion in [Motion::Default, Motion::Direct, Motion::HorizontalFirst, Motion::VerticalFirst] {
            let path = plan(p(5.0, 5.0), p(5.0, 5.0), motion);
            assert_eq!(path.points(), &[p(5.0, 5.0)]);
        }
    }

    #[test]
    fn step_count_is_clamped() {
        assert_eq!(plan(p(0.0, 0.0), p(0.2, 0.0), Motion::Direct).steps(), 1);
        assert_eq!(plan(p(0.0, 0.0), p(5000.0, 5000.0), Motion::Direct).steps(), MAX_STEPS);
        assert_eq!(step_count(f64::NAN), MAX_STEPS);
    }

    #[test]
    fn horizontal_first_passes_through_corner_once() {
        let (src, dst) = (p(0.0, 0.0), p(30.0, 40.0));
        let path = plan(src, dst, Motion::HorizontalFirst);
        let corner = p(30.0, 0.0);
        assert_eq!(path.points().iter().filter(|q| **q == corner).count(), 1);
        assert_eq!(path.source(), src);
        assert_eq!(path.destination(), dst);
        // Every point before the corner stays on the source row.
        let corner_index = path.points().iter().position(|q| *q == corner).unwrap();
        assert!(path.points()[..corner_index].iter().all(|q| q.y == 0.0));
        assert!(path.points()[corner_index..].iter().all(|q| q.x == 30.0));
        assert!(within_bounds(&path, src, dst));
    }

    #[test]
    fn tiny_two_leg_moves_stay_within_the_step_budget() {
        for motion in [Motion::HorizontalFirst, Motion::VerticalFirst] {
            let path = plan(p(0.0, 0.0), p(1.0, 1.0), motion);
            assert_eq!(path.steps(), MIN_STEPS);
            assert_eq!(path.points(), &[p(0.0, 0.0), p(1.0, 1.0)]);
        }
        // Two steps is the smallest budget that turns the corner.
        let path = plan(p(0.0, 0.0), p(1.0, 1.5), Motion::HorizontalFirst);
        assert_eq!(path.points(), &[p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.5)]);
    }

    #[test]
    fn leg_steps_follow_manhattan_share() {
        // Euclidean distance 50 -> 50 steps; legs 40 then 30 -> 29 and 21.
        let path = plan(p(0.0, 0.0), p(30.0, 40.0), Motion::VerticalFirst);
        let corner = p(0.0, 40.0);
        let corner_index = path.points().iter().position(|q| *q == corner).unwrap();
        assert_eq!(corner_index, 29);
        assert_eq!(path.steps(), 50);
    }

    #[test]
    fn straight_moves_ignore_leg_ordering() {
        let path = plan(p(0.0, 0.0), p(0.0, 25.0), Motion::HorizontalFirst);
        assert_eq!(path, plan(p(0.0, 0.0), p(0.0, 25.0), Motion::Direct));
    }

    #[test]
    fn default_motion_honors_preference() {
        assert_eq!(Motion::Default.resolve(None), Motion::Direct);
        assert_eq!(Motion::Default.resolve(Some(Motion::VerticalFirst)), Motion::VerticalFirst);
        assert_eq!(Motion::Direct.resolve(Some(Motion::VerticalFirst)), Motion::Direct);
    }

    #[test]
    fn path_is_consumed_in_order() {
        let path = plan(p(0.0, 0.0), p(3.0, 0.0), Motion::Direct);
        let xs: Vec<f64> = path.into_iter().map(|q| q.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0]);
    }
}
