// kestrel_sim/src/simulation/track.rs

use nalgebra::{Point2, Vector2};
use std::f64::consts::TAU;

use super::config::TrackConfig;

/// The road the vehicle should follow, as a polyline in the global frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    points: Vec<Point2<f64>>,
    closed: bool,
}

impl Track {
    pub fn new(points: Vec<Point2<f64>>, closed: bool) -> Self {
        Self { points, closed }
    }

    pub fn from_config(config: &TrackConfig) -> Self {
        match config {
            TrackConfig::Circle {
                center,
                radius,
                spacing,
            } => {
                let count = ((TAU * radius / spacing).round() as usize).max(3);
                let points = (0..count)
                    .map(|i| {
                        let angle = TAU * i as f64 / count as f64;
                        Point2::new(
                            center[0] + radius * angle.cos(),
                            center[1] + radius * angle.sin(),
                        )
                    })
                    .collect();
                Self::new(points, true)
            }
            TrackConfig::Sinusoid {
                amplitude,
                wavelength,
                length,
                spacing,
            } => {
                let count = (length / spacing).floor() as usize + 1;
                let points = (0..count)
                    .map(|i| {
                        let x = spacing * i as f64;
                        Point2::new(x, amplitude * (TAU * x / wavelength).sin())
                    })
                    .collect();
                Self::new(points, false)
            }
            TrackConfig::Polyline { points, closed } => Self::new(
                points.iter().map(|p| Point2::new(p[0], p[1])).collect(),
                *closed,
            ),
        }
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn segments(&self) -> impl Iterator<Item = (Point2<f64>, Point2<f64>)> + '_ {
        let closing = if self.closed && self.points.len() > 2 {
            self.points.last().copied().zip(self.points.first().copied())
        } else {
            None
        };
        self.points
            .windows(2)
            .map(|w| (w[0], w[1]))
            .chain(closing)
    }

    pub fn length(&self) -> f64 {
        self.segments().map(|(a, b)| (b - a).norm()).sum()
    }

    /// Shortest distance from `p` to the polyline.
    pub fn distance_to(&self, p: &Point2<f64>) -> f64 {
        self.segments()
            .map(|(a, b)| distance_to_segment(p, &a, &b))
            .fold(f64::INFINITY, f64::min)
    }

    fn nearest_index(&self, p: &Point2<f64>) -> usize {
        self.points
            .iter()
            .enumerate()
            .map(|(i, q)| (i, (q - p).norm_squared()))
            .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
            .0
    }

    /// The next `count` track points ahead of a vehicle at `position` facing
    /// `heading`. Open tracks return fewer points near their end.
    pub fn window(&self, position: &Point2<f64>, heading: f64, count: usize) -> Vec<Point2<f64>> {
        if self.points.is_empty() {
            return Vec::new();
        }
        let forward = Vector2::new(heading.cos(), heading.sin());
        let mut start = self.nearest_index(position);
        if (self.points[start] - position).dot(&forward) < 0.0 {
            start += 1;
        }

        let n = self.points.len();
        (start..start + count)
            .filter_map(|i| {
                if self.closed {
                    Some(self.points[i % n])
                } else {
                    self.points.get(i).copied()
                }
            })
            .collect()
    }
}

fn distance_to_segment(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let length_squared = ab.norm_squared();
    if length_squared == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / length_squared).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}
