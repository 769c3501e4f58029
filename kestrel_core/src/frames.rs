// kestrel_core/src/frames.rs

//! Conversions between the global (map) frame and the vehicle body frame.
//!
//! The body frame is centered on the vehicle with its x-axis along the
//! vehicle's heading and its y-axis to the vehicle's left.

use nalgebra::Point2;

use crate::types::VehiclePose;

/// Expresses global waypoints in the body frame of a vehicle at `pose`:
/// translate by `-position`, then rotate by `-heading`.
pub fn to_vehicle_frame(pose: &VehiclePose, waypoints: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let world_to_body = pose.isometry().inverse();
    waypoints.iter().map(|p| world_to_body * p).collect()
}

/// Inverse of [`to_vehicle_frame`]: rotate by `+heading`, translate by `+position`.
pub fn to_global_frame(pose: &VehiclePose, points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let body_to_world = pose.isometry();
    points.iter().map(|p| body_to_world * p).collect()
}
