//! geometry — joint angles and landmark distances in image space
//!
//! All inputs are pixel coordinates with the image convention (x grows to the
//! right, y grows downwards), so angles are measured clockwise on screen.

/// A 2D point in frame pixel coordinates.
pub type Point = (f32, f32);

/// Angle at `vertex` between the rays towards `p1` and `p3`, in degrees.
///
/// Computed as the polar angle of `p3 - vertex` minus the polar angle of
/// `p1 - vertex`, wrapped into `[0, 360)`.  The result is orientation
/// dependent: swapping `p1` and `p3` yields `360 - angle`.
pub fn joint_angle(p1: Point, vertex: Point, p3: Point) -> f32 {
    let to_p3 = (p3.1 - vertex.1).atan2(p3.0 - vertex.0);
    let to_p1 = (p1.1 - vertex.1).atan2(p1.0 - vertex.0);

    let mut angle = (to_p3 - to_p1).to_degrees();
    if angle < 0.0 {
        angle += 360.0;
    }
    // -ε + 360 can round up to exactly 360 in f32.
    if angle >= 360.0 {
        angle -= 360.0;
    }
    angle
}

/// Euclidean distance between two points, in pixels.
pub fn distance(a: Point, b: Point) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}
