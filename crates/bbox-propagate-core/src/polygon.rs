use nalgebra::Point2;

const EDGE_EPS: f64 = 1e-9;

/// Inclusive point-in-polygon test: points on an edge or vertex count as inside.
///
/// `polygon` is a closed ring given without repeating the first vertex. Works
/// for any simple polygon, convex or not.
pub fn point_in_polygon(polygon: &[Point2<f64>], p: Point2<f64>) -> bool {
    let n = polygon.len();
    if n == 0 {
        return false;
    }
    if n == 1 {
        return polygon[0] == p;
    }

    for i in 0..n {
        if on_segment(polygon[i], polygon[(i + 1) % n], p) {
            return true;
        }
    }

    // Even-odd crossing number along a ray towards +x.
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: Point2<f64>, b: Point2<f64>, p: Point2<f64>) -> bool {
    let ab = b - a;
    let ap = p - a;
    let cross = ab.x * ap.y - ab.y * ap.x;
    let scale = ab.norm().max(1.0);
    if cross.abs() > EDGE_EPS * scale {
        return false;
    }
    let dot = ab.dot(&ap);
    dot >= -EDGE_EPS && dot <= ab.norm_squared() + EDGE_EPS
}
