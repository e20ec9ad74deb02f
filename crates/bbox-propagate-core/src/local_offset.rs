//! Homography-free projection from the matched keypoints nearest each corner.

use crate::{point_in_polygon, Correspondences, ProjectionError, Rectangle};
use nalgebra::{Point2, Vector2};

/// Margin, in pixels, added around a rectangle to collect its neighborhood.
pub const DEFAULT_PADDING: f64 = 5.0;

/// A reference keypoint inside the neighborhood and where it landed.
#[derive(Clone, Copy, Debug)]
struct Anchor {
    reference: Point2<f64>,
    displacement: Vector2<f64>,
}

/// Move each corner of `rect` by the displacement of its nearest matched
/// reference keypoint, then take the truncated bounding box.
///
/// Candidates are the entries of `reference_keypoints` lying inside or on the
/// rectangle grown by `padding`, in input order. Each is paired through
/// `correspondences` (first equal reference entry wins); keypoints without a
/// match are ignored. Distance ties resolve to the earlier candidate.
///
/// Bounds within 1e-6 of an integer snap to it before truncation (see
/// [`Rectangle::truncated`]).
pub fn project_local_offset(
    rect: &Rectangle,
    reference_keypoints: &[Point2<f32>],
    correspondences: &Correspondences,
    padding: f64,
) -> Result<Rectangle, ProjectionError> {
    let region = rect.padded(padding)?.corners();

    let anchors: Vec<Anchor> = reference_keypoints
        .iter()
        .filter(|kp| point_in_polygon(&region, to_f64(kp)))
        .filter_map(|kp| {
            let target = correspondences.target_for(kp)?;
            Some(Anchor {
                reference: to_f64(kp),
                displacement: to_f64(&target) - to_f64(kp),
            })
        })
        .collect();

    if anchors.is_empty() {
        return Err(ProjectionError::NoNeighborhood);
    }

    let moved = rect.corners().map(|corner| {
        let nearest = nearest_anchor(&anchors, corner);
        corner + nearest.displacement
    });
    Ok(Rectangle::bounding_box(&moved)?.truncated())
}

fn nearest_anchor(anchors: &[Anchor], corner: Point2<f64>) -> &Anchor {
    let mut best = &anchors[0];
    let mut best_d = (best.reference - corner).norm_squared();
    for a in &anchors[1..] {
        let d = (a.reference - corner).norm_squared();
        if d < best_d {
            best = a;
            best_d = d;
        }
    }
    best
}

#[inline]
fn to_f64(p: &Point2<f32>) -> Point2<f64> {
    Point2::new(p.x as f64, p.y as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(top: f64, left: f64, bottom: f64, right: f64) -> Rectangle {
        Rectangle::new(top, left, bottom, right).unwrap()
    }

    fn corners_f32(r: &Rectangle) -> Vec<Point2<f32>> {
        r.corners()
            .iter()
            .map(|p| Point2::new(p.x as f32, p.y as f32))
            .collect()
    }

    #[test]
    fn zero_displacement_returns_input() {
        let r = rect(10.0, 10.0, 50.0, 50.0);
        let kps = vec![
            Point2::new(12.0, 13.0),
            Point2::new(48.0, 11.0),
            Point2::new(30.0, 30.0),
            Point2::new(200.0, 200.0),
        ];
        let c = Correspondences::new(kps.clone(), kps.clone()).unwrap();
        for padding in [0.0, DEFAULT_PADDING, 40.0] {
            assert_eq!(project_local_offset(&r, &kps, &c, padding).unwrap(), r);
        }
    }

    #[test]
    fn corner_keypoints_follow_translation() {
        let r = rect(10.0, 10.0, 50.0, 50.0);
        let kps = corners_f32(&r);
        let tgt: Vec<_> = kps.iter().map(|p| Point2::new(p.x + 20.0, p.y + 5.0)).collect();
        let c = Correspondences::new(kps.clone(), tgt).unwrap();
        let out = project_local_offset(&r, &kps, &c, DEFAULT_PADDING).unwrap();
        assert_eq!(out, rect(15.0, 30.0, 55.0, 70.0));
    }

    #[test]
    fn each_corner_uses_its_own_nearest_keypoint() {
        let r = rect(0.0, 0.0, 100.0, 100.0);
        // Left half moves right by 10, right half moves right by 30.
        let kps = vec![Point2::new(5.0, 50.0), Point2::new(95.0, 50.0)];
        let tgt = vec![Point2::new(15.0, 50.0), Point2::new(125.0, 50.0)];
        let c = Correspondences::new(kps.clone(), tgt).unwrap();
        let out = project_local_offset(&r, &kps, &c, 0.0).unwrap();
        assert_eq!(out, rect(0.0, 10.0, 100.0, 130.0));
    }

    #[test]
    fn distance_ties_pick_the_first_candidate() {
        let r = rect(0.0, 0.0, 10.0, 10.0);
        // Centre keypoints are equidistant from every corner.
        let kps = vec![Point2::new(5.0, 5.0), Point2::new(5.0, 5.0)];
        let tgt = vec![Point2::new(6.0, 5.0), Point2::new(9.0, 5.0)];
        let c = Correspondences::new(kps.clone(), tgt).unwrap();
        let out = project_local_offset(&r, &kps, &c, 0.0).unwrap();
        assert_eq!(out, rect(0.0, 1.0, 10.0, 11.0));
    }

    #[test]
    fn padding_boundary_is_inclusive() {
        let r = rect(10.0, 10.0, 20.0, 20.0);
        let kp = vec![Point2::new(25.0, 15.0)];
        let c = Correspondences::new(kp.clone(), vec![Point2::new(27.0, 15.0)]).unwrap();
        assert!(project_local_offset(&r, &kp, &c, 5.0).is_ok());
        assert_eq!(
            project_local_offset(&r, &kp, &c, 4.0),
            Err(ProjectionError::NoNeighborhood)
        );
    }

    #[test]
    fn unmatched_neighborhood_is_no_neighborhood() {
        let r = rect(10.0, 10.0, 20.0, 20.0);
        let kps = vec![Point2::new(15.0, 15.0)];
        let c = Correspondences::from_pairs([(Point2::new(90.0, 90.0), Point2::new(91.0, 91.0))]);
        assert_eq!(
            project_local_offset(&r, &kps, &c, DEFAULT_PADDING),
            Err(ProjectionError::NoNeighborhood)
        );
    }

    #[test]
    fn negative_padding_is_rejected() {
        let r = rect(0.0, 0.0, 1.0, 1.0);
        let err = project_local_offset(&r, &[], &Correspondences::default(), -1.0).unwrap_err();
        assert!(matches!(err, ProjectionError::Geometry(_)));
    }
}
