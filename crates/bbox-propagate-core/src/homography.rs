use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};

/// Below this `|w|` a warped point is treated as lying on the line at infinity.
pub(crate) const W_EPS: f64 = 1e-12;

/// Projective transform `dst ~ H * src` between two images.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_fn(|r, c| rows[r][c]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        let mut out = [[0.0; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = self.h[(r, c)];
            }
        }
        out
    }

    /// Third homogeneous coordinate of `H * p`. Its sign tells which side of
    /// the horizon line `p` lies on.
    #[inline]
    pub fn homogeneous_w(&self, p: Point2<f64>) -> f64 {
        self.h[(2, 0)] * p.x + self.h[(2, 1)] * p.y + self.h[(2, 2)]
    }

    /// Map a point, returning `None` when it lands at (or numerically near) infinity.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() <= W_EPS {
            return None;
        }
        let q = Point2::new(v[0] / w, v[1] / w);
        (q.x.is_finite() && q.y.is_finite()).then_some(q)
    }

    /// Keypoint convenience for [`Homography::apply`].
    #[inline]
    pub fn apply_f32(&self, p: Point2<f32>) -> Option<Point2<f32>> {
        self.apply(Point2::new(p.x as f64, p.y as f64))
            .map(|q| Point2::new(q.x as f32, q.y as f32))
    }

    /// Squared distance between `H * src` and `dst`; infinite if `src` maps to infinity.
    pub fn reprojection_error_sq(&self, src: Point2<f32>, dst: Point2<f32>) -> f64 {
        match self.apply(Point2::new(src.x as f64, src.y as f64)) {
            Some(q) => {
                let dx = q.x - dst.x as f64;
                let dy = q.y - dst.y as f64;
                dx * dx + dy * dy
            }
            None => f64::INFINITY,
        }
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// True when every entry is finite and the matrix is numerically full rank.
    pub fn is_well_conditioned(&self) -> bool {
        if self.h.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let sv = self.h.singular_values();
        let max = sv.iter().copied().fold(0.0_f64, f64::max);
        let min = sv.iter().copied().fold(f64::INFINITY, f64::min);
        max > W_EPS && min / max > 1e-12
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn normalize_points<const N: usize>(
    pts: impl Iterator<Item = Point2<f32>> + Clone,
    out: &mut [Point2<f64>; N],
) -> Matrix3<f64> {
    let n = N as f64;
    let (cx, cy) = pts
        .clone()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    let (cx, cy) = (cx / n, cy / n);

    let mean_dist = pts
        .clone()
        .map(|p| {
            let dx = p.x as f64 - cx;
            let dy = p.y as f64 - cy;
            (dx * dx + dy * dy).sqrt()
        })
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    for (slot, p) in out.iter_mut().zip(pts) {
        let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
        *slot = Point2::new(v[0], v[1]);
    }
    t
}

fn normalize_point_vec(pts: &[Point2<f32>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let n = pts.len() as f64;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in pts {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in pts {
        let dx = p.x as f64 - cx;
        let dy = p.y as f64 - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn finalize(hn: Matrix3<f64>, t_src: Matrix3<f64>, t_dst: Matrix3<f64>) -> Option<Homography> {
    // H = T_dst^-1 * Hn * T_src, scaled so h33 = 1.
    let h = t_dst.try_inverse()? * hn * t_src;
    let s = h[(2, 2)];
    if !s.is_finite() || s.abs() < 1e-12 {
        return None;
    }
    let h = Homography::new(h / s);
    h.is_well_conditioned().then_some(h)
}

/// True if any three of the four points are (nearly) collinear.
pub fn has_collinear_triple(pts: &[Point2<f32>; 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|&[a, b, c]| {
        let (pa, pb, pc) = (pts[a], pts[b], pts[c]);
        let ab = (pb.x as f64 - pa.x as f64, pb.y as f64 - pa.y as f64);
        let ac = (pc.x as f64 - pa.x as f64, pc.y as f64 - pa.y as f64);
        let cross = ab.0 * ac.1 - ab.1 * ac.0;
        let scale = (ab.0.hypot(ab.1) * ac.0.hypot(ac.1)).max(1e-12);
        cross.abs() <= 1e-6 * scale
    })
}

/// Exact homography from four correspondences (`dst ~ H * src`).
///
/// Returns `None` for degenerate configurations (three collinear points on
/// either side, or a singular system).
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    if has_collinear_triple(src) || has_collinear_triple(dst) {
        return None;
    }

    let mut src_n = [Point2::origin(); 4];
    let mut dst_n = [Point2::origin(); 4];
    let t_src = normalize_points(src.iter().copied(), &mut src_n);
    let t_dst = normalize_points(dst.iter().copied(), &mut dst_n);

    // Unknowns [h11 h12 h13 h21 h22 h23 h31 h32] with h33 = 1:
    //   h11 x + h12 y + h13 - u h31 x - u h32 y = u
    //   h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for k in 0..4 {
        let (x, y) = (src_n[k].x, src_n[k].y);
        let (u, v) = (dst_n[k].x, dst_n[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );
    finalize(hn, t_src, t_dst)
}

/// Least-squares homography over `N >= 4` correspondences via normalized DLT.
pub fn estimate_homography_dlt(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    if src.len() == 4 {
        let s: &[Point2<f32>; 4] = src.try_into().ok()?;
        let d: &[Point2<f32>; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (s, ts) = normalize_point_vec(src);
    let (d, td) = normalize_point_vec(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Solve Ah = 0: h is the right singular vector with the smallest singular value.
    let svd = a.svd(false, true);
    let vt = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.total_cmp(y.1))?;
    let h = vt.row(min_idx);

    let hn = Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);
    finalize(hn, ts, td)
}
