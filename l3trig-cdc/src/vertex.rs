//! Event vertex estimates from the fitted tracks.
//!
//! Both estimates intersect the tracks pairwise near their points of closest
//! approach, using the tangent line there, and average the pair vertices
//! weighted by fit quality.
#![allow(clippy::cast_precision_loss)]

use l3trig_core::{Longitudinal, TrackRecord};

/// Chi-square per point at which a track's 2D weight drops to `exp(-1)`.
const CHI2_SCALE: f64 = 0.02;
/// Above this |cos| two tangents are treated as parallel.
const MAX_COS: f64 = 0.86;
/// Most negative accepted line parameter of an intersection (cm).
const MIN_PARAMETER: f64 = -0.5;
/// Largest accepted pair chi-square of the 3D estimate.
const MAX_PAIR_CHI2: f64 = 10.0;
/// Lower bound of the 3D error scales.
const MIN_SIGMA: f64 = 1e-6;

fn dca(track: &TrackRecord) -> [f64; 2] {
    let (sin, cos) = track.phi.sin_cos();
    [track.impact * sin, -track.impact * cos]
}

fn direction(track: &TrackRecord) -> [f64; 2] {
    let (sin, cos) = track.phi.sin_cos();
    [cos, sin]
}

fn weight_2d(track: &TrackRecord) -> f64 {
    let n = track.n_transverse.max(1) as f64;
    let scaled = track.chi2 / (n * CHI2_SCALE);
    (-scaled * scaled).exp()
}

/// Crossing of the two tangent lines, or the midpoint of the two points of
/// closest approach when the lines are nearly parallel or cross behind
/// either of them.
fn pair_vertex(a: &TrackRecord, b: &TrackRecord) -> [f64; 2] {
    let (pa, da) = (dca(a), direction(a));
    let (pb, db) = (dca(b), direction(b));
    let midpoint = [0.5 * (pa[0] + pb[0]), 0.5 * (pa[1] + pb[1])];

    let cos = da[0] * db[0] + da[1] * db[1];
    let cross = da[0] * db[1] - da[1] * db[0];
    if cos.abs() > MAX_COS || cross == 0.0 {
        return midpoint;
    }
    let (wx, wy) = (pb[0] - pa[0], pb[1] - pa[1]);
    let along_a = (wx * db[1] - wy * db[0]) / cross;
    let along_b = (wx * da[1] - wy * da[0]) / cross;
    if along_a < MIN_PARAMETER || along_b < MIN_PARAMETER {
        return midpoint;
    }
    [pa[0] + along_a * da[0], pa[1] + along_a * da[1]]
}

/// Transverse event vertex from at least two tracks.
#[must_use]
pub fn vertex_2d(tracks: &[TrackRecord]) -> Option<[f64; 2]> {
    if tracks.len() < 2 {
        return None;
    }
    let mut sum = [0.0, 0.0];
    let mut total = 0.0;
    for (i, a) in tracks.iter().enumerate() {
        let wa = weight_2d(a);
        for b in &tracks[i + 1..] {
            let w = wa * weight_2d(b);
            let [x, y] = pair_vertex(a, b);
            sum[0] += w * x;
            sum[1] += w * y;
            total += w;
        }
    }
    (total > 0.0).then(|| [sum[0] / total, sum[1] / total])
}

/// Track as a 3D line with its error scales.
#[derive(Debug, Clone, Copy)]
struct Line3 {
    point: [f64; 3],
    dir: [f64; 3],
    sigma_r: f64,
    sigma_z: f64,
}

impl Line3 {
    fn from_record(track: &TrackRecord) -> Option<Self> {
        let Longitudinal::Fitted {
            dz,
            tan_lambda,
            chi2,
            n_points,
        } = track.longitudinal
        else {
            return None;
        };
        if track.n_transverse <= 3 || n_points <= 2 {
            return None;
        }
        let [x, y] = dca(track);
        let [cx, cy] = direction(track);
        let sigma_r = track.chi2.sqrt() / (track.n_transverse - 3) as f64;
        let sigma_z = chi2 / (n_points - 2) as f64;
        Some(Self {
            point: [x, y, dz],
            dir: [cx, cy, tan_lambda],
            sigma_r: sigma_r.max(MIN_SIGMA),
            sigma_z: sigma_z.max(MIN_SIGMA),
        })
    }

    fn at(&self, t: f64) -> [f64; 3] {
        [
            self.point[0] + t * self.dir[0],
            self.point[1] + t * self.dir[1],
            self.point[2] + t * self.dir[2],
        ]
    }
}

/// Scalar product under the metric `diag(1/sr, 1/sr, 1/sz)`.
fn dot(a: [f64; 3], b: [f64; 3], sr: f64, sz: f64) -> f64 {
    (a[0] * b[0] + a[1] * b[1]) / sr + a[2] * b[2] / sz
}

/// Three-dimensional event vertex from tracks with both fits.
///
/// Each pair contributes its weighted point of closest approach unless the
/// pair chi-square exceeds 10.
#[must_use]
pub fn vertex_3d(tracks: &[TrackRecord]) -> Option<[f64; 3]> {
    let lines: Vec<Line3> = tracks.iter().filter_map(Line3::from_record).collect();
    if lines.len() < 2 {
        return None;
    }

    let mut sum_xy = [0.0, 0.0];
    let mut total_xy = 0.0;
    let mut sum_z = 0.0;
    let mut total_z = 0.0;
    for (i, a) in lines.iter().enumerate() {
        for b in &lines[i + 1..] {
            let sr = a.sigma_r + b.sigma_r;
            let sz = a.sigma_z + b.sigma_z;
            let w = [
                b.point[0] - a.point[0],
                b.point[1] - a.point[1],
                b.point[2] - a.point[2],
            ];
            let aa = dot(a.dir, a.dir, sr, sz);
            let ab = dot(a.dir, b.dir, sr, sz);
            let bb = dot(b.dir, b.dir, sr, sz);
            let ca = dot(a.dir, w, sr, sz);
            let cb = dot(b.dir, w, sr, sz);
            let det = ab * ab - aa * bb;
            if det.abs() < 1e-12 {
                continue;
            }
            let ta = (ab * cb - bb * ca) / det;
            let tb = (aa * cb - ab * ca) / det;
            let va = a.at(ta);
            let vb = b.at(tb);
            let gap = [va[0] - vb[0], va[1] - vb[1], va[2] - vb[2]];
            let chi2 = dot(gap, gap, sr, sz);
            if chi2 > MAX_PAIR_CHI2 {
                log::trace!("vertex pair rejected, chi2 {chi2:.2}");
                continue;
            }
            let inner = (-chi2).exp();

            let (wa, wb) = ((-a.sigma_r).exp(), (-b.sigma_r).exp());
            let weight = (-sr).exp() * inner;
            sum_xy[0] += weight * (wa * va[0] + wb * vb[0]) / (wa + wb);
            sum_xy[1] += weight * (wa * va[1] + wb * vb[1]) / (wa + wb);
            total_xy += weight;

            let (wa, wb) = ((-a.sigma_z).exp(), (-b.sigma_z).exp());
            let weight = (-sz).exp() * inner;
            sum_z += weight * (wa * va[2] + wb * vb[2]) / (wa + wb);
            total_z += weight;
        }
    }
    if total_xy <= 0.0 || total_z <= 0.0 {
        return None;
    }
    Some([sum_xy[0] / total_xy, sum_xy[1] / total_xy, sum_z / total_z])
}
