//! Non-iterative weighted circle fit (Karimäki parametrisation).
//!
//! The circle is described by its signed curvature `rho` (positive for
//! clockwise motion), the direction `phi` at the point of closest approach to
//! the origin and the signed distance `d` of that point. The fit minimises
//! the weighted sum of the approximate residuals
//! `eps = rho/2 r^2 - (1 + rho d) (x sin phi - y cos phi) + rho/2 d^2 + d`
//! in closed form, so it is well behaved for straight lines.
#![allow(clippy::cast_precision_loss, clippy::many_single_char_names)]

use l3trig_core::FitFailure;
use std::f64::consts::{PI, TAU};

/// Weighted sums for the circle fit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CircleFit {
    n: usize,
    sw: f64,
    sx: f64,
    sy: f64,
    sxx: f64,
    sxy: f64,
    syy: f64,
    sxr: f64,
    syr: f64,
    sr: f64,
    srr: f64,
}

impl CircleFit {
    /// Empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a point with weight `w`.
    pub fn add(&mut self, x: f64, y: f64, w: f64) {
        let r2 = x * x + y * y;
        self.n += 1;
        self.sw += w;
        self.sx += w * x;
        self.sy += w * y;
        self.sxx += w * x * x;
        self.sxy += w * x * y;
        self.syy += w * y * y;
        self.sxr += w * x * r2;
        self.syr += w * y * r2;
        self.sr += w * r2;
        self.srr += w * r2 * r2;
    }

    /// Number of points added.
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns true if no point was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Solves for the circle.
    ///
    /// # Errors
    /// [`FitFailure::TooFewPoints`] below three points,
    /// [`FitFailure::Singular`] for degenerate point sets.
    pub fn fit(&self) -> Result<Circle, FitFailure> {
        if self.n < 3 {
            return Err(FitFailure::TooFewPoints {
                found: self.n,
                required: 3,
            });
        }
        if self.sw <= 0.0 {
            return Err(FitFailure::Singular);
        }

        let inv = 1.0 / self.sw;
        let (xm, ym, rm) = (self.sx * inv, self.sy * inv, self.sr * inv);
        let cxx = self.sxx * inv - xm * xm;
        let cxy = self.sxy * inv - xm * ym;
        let cyy = self.syy * inv - ym * ym;
        let cxr = self.sxr * inv - xm * rm;
        let cyr = self.syr * inv - ym * rm;
        let crr = self.srr * inv - rm * rm;
        if crr <= f64::EPSILON * (self.srr * inv).max(1.0) {
            return Err(FitFailure::Singular);
        }

        let q1 = crr * cxy - cxr * cyr;
        let q2 = crr * (cxx - cyy) - cxr * cxr + cyr * cyr;
        let mut phi = 0.5 * (2.0 * q1).atan2(q2);
        let (mut sin, mut cos) = phi.sin_cos();
        // Direction must point away from the origin at the centre of gravity.
        if cos * xm + sin * ym < 0.0 {
            phi += PI;
            sin = -sin;
            cos = -cos;
        }

        let kappa = (sin * cxr - cos * cyr) / crr;
        let delta = -kappa * rm + sin * xm - cos * ym;
        let discriminant = 1.0 - 4.0 * delta * kappa;
        if discriminant < 0.0 || !discriminant.is_finite() {
            return Err(FitFailure::Singular);
        }
        let root = discriminant.sqrt();
        let rho = 2.0 * kappa / root;
        let d = 2.0 * delta / (1.0 + root);

        let u = 1.0 + rho * d;
        let chi2 = self.sw
            * u
            * u
            * (sin * sin * cxx - 2.0 * sin * cos * cxy + cos * cos * cyy - kappa * kappa * crr);

        Ok(Circle {
            curvature: rho,
            phi: phi.rem_euclid(TAU),
            impact: d,
            chi2: chi2.max(0.0),
            n_points: self.n,
        })
    }
}

/// A fitted circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Signed curvature 1/R (1/cm); positive for clockwise motion.
    pub curvature: f64,
    /// Direction at the point of closest approach, in [0, 2π).
    pub phi: f64,
    /// Signed distance of closest approach to the origin (cm).
    pub impact: f64,
    /// Weighted sum of squared residuals.
    pub chi2: f64,
    /// Number of points in the fit.
    pub n_points: usize,
}

/// Below this |curvature| (1/cm) the circle is treated as a line.
const STRAIGHT: f64 = 1e-9;

impl Circle {
    /// Point of closest approach to the origin.
    #[must_use]
    pub fn dca(&self) -> [f64; 2] {
        let (sin, cos) = self.phi.sin_cos();
        [self.impact * sin, -self.impact * cos]
    }

    /// Unit direction at the point of closest approach.
    #[must_use]
    pub fn direction(&self) -> [f64; 2] {
        let (sin, cos) = self.phi.sin_cos();
        [cos, sin]
    }

    /// Centre of the circle, `None` for a straight line.
    #[must_use]
    pub fn center(&self) -> Option<[f64; 2]> {
        if self.curvature.abs() < STRAIGHT {
            return None;
        }
        let (sin, cos) = self.phi.sin_cos();
        let distance = 1.0 / self.curvature + self.impact;
        Some([distance * sin, -distance * cos])
    }

    /// Radius of the circle (infinite for a straight line).
    #[must_use]
    pub fn radius(&self) -> f64 {
        if self.curvature == 0.0 {
            f64::INFINITY
        } else {
            1.0 / self.curvature.abs()
        }
    }

    /// Approximate residual `eps` of the fit for point (x, y).
    #[must_use]
    pub fn epsilon(&self, x: f64, y: f64) -> f64 {
        let (sin, cos) = self.phi.sin_cos();
        let rho = self.curvature;
        let d = self.impact;
        0.5 * rho * (x * x + y * y) - (1.0 + rho * d) * (x * sin - y * cos) + 0.5 * rho * d * d + d
    }

    /// Exact signed distance of (x, y) from the circle, positive on the left
    /// of the direction of motion.
    #[must_use]
    pub fn residual(&self, x: f64, y: f64) -> f64 {
        let eps = self.epsilon(x, y);
        let root = (1.0 + 2.0 * self.curvature * eps).max(0.0).sqrt();
        2.0 * eps / (1.0 + root)
    }

    /// Unit normal on the left of the direction of motion, taken at the
    /// point of the circle closest to (x, y).
    #[must_use]
    pub fn left_normal(&self, x: f64, y: f64) -> [f64; 2] {
        let (sin, cos) = self.phi.sin_cos();
        let Some([cx, cy]) = self.center() else {
            return [-sin, cos];
        };
        let (dx, dy) = (x - cx, y - cy);
        let norm = dx.hypot(dy);
        if norm == 0.0 {
            return [-sin, cos];
        }
        // The centre lies on the right of clockwise (positive) tracks.
        let sign = self.curvature.signum();
        [sign * dx / norm, sign * dy / norm]
    }

    /// Transverse arclength from the point of closest approach to (x, y),
    /// measured along the direction of motion over the first turn.
    #[must_use]
    pub fn arclength(&self, x: f64, y: f64) -> f64 {
        let [x0, y0] = self.dca();
        let Some([cx, cy]) = self.center() else {
            let [tx, ty] = self.direction();
            return (x - x0) * tx + (y - y0) * ty;
        };
        let (ax, ay) = (x0 - cx, y0 - cy);
        let (bx, by) = (x - cx, y - cy);
        let cross = ax * by - ay * bx;
        let dot = ax * bx + ay * by;
        // Clockwise motion turns by negative angles about the centre.
        let turn = if self.curvature > 0.0 {
            (-cross).atan2(dot)
        } else {
            cross.atan2(dot)
        };
        turn.rem_euclid(TAU) * self.radius()
    }

    /// Point reached after transverse arclength `s` from closest approach.
    #[must_use]
    pub fn point_at(&self, s: f64) -> [f64; 2] {
        let [x0, y0] = self.dca();
        let rho = self.curvature;
        if rho.abs() < STRAIGHT {
            let [tx, ty] = self.direction();
            return [x0 + s * tx, y0 + s * ty];
        }
        let turned = self.phi - rho * s;
        [
            x0 + (self.phi.sin() - turned.sin()) / rho,
            y0 + (turned.cos() - self.phi.cos()) / rho,
        ]
    }

    /// Intersections of the line `base + t * dir` with the circle, as values
    /// of `t` in increasing order. Solved on the residual form so the result
    /// stays accurate for nearly straight tracks.
    #[must_use]
    pub fn intersect_line(&self, base: [f64; 2], dir: [f64; 2], offset: f64) -> Option<[f64; 2]> {
        let (sin, cos) = self.phi.sin_cos();
        let rho = self.curvature;
        let u = 1.0 + rho * self.impact;
        let a2 = 0.5 * rho * (dir[0] * dir[0] + dir[1] * dir[1]);
        let a1 = rho * (base[0] * dir[0] + base[1] * dir[1]) - u * (dir[0] * sin - dir[1] * cos);
        let a0 = self.epsilon(base[0], base[1]) - offset;

        if a2.abs() < 1e-12 * a1.abs().max(1e-300) {
            if a1 == 0.0 {
                return None;
            }
            let t = -a0 / a1;
            return Some([t, t]);
        }
        let disc = a1 * a1 - 4.0 * a2 * a0;
        if disc < 0.0 {
            return None;
        }
        let q = -0.5 * (a1 + a1.signum() * disc.sqrt());
        if q == 0.0 {
            return Some([0.0, 0.0]);
        }
        let (t1, t2) = (q / a2, a0 / q);
        Some(if t1 <= t2 { [t1, t2] } else { [t2, t1] })
    }
}
