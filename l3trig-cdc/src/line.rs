//! Weighted straight-line fit of z against transverse arclength.
#![allow(clippy::cast_precision_loss)]

use l3trig_core::{FitFailure, Longitudinal};

/// One (s, z) measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SzPoint {
    pub s: f64,
    pub z: f64,
    pub weight: f64,
}

/// Weighted sums for `z = dz + tan_lambda * s`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineFit {
    n: usize,
    sw: f64,
    ss: f64,
    sz: f64,
    sss: f64,
    ssz: f64,
    szz: f64,
}

/// Solved line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub dz: f64,
    pub tan_lambda: f64,
    pub chi2: f64,
    pub n_points: usize,
}

impl Line {
    /// z predicted at arclength `s`.
    #[must_use]
    pub fn z_at(&self, s: f64) -> f64 {
        self.dz + self.tan_lambda * s
    }
}

impl LineFit {
    /// Empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a point.
    pub fn add(&mut self, s: f64, z: f64, w: f64) {
        self.n += 1;
        self.sw += w;
        self.ss += w * s;
        self.sz += w * z;
        self.sss += w * s * s;
        self.ssz += w * s * z;
        self.szz += w * z * z;
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

    /// Solves the normal equations.
    ///
    /// # Errors
    /// [`FitFailure::TooFewPoints`] below two points, [`FitFailure::Singular`]
    /// if all points share the same arclength.
    pub fn fit(&self) -> Result<Line, FitFailure> {
        if self.n < 2 {
            return Err(FitFailure::TooFewPoints {
                found: self.n,
                required: 2,
            });
        }
        let det = self.sw * self.sss - self.ss * self.ss;
        if det.abs() <= f64::EPSILON * (self.sw * self.sss).abs() {
            return Err(FitFailure::Singular);
        }
        let tan_lambda = (self.sw * self.ssz - self.ss * self.sz) / det;
        let dz = (self.sz - tan_lambda * self.ss) / self.sw;
        // Σw(z - dz - t s)^2 expanded over the accumulated sums.
        let chi2 = self.szz + dz * dz * self.sw + tan_lambda * tan_lambda * self.sss
            - 2.0 * dz * self.sz
            - 2.0 * tan_lambda * self.ssz
            + 2.0 * dz * tan_lambda * self.ss;
        Ok(Line {
            dz,
            tan_lambda,
            chi2: chi2.max(0.0),
            n_points: self.n,
        })
    }
}

/// Fits the points, then refits after each outlier-rejection round drops
/// the points whose |residual| exceeds that round's cut.
///
/// Rounds that would leave fewer than two points are skipped.
pub fn fit_with_rejection(points: &[SzPoint], cuts: &[f64]) -> Longitudinal {
    let fit_subset = |keep: &dyn Fn(&SzPoint) -> bool| {
        let mut fit = LineFit::new();
        for point in points.iter().filter(|p| keep(p)) {
            fit.add(point.s, point.z, point.weight);
        }
        fit.fit()
    };

    let mut line = match fit_subset(&|_| true) {
        Ok(line) => line,
        Err(failure) => return Longitudinal::Unavailable(failure),
    };
    for &cut in cuts {
        let current = line;
        let inside = |p: &SzPoint| (p.z - current.z_at(p.s)).abs() <= cut;
        if points.iter().filter(|p| inside(p)).count() < 2 {
            continue;
        }
        match fit_subset(&inside) {
            Ok(refit) => line = refit,
            Err(failure) => log::trace!("s-z rejection round at {cut} cm failed: {failure}"),
        }
    }

    Longitudinal::Fitted {
        dz: line.dz,
        tan_lambda: line.tan_lambda,
        chi2: line.chi2,
        n_points: line.n_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(s: f64, z: f64) -> SzPoint {
        SzPoint { s, z, weight: 1.0 }
    }

    #[test]
    fn test_line_fit_exact() {
        let mut fit = LineFit::new();
        for i in 0..5 {
            let s = 20.0 + 10.0 * f64::from(i);
            fit.add(s, 3.0 - 0.5 * s, 1.0);
        }
        let line = fit.fit().unwrap();
        assert_relative_eq!(line.dz, 3.0, epsilon = 1e-9);
        assert_relative_eq!(line.tan_lambda, -0.5, epsilon = 1e-12);
        assert!(line.chi2 < 1e-9);
    }

    #[test]
    fn test_line_fit_degenerate() {
        let mut fit = LineFit::new();
        fit.add(10.0, 1.0, 1.0);
        assert!(matches!(fit.fit(), Err(FitFailure::TooFewPoints { found: 1, .. })));
        fit.add(10.0, 2.0, 1.0);
        assert_eq!(fit.fit(), Err(FitFailure::Singular));
    }

    #[test]
    fn test_rejection_drops_outlier() {
        let mut points: Vec<SzPoint> = (0..8)
            .map(|i| {
                let s = 30.0 + 8.0 * f64::from(i);
                point(s, 1.0 + 0.2 * s)
            })
            .collect();
        points.push(point(50.0, 40.0));

        let fitted = fit_with_rejection(&points, &[8.0, 4.0]);
        let Longitudinal::Fitted {
            dz,
            tan_lambda,
            n_points,
            ..
        } = fitted
        else {
            panic!("expected a fit, got {fitted:?}");
        };
        assert_eq!(n_points, 8);
        assert_relative_eq!(dz, 1.0, epsilon = 1e-7);
        assert_relative_eq!(tan_lambda, 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_rejection_needs_two_points() {
        assert_eq!(
            fit_with_rejection(&[point(1.0, 1.0)], &[8.0]),
            Longitudinal::Unavailable(FitFailure::TooFewPoints {
                found: 1,
                required: 2
            })
        );
    }
}
