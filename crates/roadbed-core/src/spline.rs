//! Catmull–Rom spline with tension/continuity shaping (Kochanek–Bartels
//! tangents, bias 0) and arc-length parameterized sampling.
//!
//! The curve passes through every control point. Arc length is
//! pre-integrated into a lookup table at construction so that
//! `sample_by_distance` is a binary search plus one Hermite evaluation.

use glam::DVec2;

/// One arc-length sample of a spline.
#[derive(Debug, Clone, Copy)]
pub struct SplineSample {
    pub point: DVec2,
    /// Unit tangent along the direction of travel.
    pub tangent: DVec2,
    /// Unit normal, tangent rotated +90°.
    pub normal: DVec2,
    /// Cumulative arc length at this sample, metres.
    pub distance: f64,
}

/// Arc-length resolution of the lookup table, in curve units (metres for
/// world-space control points).
const TABLE_STEP: f64 = 0.25;
const MIN_SUBDIV: usize = 8;
const MAX_SUBDIV: usize = 64;

#[derive(Debug, Clone)]
struct TableEntry {
    s: f64,
    segment: usize,
    t: f64,
}

/// An interpolating spline through an ordered 2D polyline.
#[derive(Debug, Clone)]
pub struct SplineCurve {
    points: Vec<DVec2>,
    /// Outgoing Hermite tangent at point i (used by segment i).
    m_out: Vec<DVec2>,
    /// Incoming Hermite tangent at point i (used by segment i − 1).
    m_in: Vec<DVec2>,
    table: Vec<TableEntry>,
    total_length: f64,
}

impl SplineCurve {
    /// Fit a spline through `points` (≥ 2). `tension` ∈ [0, 1] tightens the
    /// curve toward the control polyline; `continuity` ∈ [−1, 1] sharpens or
    /// smooths corners.
    pub fn fit(points: &[DVec2], tension: f64, continuity: f64) -> Self {
        assert!(points.len() >= 2, "spline needs at least two control points");
        let n = points.len();

        let mut m_out = Vec::with_capacity(n);
        let mut m_in = Vec::with_capacity(n);
        let a = (1.0 - tension) * (1.0 + continuity) * 0.5;
        let b = (1.0 - tension) * (1.0 - continuity) * 0.5;

        for i in 0..n {
            // Endpoint chords are duplicated so the curve starts and ends
            // along the polyline.
            let d_prev = if i == 0 {
                points[1] - points[0]
            } else {
                points[i] - points[i - 1]
            };
            let d_next = if i == n - 1 {
                points[n - 1] - points[n - 2]
            } else {
                points[i + 1] - points[i]
            };
            m_out.push(d_prev * a + d_next * b);
            m_in.push(d_prev * b + d_next * a);
        }

        let mut spline = Self {
            points: points.to_vec(),
            m_out,
            m_in,
            table: Vec::new(),
            total_length: 0.0,
        };
        spline.build_arc_table();
        spline
    }

    fn build_arc_table(&mut self) {
        let segments = self.points.len() - 1;
        let mut table = Vec::with_capacity(segments * MIN_SUBDIV + 1);
        let mut s = 0.0f64;
        let mut prev = self.eval(0, 0.0);
        table.push(TableEntry { s: 0.0, segment: 0, t: 0.0 });

        for seg in 0..segments {
            let chord = (self.points[seg + 1] - self.points[seg]).length();
            let subdiv = ((chord / TABLE_STEP).ceil() as usize).clamp(MIN_SUBDIV, MAX_SUBDIV);
            for k in 1..=subdiv {
                let t = k as f64 / subdiv as f64;
                let p = self.eval(seg, t);
                s += (p - prev).length();
                prev = p;
                table.push(TableEntry { s, segment: seg, t });
            }
        }

        self.total_length = s;
        self.table = table;
    }

    /// Hermite position on segment `seg` at local parameter t.
    fn eval(&self, seg: usize, t: f64) -> DVec2 {
        let p0 = self.points[seg];
        let p1 = self.points[seg + 1];
        let m0 = self.m_out[seg];
        let m1 = self.m_in[seg + 1];
        let t2 = t * t;
        let t3 = t2 * t;
        p0 * (2.0 * t3 - 3.0 * t2 + 1.0)
            + m0 * (t3 - 2.0 * t2 + t)
            + p1 * (-2.0 * t3 + 3.0 * t2)
            + m1 * (t3 - t2)
    }

    /// Hermite derivative on segment `seg` at local parameter t.
    fn eval_derivative(&self, seg: usize, t: f64) -> DVec2 {
        let p0 = self.points[seg];
        let p1 = self.points[seg + 1];
        let m0 = self.m_out[seg];
        let m1 = self.m_in[seg + 1];
        let t2 = t * t;
        p0 * (6.0 * t2 - 6.0 * t)
            + m0 * (3.0 * t2 - 4.0 * t + 1.0)
            + p1 * (-6.0 * t2 + 6.0 * t)
            + m1 * (3.0 * t2 - 2.0 * t)
    }

    /// Total arc length.
    pub fn length(&self) -> f64 {
        self.total_length
    }

    pub fn start_point(&self) -> DVec2 {
        self.points[0]
    }

    pub fn end_point(&self) -> DVec2 {
        *self.points.last().unwrap()
    }

    /// Locate (segment, t) for arc-length position `d` (clamped to the
    /// curve) via the lookup table.
    fn locate(&self, d: f64) -> (usize, f64) {
        let d = d.clamp(0.0, self.total_length);
        let hi = self.table.partition_point(|e| e.s < d);
        if hi == 0 {
            let e = &self.table[0];
            return (e.segment, e.t);
        }
        if hi >= self.table.len() {
            let e = self.table.last().unwrap();
            return (e.segment, e.t);
        }
        let lo = &self.table[hi - 1];
        let up = &self.table[hi];
        if up.segment != lo.segment {
            // Bracketing entries straddle a segment boundary; snap to the
            // nearer endpoint.
            if d - lo.s <= up.s - d {
                return (lo.segment, lo.t);
            }
            return (up.segment, up.t);
        }
        let span = up.s - lo.s;
        let frac = if span > 1e-12 { (d - lo.s) / span } else { 0.0 };
        (lo.segment, lo.t + frac * (up.t - lo.t))
    }

    fn sample_with_fallback(&self, d: f64, prev_orientation: DVec2) -> SplineSample {
        let d = d.clamp(0.0, self.total_length);
        let (seg, t) = self.locate(d);
        let point = self.eval(seg, t);

        // Derivative, then segment chord, then the previous orientation.
        let mut dir = self.eval_derivative(seg, t);
        if dir.length_squared() < 1e-12 {
            dir = self.points[seg + 1] - self.points[seg];
        }
        if dir.length_squared() < 1e-12 {
            dir = prev_orientation;
        }
        let tangent = if dir.length_squared() < 1e-12 {
            DVec2::X
        } else {
            dir.normalize()
        };

        SplineSample {
            point,
            tangent,
            normal: tangent.perp(),
            distance: d,
        }
    }

    /// Sample position, unit tangent, unit normal, and cumulative distance
    /// at arc-length position `d`. Degenerate derivatives fall back to the
    /// segment chord.
    pub fn sample_by_distance(&self, d: f64) -> SplineSample {
        self.sample_with_fallback(d, DVec2::ZERO)
    }

    /// Ordered samples at arc-length positions 0, Δ, 2Δ, …, with the final
    /// sample clamped to `length()`. Δ must be > 0. Degenerate tangents
    /// reuse the previous sample's orientation.
    pub fn sample_points_at_interval(&self, interval: f64) -> Vec<SplineSample> {
        assert!(interval > 0.0, "sampling interval must be positive");
        let mut samples = Vec::with_capacity((self.total_length / interval) as usize + 2);

        let mut prev_tangent = DVec2::ZERO;
        let mut d = 0.0;
        loop {
            let s = self.sample_with_fallback(d, prev_tangent);
            prev_tangent = s.tangent;
            samples.push(s);

            if d >= self.total_length {
                break;
            }
            d = (d + interval).min(self.total_length);
        }
        samples
    }
}
