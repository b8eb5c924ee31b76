//! Dense per-model buffers of sub-step image positions.

use nalgebra::Point2;

/// Sub-step trace of one model, in image coordinates.
///
/// Grows only through [`TraceGrowth`] commits and shrinks only through
/// [`TraceBuffer::truncate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceBuffer {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

/// Staged growth of a trace. The committed buffer is untouched until
/// [`TraceBuffer::commit`] swaps the staged arrays in.
#[derive(Debug)]
pub struct TraceGrowth {
    base_len: usize,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl TraceGrowth {
    /// Writes sub-step `index` (0-based, relative to the committed length).
    pub fn set(&mut self, index: usize, p: Point2<f64>) {
        let i = self.base_len + index;
        self.xs[i] = p.x;
        self.ys[i] = p.y;
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

impl TraceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_point(p: Point2<f64>) -> Self {
        Self { xs: vec![p.x], ys: vec![p.y] }
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn get(&self, index: usize) -> Option<Point2<f64>> {
        Some(Point2::new(*self.xs.get(index)?, *self.ys.get(index)?))
    }

    /// Valid (non-NaN) points in order, as drawn.
    pub fn points(&self) -> impl Iterator<Item = Point2<f64>> + '_ {
        self.xs
            .iter()
            .zip(&self.ys)
            .filter(|(x, y)| !x.is_nan() && !y.is_nan())
            .map(|(x, y)| Point2::new(*x, *y))
    }

    /// Copies the committed samples into a larger staging buffer with
    /// `additional` slots, prefilled with `NaN`.
    pub fn begin_growth(&self, additional: usize) -> TraceGrowth {
        let len = self.xs.len() + additional;
        let mut xs = Vec::with_capacity(len);
        let mut ys = Vec::with_capacity(len);
        xs.extend_from_slice(&self.xs);
        ys.extend_from_slice(&self.ys);
        xs.resize(len, f64::NAN);
        ys.resize(len, f64::NAN);
        TraceGrowth { base_len: self.xs.len(), xs, ys }
    }

    pub fn commit(&mut self, growth: TraceGrowth) {
        self.xs = growth.xs;
        self.ys = growth.ys;
    }

    /// Drops the last `count` samples. Returns false, leaving the buffer
    /// unchanged, when fewer than `count` samples exist.
    pub fn truncate(&mut self, count: usize) -> bool {
        let Some(len) = self.xs.len().checked_sub(count) else {
            return false;
        };
        self.xs = self.xs[..len].to_vec();
        self.ys = self.ys[..len].to_vec();
        true
    }

    pub fn clear(&mut self) {
        self.xs = Vec::new();
        self.ys = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_is_invisible_until_commit() {
        let mut trace = TraceBuffer::from_point(Point2::new(1.0, 1.0));
        let mut growth = trace.begin_growth(2);
        growth.set(0, Point2::new(2.0, 2.0));
        assert_eq!(trace.len(), 1);
        assert_eq!(growth.len(), 3);
        trace.commit(growth);
        assert_eq!(trace.get(1), Some(Point2::new(2.0, 2.0)));
        // slot never written stays NaN and is skipped when drawing
        assert!(trace.xs()[2].is_nan());
        assert_eq!(trace.points().count(), 2);
    }

    #[test]
    fn truncate_refuses_to_underflow() {
        let mut trace = TraceBuffer::from_point(Point2::new(0.0, 0.0));
        assert!(!trace.truncate(2));
        assert_eq!(trace.len(), 1);
        assert!(trace.truncate(1));
        assert!(trace.is_empty());
    }
}
