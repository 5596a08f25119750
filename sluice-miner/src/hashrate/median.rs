//! Fixed-window running median over `f64` samples.

/// Ring buffer of the last `N` samples with median extraction. `N` must
/// be odd so a full window always has a true middle element.
#[derive(Debug, Clone)]
pub struct Median<const N: usize> {
    buf: [f64; N],
    len: usize,
    next: usize,
}

/// Five-sample window used for hashrate smoothing.
pub type Median5 = Median<5>;

impl<const N: usize> Median<N> {
    const ODD: () = assert!(N % 2 == 1, "median window size must be odd");

    pub fn new() -> Self {
        let () = Self::ODD;
        Self {
            buf: [0.0; N],
            len: 0,
            next: 0,
        }
    }

    /// Appends a sample, evicting the oldest once the window is full.
    pub fn push(&mut self, value: f64) {
        self.buf[self.next] = value;
        self.next = (self.next + 1) % N;
        if self.len < N {
            self.len += 1;
        }
    }

    /// Median of the samples seen so far, or `None` while empty. Before
    /// the window fills, an even count takes the upper middle element.
    pub fn get(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        let mut sorted = [0.0; N];
        sorted[..self.len].copy_from_slice(&self.buf[..self.len]);
        sorted[..self.len].sort_unstable_by(f64::total_cmp);
        Some(sorted[self.len / 2])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True once `N` samples have been recorded.
    pub fn is_saturated(&self) -> bool {
        self.len == N
    }
}

impl<const N: usize> Default for Median<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_has_no_median() {
        let m = Median5::new();
        assert!(m.is_empty());
        assert_eq!(m.get(), None);
    }

    #[test]
    fn partial_window_uses_recorded_samples() {
        let mut m = Median5::new();
        m.push(10.0);
        assert_eq!(m.get(), Some(10.0));
        m.push(30.0);
        // Two samples, upper middle.
        assert_eq!(m.get(), Some(30.0));
        m.push(20.0);
        assert_eq!(m.get(), Some(20.0));
        assert!(!m.is_saturated());
    }

    #[test]
    fn full_window_takes_true_median() {
        let mut m = Median5::new();
        for v in [5.0, 1.0, 4.0, 2.0, 3.0] {
            m.push(v);
        }
        assert!(m.is_saturated());
        assert_eq!(m.get(), Some(3.0));
    }

    #[test]
    fn window_slides_over_oldest_sample() {
        let mut m = Median5::new();
        for v in [100.0, 1.0, 2.0, 3.0, 4.0] {
            m.push(v);
        }
        assert_eq!(m.get(), Some(3.0));
        // Evicts 100.0; window is now [1, 2, 3, 4, 5].
        m.push(5.0);
        assert_eq!(m.get(), Some(3.0));
        m.push(6.0);
        assert_eq!(m.get(), Some(4.0));
    }

    #[test]
    fn outlier_sample_does_not_move_full_window() {
        let mut m = Median5::new();
        for v in [90.0, 91.0, 92.0, 93.0, 1e12] {
            m.push(v);
        }
        assert_eq!(m.get(), Some(92.0));
    }
}
