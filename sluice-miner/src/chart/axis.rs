//! Display bounds for the two axis groups.

use super::Channel;

/// The chart draws two y axes: one shared by the hashrate series, one
/// by the temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisGroup {
    Hashrate,
    Temperature,
}

impl AxisGroup {
    pub fn channels(self) -> &'static [Channel] {
        match self {
            AxisGroup::Hashrate => &[
                Channel::Hashrate1m,
                Channel::Hashrate10m,
                Channel::Hashrate1h,
                Channel::Hashrate1d,
            ],
            AxisGroup::Temperature => &[Channel::VregTemp, Channel::AsicTemp],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
}

/// Computes padded display bounds over one or more series, skipping
/// gap markers.
#[derive(Debug, Clone)]
pub struct AxisScale {
    padding_frac: f64,
    zero_floor: bool,
}

impl AxisScale {
    /// Hashrate axes never dip below zero no matter the padding.
    pub fn hashrate() -> Self {
        Self {
            padding_frac: 0.10,
            zero_floor: true,
        }
    }

    pub fn temperature() -> Self {
        Self {
            padding_frac: 0.08,
            zero_floor: false,
        }
    }

    pub fn padding(&self) -> f64 {
        self.padding_frac
    }

    /// Runtime padding override from the console. Garbage fractions
    /// are clamped rather than rejected.
    pub fn set_padding(&mut self, frac: f64) {
        if frac.is_finite() {
            self.padding_frac = frac.max(0.0);
        }
    }

    /// `None` when every sample across every series is a gap.
    pub fn bounds<'a>(&self, series: impl IntoIterator<Item = &'a [f64]>) -> Option<AxisBounds> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut seen = false;
        for values in series {
            for &v in values {
                if v.is_finite() {
                    min = min.min(v);
                    max = max.max(v);
                    seen = true;
                }
            }
        }
        if !seen {
            return None;
        }

        let span = max - min;
        let (mut lo, mut hi) = if span == 0.0 {
            // Flat series still deserves visible headroom.
            let widen = (min.abs() * self.padding_frac).max(1.0);
            (min - widen, max + widen)
        } else {
            let pad = span * self.padding_frac;
            (min - pad, max + pad)
        };

        if self.zero_floor {
            lo = lo.max(0.0);
        }
        if hi < lo {
            hi = lo;
        }
        Some(AxisBounds { min: lo, max: hi })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_all_nan_series_have_no_bounds() {
        let scale = AxisScale::temperature();
        assert_eq!(scale.bounds([]), None);
        let gaps = [f64::NAN, f64::NAN];
        assert_eq!(scale.bounds([&gaps[..]]), None);
    }

    #[test]
    fn gaps_are_skipped() {
        let scale = AxisScale::temperature();
        let values = [f64::NAN, 50.0, f64::NAN, 70.0];
        let bounds = scale.bounds([&values[..]]).unwrap();
        assert!(bounds.min < 50.0);
        assert!(bounds.max > 70.0);
    }

    #[test]
    fn padding_is_a_fraction_of_the_span() {
        let mut scale = AxisScale::temperature();
        scale.set_padding(0.10);
        let values = [50.0, 70.0];
        let bounds = scale.bounds([&values[..]]).unwrap();
        assert_eq!(bounds.min, 48.0);
        assert_eq!(bounds.max, 72.0);
    }

    #[test]
    fn multiple_series_share_one_range() {
        let scale = AxisScale::temperature();
        let a = [55.0, 60.0];
        let b = [40.0, 80.0];
        let bounds = scale.bounds([&a[..], &b[..]]).unwrap();
        assert!(bounds.min < 40.0);
        assert!(bounds.max > 80.0);
    }

    #[test]
    fn hashrate_axis_is_floored_at_zero() {
        let scale = AxisScale::hashrate();
        let values = [1.0, 100.0];
        let bounds = scale.bounds([&values[..]]).unwrap();
        assert_eq!(bounds.min, 0.0);
        assert!(bounds.max > 100.0);
    }

    #[test]
    fn flat_series_widens() {
        let scale = AxisScale::temperature();
        let values = [60.0, 60.0, 60.0];
        let bounds = scale.bounds([&values[..]]).unwrap();
        assert!(bounds.min < 60.0);
        assert!(bounds.max > 60.0);
    }

    #[test]
    fn garbage_padding_is_clamped() {
        let mut scale = AxisScale::temperature();
        scale.set_padding(-0.5);
        assert_eq!(scale.padding(), 0.0);
        scale.set_padding(f64::NAN);
        assert_eq!(scale.padding(), 0.0);
        scale.set_padding(0.25);
        assert_eq!(scale.padding(), 0.25);
    }

    #[test]
    fn group_channels_cover_all_six() {
        let total = AxisGroup::Hashrate.channels().len() + AxisGroup::Temperature.channels().len();
        assert_eq!(total, Channel::COUNT);
    }
}
