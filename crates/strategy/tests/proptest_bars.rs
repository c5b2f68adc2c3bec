use proptest::prelude::*;
use common::{Bar, RawBar, Signal};
use strategy::{BarAggregator, EngulfingDetector, PatternDetector};

fn ohlc() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (1.0f64..1000.0, 1.0f64..1000.0, 0.0f64..50.0, 0.0f64..50.0).prop_map(
        |(open, close, up, down)| {
            let high = open.max(close) + up;
            let low = open.min(close) - down;
            (open, high, low, close)
        },
    )
}

proptest! {
    /// Series length never exceeds capacity for any update sequence.
    #[test]
    fn series_never_exceeds_capacity(
        capacity in 2usize..20,
        steps in prop::collection::vec((0i64..4, ohlc()), 1..300),
    ) {
        let mut agg = BarAggregator::new(capacity);
        let mut bucket = 0i64;
        for (advance, (o, h, l, c)) in steps {
            bucket += advance * 60;
            let _ = agg.apply_update(&RawBar::update(o, h, l, c, bucket + 1, bucket));
            prop_assert!(agg.series().len() <= capacity);
        }
        let times: Vec<i64> = agg.series().iter().map(|b| b.open_time).collect();
        prop_assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    /// After N merges the in-progress bar spans the max high and min low seen.
    #[test]
    fn merged_bar_tracks_extremes(updates in prop::collection::vec(ohlc(), 1..50)) {
        let mut agg = BarAggregator::default();
        for (i, (o, h, l, c)) in updates.iter().enumerate() {
            agg.apply_update(&RawBar::update(*o, *h, *l, *c, 60 + i as i64, 60)).unwrap();
        }
        let bar = agg.in_progress().unwrap();
        let max_high = updates.iter().map(|u| u.1).fold(f64::MIN, f64::max);
        let min_low = updates.iter().map(|u| u.2).fold(f64::MAX, f64::min);
        prop_assert_eq!(bar.high, max_high);
        prop_assert_eq!(bar.low, min_low);
        prop_assert_eq!(bar.close, updates.last().unwrap().3);
        prop_assert!(bar.is_sane());
        prop_assert!(agg.series().is_empty());
    }

    /// Call and Put require opposite bar directions, so a pair never yields both,
    /// and the signal is symmetric under price reflection.
    #[test]
    fn detector_is_direction_symmetric(
        a in 1.0f64..100.0, b in 1.0f64..100.0, c in 1.0f64..100.0, d in 1.0f64..100.0,
    ) {
        let mk = |open: f64, close: f64| Bar {
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            open_time: 0,
            last_update_time: 0,
        };
        let signal = EngulfingDetector.detect(&[mk(a, b), mk(c, d)]);
        let mirrored = EngulfingDetector.detect(&[mk(-a, -b), mk(-c, -d)]);
        let expected = match signal {
            Signal::Call => Signal::Put,
            Signal::Put => Signal::Call,
            Signal::Neutral => Signal::Neutral,
        };
        prop_assert_eq!(mirrored, expected);
    }
}
