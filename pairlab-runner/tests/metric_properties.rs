use pairlab_runner::metrics::{max_drawdown, sharpe_ratio, total_return};
use proptest::prelude::*;

fn equity_curve() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0f64..1_000_000.0, 0..200)
}

proptest! {
    #[test]
    fn drawdown_is_a_non_positive_fraction(curve in equity_curve()) {
        let dd = max_drawdown(&curve);
        prop_assert!(dd <= 0.0);
        prop_assert!(dd > -1.0);
    }

    #[test]
    fn total_return_matches_endpoints(curve in equity_curve()) {
        let r = total_return(&curve);
        if curve.len() >= 2 {
            let expected = curve[curve.len() - 1] / curve[0] - 1.0;
            prop_assert!((r - expected).abs() < 1e-9);
        } else {
            prop_assert_eq!(r, 0.0);
        }
    }

    #[test]
    fn sharpe_is_finite(curve in equity_curve()) {
        prop_assert!(sharpe_ratio(&curve, 252.0).is_finite());
    }

    #[test]
    fn monotone_curve_has_no_drawdown(start in 1.0f64..1000.0, steps in prop::collection::vec(0.0f64..10.0, 1..50)) {
        let mut curve = vec![start];
        for s in steps {
            let last = curve[curve.len() - 1];
            curve.push(last + s);
        }
        prop_assert_eq!(max_drawdown(&curve), 0.0);
    }
}
