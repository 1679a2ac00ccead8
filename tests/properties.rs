//! Property-based tests for the batch evaluator.

use coefsig::{process_batch, Defaults, ErrorKind, Outcome, RawRecord, RegressionType};
use proptest::prelude::*;

fn record(coefficient: f64, std_error: f64, sample_size: i64) -> RawRecord {
    RawRecord::new()
        .with("coefficient", coefficient)
        .with("std_error", std_error)
        .with("sample_size", sample_size)
}

prop_compose! {
    fn valid_record()(
        coefficient in -100.0f64..100.0,
        std_error in 0.001f64..50.0,
        sample_size in 3i64..10_000,
        alpha in prop::option::of(0.001f64..0.999),
    ) -> RawRecord {
        let mut r = record(coefficient, std_error, sample_size);
        if let Some(alpha) = alpha {
            r.insert("significance_level", alpha);
        }
        r
    }
}

prop_compose! {
    fn any_record()(
        coefficient in prop_oneof![
            (-100.0f64..100.0).prop_map(serde_json::Value::from),
            "[a-z]{0,4}".prop_map(serde_json::Value::from),
        ],
        std_error in -1.0f64..5.0,
        sample_size in -5i64..50,
        regression_type in prop::option::of(prop_oneof![
            Just("simple"),
            Just("Multiple"),
            Just("quadratic"),
        ]),
        num_predictors in prop::option::of(-1i64..10),
    ) -> RawRecord {
        let mut r = RawRecord::new()
            .with("coefficient", coefficient)
            .with("std_error", std_error)
            .with("sample_size", sample_size);
        if let Some(t) = regression_type {
            r.insert("regression_type", t);
        }
        if let Some(k) = num_predictors {
            r.insert("num_predictors", k);
        }
        r
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_valid_records_satisfy_invariants(records in prop::collection::vec(valid_record(), 0..20)) {
        let outcomes = process_batch(&records, Defaults::default());
        prop_assert_eq!(outcomes.len(), records.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            prop_assert_eq!(outcome.row_index(), i + 1);
            let e = outcome.as_success().expect("valid record failed");
            prop_assert!((0.0..=1.0).contains(&e.p_value()));
            prop_assert_eq!(e.is_significant(), e.p_value() < e.alpha_used());
            let ci = e.confidence_interval();
            prop_assert!(ci.lower <= e.coefficient() && e.coefficient() <= ci.upper);
            let tol = 1e-9 * e.coefficient().abs().max(e.margin_of_error()).max(1.0);
            prop_assert!(((ci.upper - e.coefficient()) - (e.coefficient() - ci.lower)).abs() <= tol);
        }
    }

    #[test]
    fn prop_output_matches_input_length(records in prop::collection::vec(any_record(), 0..30)) {
        let outcomes = process_batch(&records, Defaults::default());
        prop_assert_eq!(outcomes.len(), records.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            prop_assert_eq!(outcome.row_index(), i + 1);
        }
    }

    #[test]
    fn prop_failures_are_isolated(
        records in prop::collection::vec(any_record(), 1..15),
        at in any::<prop::sample::Index>(),
    ) {
        let defaults = Defaults::default();
        let alone = process_batch(&records, defaults);
        let at = at.index(records.len() + 1);
        let mut with_bad = records.clone();
        with_bad.insert(at, record(1.0, 0.0, 100));
        let outcomes = process_batch(&with_bad, defaults);
        prop_assert_eq!(outcomes.len(), records.len() + 1);
        prop_assert_eq!(
            outcomes[at].as_error().map(|e| e.error_kind),
            Some(ErrorKind::InvalidInput)
        );
        let others = outcomes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != at)
            .map(|(_, o)| o);
        for (a, b) in alone.iter().zip(others) {
            match (a, b) {
                (Outcome::Success(a), Outcome::Success(b)) => {
                    prop_assert_eq!(a.p_value().to_bits(), b.p_value().to_bits());
                    prop_assert_eq!(a.confidence_interval(), b.confidence_interval());
                }
                (Outcome::Error(a), Outcome::Error(b)) => {
                    prop_assert_eq!(a.error_kind, b.error_kind);
                    prop_assert_eq!(&a.error_message, &b.error_message);
                }
                _ => prop_assert!(false, "outcome changed kind"),
            }
        }
    }

    #[test]
    fn prop_batch_is_idempotent(records in prop::collection::vec(valid_record(), 0..20)) {
        let defaults = Defaults { alpha: 0.01, regression_type: RegressionType::Simple };
        let first = process_batch(&records, defaults);
        let second = process_batch(&records, defaults);
        prop_assert_eq!(first, second);
    }
}
