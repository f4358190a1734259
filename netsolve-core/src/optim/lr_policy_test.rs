use super::*;
use approx::assert_relative_eq;

#[test]
fn test_inv_matches_closed_form() {
    let policy = LrPolicy::Inv { gamma: 1e-4, power: 0.75 };
    for &iter in &[1usize, 10, 100, 5000, 10000] {
        let expected = 0.01 * (1.0f64 + 1e-4 * iter as f64).powf(-0.75);
        assert_relative_eq!(policy.rate(0.01, iter), expected as f32, max_relative = 1e-6);
    }
    // 1 + 1e-4 * 10000 = 2
    assert_relative_eq!(policy.rate(0.01, 10000), 0.01 * 2.0f32.powf(-0.75), max_relative = 1e-6);
}

#[test]
fn test_inv_is_monotone_decreasing() {
    let policy = LrPolicy::default();
    let rates: Vec<f32> = (1..200).map(|i| policy.rate(0.01, i * 50)).collect();
    assert!(rates.windows(2).all(|w| w[1] < w[0]));
    assert!(rates[0] < 0.01);
}

#[test]
fn test_fixed_step_exp() {
    assert_eq!(LrPolicy::Fixed.rate(0.1, 12345), 0.1);

    let step = LrPolicy::Step { gamma: 0.1, stepsize: 10 };
    assert_relative_eq!(step.rate(1.0, 9), 1.0);
    assert_relative_eq!(step.rate(1.0, 10), 0.1, max_relative = 1e-6);
    assert_relative_eq!(step.rate(1.0, 25), 0.01, max_relative = 1e-6);

    let exp = LrPolicy::Exp { gamma: 0.5 };
    assert_relative_eq!(exp.rate(1.0, 3), 0.125);
}

#[test]
fn test_multistep() {
    let policy = LrPolicy::MultiStep { gamma: 0.5, stepvalue: vec![5, 10] };
    assert_relative_eq!(policy.rate(2.0, 4), 2.0);
    assert_relative_eq!(policy.rate(2.0, 5), 1.0);
    assert_relative_eq!(policy.rate(2.0, 9), 1.0);
    assert_relative_eq!(policy.rate(2.0, 10), 0.5);
    assert_relative_eq!(policy.rate(2.0, 1000), 0.5);
}

#[test]
fn test_poly_and_sigmoid() {
    let poly = LrPolicy::Poly { power: 1.0, max_iter: 100 };
    assert_relative_eq!(poly.rate(1.0, 50), 0.5);
    assert_eq!(poly.rate(1.0, 100), 0.0);
    assert_eq!(poly.rate(1.0, 150), 0.0);

    let sigmoid = LrPolicy::Sigmoid { gamma: 1.0, stepsize: 10 };
    assert_relative_eq!(sigmoid.rate(1.0, 10), 0.5);
    assert!(sigmoid.rate(1.0, 30) > 0.99);
}

#[test]
fn test_validate() {
    assert!(LrPolicy::default().validate().is_ok());
    assert!(LrPolicy::Step { gamma: 0.1, stepsize: 0 }.validate().is_err());
    assert!(LrPolicy::MultiStep { gamma: 0.1, stepvalue: vec![] }.validate().is_err());
    assert!(LrPolicy::MultiStep { gamma: 0.1, stepvalue: vec![10, 10] }.validate().is_err());
    assert!(LrPolicy::Inv { gamma: -1.0, power: 0.75 }.validate().is_err());
    assert!(LrPolicy::Inv { gamma: f32::NAN, power: 0.75 }.validate().is_err());
    assert!(LrPolicy::Inv { gamma: 1e-4, power: f32::NAN }.validate().is_err());
    assert!(LrPolicy::Inv { gamma: f32::INFINITY, power: 0.75 }.validate().is_err());
    assert!(LrPolicy::Poly { power: 1.0, max_iter: 0 }.validate().is_err());
}

#[test]
fn test_schedule_counter_is_one_based_and_shared() {
    let policy = LrPolicy::Inv { gamma: 0.5, power: 1.0 };
    let mut schedule = LrSchedule::new(1.0, policy).unwrap();
    assert_eq!(schedule.iter(), 0);
    assert_eq!(schedule.get_last_lr(), 1.0);

    // First update: 1 / (1 + 0.5 * 1)
    assert_relative_eq!(schedule.step(), 1.0 / 1.5);
    assert_relative_eq!(schedule.step(), 1.0 / 2.0);
    assert_eq!(schedule.iter(), 2);

    // Peeking does not move the counter.
    assert_relative_eq!(schedule.next_rate(), 1.0 / 2.5);
    assert_eq!(schedule.iter(), 2);

    schedule.set_iter(8);
    assert_relative_eq!(schedule.get_last_lr(), 1.0 / 5.0);
    assert_relative_eq!(schedule.step(), 1.0 / 5.5);
}

#[test]
fn test_schedule_rejects_bad_base_lr() {
    assert!(matches!(
        LrSchedule::new(0.0, LrPolicy::Fixed),
        Err(NetsolveError::ConfigurationError(_))
    ));
    assert!(LrSchedule::new(f32::NAN, LrPolicy::Fixed).is_err());
}

#[test]
fn test_policy_tagged_form() {
    let json = r#"{"type":"inv","gamma":0.0001,"power":0.75}"#;
    let policy: LrPolicy = serde_json::from_str(json).unwrap();
    assert_eq!(policy, LrPolicy::Inv { gamma: 1e-4, power: 0.75 });

    let json = r#"{"type":"multistep","gamma":0.1,"stepvalue":[100,200]}"#;
    let policy: LrPolicy = serde_json::from_str(json).unwrap();
    assert_eq!(policy, LrPolicy::MultiStep { gamma: 0.1, stepvalue: vec![100, 200] });
}
