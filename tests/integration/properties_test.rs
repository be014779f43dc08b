//! Invariants that hold for every position and every guard evaluation

use prop_engine::decision::{DecisionKind, ExitKind, RejectReason};
use prop_engine::feed::Bar;
use prop_engine::position::{ManagerConfig, PositionManager, RoiTier};
use prop_engine::risk::{AccountState, ExecLimits, Guards, PropLimits, RiskSizer};
use prop_engine::signal::{IndicatorSnapshot, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::common::{bar, flat_quote, long_signal, short_signal, ts};

fn open(manager: &mut PositionManager, account: &mut AccountState, signal: &Signal) -> Uuid {
    manager
        .open(signal, signal.price, ts(0), dec!(500), dec!(1), account)
        .unwrap()
        .0
}

/// Deterministic wandering bars around 1.0000
fn walk(count: i64) -> Vec<Bar> {
    let mut seed: u64 = 7;
    let mut price = dec!(1.0000);
    (1..=count)
        .map(|hour| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let step = Decimal::from((seed >> 33) % 61) - dec!(30);
            let open = price;
            let close = price + step * dec!(0.0001);
            let wick = Decimal::from((seed >> 40) % 10) * dec!(0.0001);
            price = close;
            bar(hour, open, open.max(close) + wick, open.min(close) - wick, close)
        })
        .collect()
}

#[test]
fn test_result_r_uses_r_fixed_at_fill() {
    let mut account = AccountState::new(dec!(100000)).unwrap();
    let mut manager = PositionManager::new(ManagerConfig::default());
    let id = open(&mut manager, &mut account, &long_signal());

    // Trail the stop well above the entry
    manager
        .update(
            id,
            &bar(1, dec!(1.0000), dec!(1.0080), dec!(0.9990), dec!(1.0070)),
            &IndicatorSnapshot::default(),
            &mut account,
        )
        .unwrap();
    assert!(manager.get(id).unwrap().stop > dec!(1.0000));

    let (decision, _) = manager
        .close(id, ExitKind::Manual, dec!(1.0030), ts(2), &mut account)
        .unwrap();
    assert_eq!(decision.result_r, Some(dec!(0.6)));

    let mut account = AccountState::new(dec!(100000)).unwrap();
    let id = open(&mut manager, &mut account, &short_signal());
    let (decision, _) = manager
        .close(id, ExitKind::Manual, dec!(0.9900), ts(2), &mut account)
        .unwrap();
    assert_eq!(decision.result_r, Some(dec!(2)));
    assert_eq!(account.balance, dec!(101000));
}

#[test]
fn test_stop_is_monotonic() {
    let mut config = ManagerConfig::default();
    config.giveback.enabled = false;
    config.deadfish.enabled = false;
    config.time_stop.max_bars = 1000;

    for signal in [long_signal(), short_signal()] {
        let mut account = AccountState::new(dec!(100000)).unwrap();
        let mut manager = PositionManager::new(config.clone());
        let id = open(&mut manager, &mut account, &signal);

        let mut last = manager.get(id).unwrap().stop;
        for bar in walk(200) {
            manager
                .update(id, &bar, &IndicatorSnapshot::default(), &mut account)
                .unwrap();
            let position = manager.get(id).unwrap();
            assert!(
                !signal.side.is_better(last, position.stop),
                "{:?} stop moved back from {} to {}",
                signal.side,
                last,
                position.stop
            );
            last = position.stop;
            if !position.is_open() {
                break;
            }
        }
    }
}

#[test]
fn test_ambiguous_bar_resolves_as_stop() {
    let mut account = AccountState::new(dec!(100000)).unwrap();
    let mut manager = PositionManager::new(ManagerConfig::default());
    let signal = long_signal().with_target(dec!(1.0100));
    let id = open(&mut manager, &mut account, &signal);

    let outcome = manager
        .update(
            id,
            &bar(1, dec!(1.0000), dec!(1.0200), dec!(0.9940), dec!(1.0000)),
            &IndicatorSnapshot::default(),
            &mut account,
        )
        .unwrap();
    let exit = outcome.exit().unwrap();
    assert_eq!(exit.exit_kind(), Some(ExitKind::StopLoss));
    assert_eq!(exit.price, dec!(0.9950));
    assert_eq!(exit.result_r, Some(dec!(-1)));

    // Same with a trailed stop and an ROI-lowered target
    let mut config = ManagerConfig::default();
    config.roi.enabled = true;
    config.roi.tiers = vec![RoiTier::new(0, dec!(1.0))];
    let mut account = AccountState::new(dec!(100000)).unwrap();
    let mut manager = PositionManager::new(config);
    let id = open(&mut manager, &mut account, &signal);

    manager
        .update(
            id,
            &bar(1, dec!(1.0000), dec!(1.0040), dec!(0.9990), dec!(1.0030)),
            &IndicatorSnapshot::default(),
            &mut account,
        )
        .unwrap();
    let stop = manager.get(id).unwrap().stop;
    assert_eq!(stop, dec!(1.0025));

    let outcome = manager
        .update(
            id,
            &bar(2, dec!(1.0030), dec!(1.0200), dec!(1.0020), dec!(1.0100)),
            &IndicatorSnapshot::default(),
            &mut account,
        )
        .unwrap();
    let exit = outcome.exit().unwrap();
    assert_eq!(exit.exit_kind(), Some(ExitKind::TrailingStop));
    assert_eq!(exit.price, stop);
}

#[test]
fn test_sizing_never_exceeds_headroom() {
    let limits = PropLimits {
        risk_per_trade_pct: dec!(2.0),
        ..Default::default()
    };
    let sizer = RiskSizer::new(limits);
    let signal = long_signal();

    for loss in [dec!(0), dec!(500), dec!(1000), dec!(2000), dec!(2900), dec!(3500), dec!(5800)] {
        let mut account = AccountState::new(dec!(100000)).unwrap();
        account.equity -= loss;
        let sizing = sizer.compute(&signal, &account);

        assert!(sizing.risk_cash <= sizing.remaining_daily * dec!(0.5));
        assert!(sizing.risk_cash <= sizing.remaining_total * dec!(0.3));
        assert!(sizing.risk_cash >= Decimal::ZERO);
        if loss >= dec!(3000) {
            assert!(!sizing.is_tradeable());
        }
    }
}

#[test]
fn test_first_failing_guard_wins() {
    let guards = Guards::new(PropLimits::default(), ExecLimits::default());
    let quote = flat_quote(dec!(1.0000));

    // Daily drawdown breached and the market squeezed
    let mut account = AccountState::new(dec!(100000)).unwrap();
    account.equity = dec!(96900);
    let squeezed = long_signal().with_indicators(IndicatorSnapshot {
        bb_width: dec!(0.001),
        ..Default::default()
    });
    assert_eq!(
        guards.evaluate(&squeezed, &account, &quote).reject_reason(),
        Some(RejectReason::DailyDrawdown)
    );

    // Trade cap reached with the instrument already open
    let mut account = AccountState::new(dec!(100000)).unwrap();
    account.register_open("EURUSD", dec!(100)).unwrap();
    account.trades_today = 10;
    assert_eq!(
        guards
            .evaluate(&long_signal(), &account, &quote)
            .reject_reason(),
        Some(RejectReason::MaxDailyTrades)
    );

    // Only the squeeze left
    let account = AccountState::new(dec!(100000)).unwrap();
    assert_eq!(
        guards.evaluate(&squeezed, &account, &quote).reject_reason(),
        Some(RejectReason::VolatilitySqueeze)
    );
}

#[test]
fn test_update_on_closed_position_is_noop() {
    let mut account = AccountState::new(dec!(100000)).unwrap();
    let mut manager = PositionManager::new(ManagerConfig::default());
    let id = open(&mut manager, &mut account, &long_signal());

    let outcome = manager
        .update(
            id,
            &bar(1, dec!(1.0000), dec!(1.0010), dec!(0.9900), dec!(0.9950)),
            &IndicatorSnapshot::default(),
            &mut account,
        )
        .unwrap();
    assert!(matches!(
        outcome.exit().map(|d| d.kind),
        Some(DecisionKind::Exit {
            kind: ExitKind::StopLoss
        })
    ));

    let before = manager.get(id).unwrap().clone();
    let account_before = account.clone();
    let outcome = manager
        .update(
            id,
            &bar(2, dec!(0.9950), dec!(1.0300), dec!(0.9800), dec!(1.0200)),
            &IndicatorSnapshot::default(),
            &mut account,
        )
        .unwrap();

    assert!(outcome.decisions.is_empty());
    assert!(outcome.counterfactual.is_none());
    assert_eq!(manager.get(id).unwrap(), &before);
    assert_eq!(account, account_before);
    assert!(manager
        .close(id, ExitKind::Manual, dec!(1.0), ts(3), &mut account)
        .is_err());
}
