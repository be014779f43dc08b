//! Worked scenarios through the decision core

use prop_engine::counterfactual::CounterfactualOrigin;
use prop_engine::decision::{DecisionKind, ExitKind};
use prop_engine::engine::{DecisionCore, SignalOutcome};
use prop_engine::signal::IndicatorSnapshot;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::common::{bar, flat_quote, long_signal, scenario_config, ts};

fn open_long(core: &mut DecisionCore) -> Uuid {
    let signal = long_signal();
    let outcome = core.evaluate_signal(&signal, &flat_quote(dec!(1.0000)));
    let SignalOutcome::Accepted {
        approval, volume, ..
    } = outcome
    else {
        panic!("signal rejected: {:?}", outcome.decision());
    };
    assert_eq!(approval.sizing.risk_cash, dec!(500));
    assert_eq!(volume, dec!(1));

    let (id, _) = core
        .open_position(&signal, dec!(1.0000), ts(0), approval.sizing.risk_cash, volume)
        .unwrap();
    id
}

#[test]
fn test_breakeven_then_giveback() {
    let mut core = DecisionCore::new(&scenario_config()).unwrap();
    let id = open_long(&mut core);

    // MFE 0.6R
    let first = core
        .on_bar(
            &bar(1, dec!(1.0000), dec!(1.0030), dec!(0.9990), dec!(1.0020)),
            &IndicatorSnapshot::default(),
        )
        .unwrap();
    assert_eq!(first.decisions.len(), 1);
    assert_eq!(first.decisions[0].kind, DecisionKind::Breakeven);
    assert_eq!(first.decisions[0].new_stop(), Some(dec!(1.0001)));

    // Back to 0.05R with RSI and CMF both weak
    let weak = IndicatorSnapshot {
        rsi: dec!(40),
        cmf: dec!(-0.1),
        ..Default::default()
    };
    let second = core
        .on_bar(
            &bar(2, dec!(1.0010), dec!(1.0010), dec!(1.00015), dec!(1.00025)),
            &weak,
        )
        .unwrap();

    assert_eq!(second.decisions.len(), 1);
    let exit = &second.decisions[0];
    assert_eq!(
        exit.kind,
        DecisionKind::Exit {
            kind: ExitKind::Giveback
        }
    );
    assert_eq!(exit.result_r, Some(dec!(0.05)));
    assert_eq!(second.closed, vec![id]);

    assert_eq!(second.created.len(), 1);
    assert!(matches!(
        second.created[0].origin,
        CounterfactualOrigin::EarlyExit {
            kind: ExitKind::Giveback,
            ..
        }
    ));
    assert_eq!(core.tracker().active().len(), 1);
    assert_eq!(core.account().balance, dec!(100025));
    assert_eq!(core.account().open_positions, 0);
}

/// A bar crossing several tiers emits a single trailing decision for the
/// highest tier reached; the lower tiers it passed are not replayed.
#[test]
fn test_single_bar_to_two_r_trails_once() {
    let mut core = DecisionCore::new(&scenario_config()).unwrap();
    open_long(&mut core);

    // High at entry + 2.2R, low above the original stop
    let report = core
        .on_bar(
            &bar(1, dec!(1.0000), dec!(1.0110), dec!(0.9960), dec!(1.0080)),
            &IndicatorSnapshot::default(),
        )
        .unwrap();

    let kinds: Vec<_> = report.decisions.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DecisionKind::Breakeven,
            DecisionKind::TrailingActivated { tier: 2 }
        ]
    );
    let position = &core.open_positions()[0];
    assert_eq!(position.stop, dec!(1.0060));
    assert_eq!(position.trailing_tier, 2);
    assert_eq!(position.r(), dec!(0.005));
}

#[test]
fn test_one_trailing_decision_per_tier_crossed() {
    let mut core = DecisionCore::new(&scenario_config()).unwrap();
    open_long(&mut core);

    let steps = [
        // 1.6R: tier 1
        bar(1, dec!(1.0000), dec!(1.0080), dec!(0.9990), dec!(1.0070)),
        // 2.2R: tier 2
        bar(2, dec!(1.0070), dec!(1.0110), dec!(1.0060), dec!(1.0100)),
        // no new high, nothing to do
        bar(3, dec!(1.0100), dec!(1.0105), dec!(1.0070), dec!(1.0080)),
    ];

    let mut trailing = Vec::new();
    let mut last_stop = dec!(0.9950);
    for bar in &steps {
        let report = core.on_bar(bar, &IndicatorSnapshot::default()).unwrap();
        for decision in report.decisions {
            let stop = decision.new_stop().unwrap();
            assert!(stop > last_stop);
            last_stop = stop;
            if let DecisionKind::TrailingActivated { tier } | DecisionKind::TrailingTightened { tier } =
                decision.kind
            {
                trailing.push(tier);
            }
        }
    }

    assert_eq!(trailing, vec![1, 2]);
    assert_eq!(core.open_positions()[0].stop, dec!(1.0060));
}
