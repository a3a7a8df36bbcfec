use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use bidpay_recon::config::ReconConfig;
use bidpay_recon::matcher::MatchFinder;
use bidpay_recon::model::{Bid, BidStatus, PaymentInflow};
use bidpay_recon::{similarity, ScoringModel};

fn name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z .&-]{0,24}",
        Just(String::new()),
        Just("Global Tea Co".to_string()),
        Just("Global Tea Co.".to_string()),
    ]
}

fn payment_and_bid() -> impl Strategy<Value = (PaymentInflow, Bid)> {
    (
        -1_000_000i64..10_000_000,
        -1_000_000i64..10_000_000,
        prop_oneof![Just("USD"), Just("usd"), Just("EUR")],
        proptest::option::of(name()),
        proptest::option::of(name()),
        "[A-Z0-9 -]{0,12}",
        -400i64..400,
    )
        .prop_map(|(paid, expected, currency, payer, buyer, reference, offset_hours)| {
            let t = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
            let mut payment = PaymentInflow::new("PAY-P", paid, currency, t + Duration::hours(offset_hours))
                .with_reference(reference);
            payment.payer_name = payer;
            let mut bid = Bid::new("BID-P", expected, "USD", t);
            bid.buyer_name = buyer;
            (payment, bid)
        })
}

proptest! {
    #[test]
    fn score_is_a_probability((payment, bid) in payment_and_bid()) {
        let score = ScoringModel::default().score(&payment, &bid);
        prop_assert!(!score.is_nan());
        prop_assert!((0.0..=1.0).contains(&score), "score {score}");
    }

    #[test]
    fn similarity_is_symmetric(a in name(), b in name()) {
        prop_assert_eq!(similarity(&a, &b), similarity(&b, &a));
    }

    #[test]
    fn similarity_of_identical_strings_is_one(a in name()) {
        prop_assert_eq!(similarity(&a, &a), 1.0);
    }

    #[test]
    fn similarity_is_bounded(a in name(), b in name()) {
        let s = similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn candidates_are_ranked_and_surfaced((payment, bid) in payment_and_bid(), extra in 0i64..3_000_000) {
        let mut second = bid.clone();
        second.id = "BID-Q".into();
        second.expected_amount_cents = extra;
        let mut closed = bid.clone();
        closed.id = "BID-R".into();
        closed.status = BidStatus::Fulfilled;

        let finder = MatchFinder::new(&ReconConfig::default());
        let candidates = finder.find_matches(&payment, &[bid, second, closed]);

        prop_assert!(candidates.iter().all(|c| c.bid_id != "BID-R"));
        prop_assert!(candidates.iter().all(|c| c.score > 0.3));
        prop_assert!(candidates.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
