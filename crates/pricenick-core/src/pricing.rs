// Price comparison used for the recommended provider.
//
// Offers are ordered by input price, then output price. Anything still tied
// keeps discovery order, so the earliest provider wins.

use std::cmp::Ordering;

use crate::provider::{ProviderOffer, TokenPrice};

/// Total order on prices: input first, output second.
pub fn cmp_price(a: &TokenPrice, b: &TokenPrice) -> Ordering {
    unsigned_zero(a.input)
        .total_cmp(&unsigned_zero(b.input))
        .then_with(|| unsigned_zero(a.output).total_cmp(&unsigned_zero(b.output)))
}

/// `total_cmp` puts -0.0 below 0.0; a price of either is free.
fn unsigned_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Index of the recommended offer, or `None` for an empty slice.
pub fn recommend(offers: &[ProviderOffer]) -> Option<usize> {
    // `min_by` returns the first of several equal minimums.
    offers
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| cmp_price(&a.tokens, &b.tokens))
        .map(|(i, _)| i)
}

/// Offers sorted by recommendation order. Stable, so ties keep discovery order.
pub fn ranked(offers: &[ProviderOffer]) -> Vec<&ProviderOffer> {
    let mut out: Vec<&ProviderOffer> = offers.iter().collect();
    out.sort_by(|a, b| cmp_price(&a.tokens, &b.tokens));
    out
}

/// Why a price cannot take part in comparisons, if it can't.
pub fn price_defect(price: &TokenPrice) -> Option<String> {
    for (label, v) in [("input", price.input), ("output", price.output)] {
        if !v.is_finite() {
            return Some(format!("{label} price is not a number"));
        }
        if v < 0.0 {
            return Some(format!("{label} price is negative ({v})"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(provider: &str, input: f64, output: f64) -> ProviderOffer {
        ProviderOffer {
            provider: provider.to_string(),
            display_name: provider.to_uppercase(),
            website: format!("https://{provider}.example"),
            tokens: TokenPrice::new(input, output, "USD"),
        }
    }

    #[test]
    fn lowest_input_wins() {
        let offers = vec![offer("a", 2.0, 1.0), offer("b", 1.0, 9.0), offer("c", 3.0, 0.1)];
        assert_eq!(recommend(&offers), Some(1));
    }

    #[test]
    fn output_breaks_input_ties() {
        let offers = vec![offer("a", 1.0, 5.0), offer("b", 1.0, 4.0)];
        assert_eq!(recommend(&offers), Some(1));
    }

    #[test]
    fn full_tie_keeps_discovery_order() {
        let offers = vec![offer("first", 1.0, 2.0), offer("second", 1.0, 2.0)];
        assert_eq!(recommend(&offers), Some(0));
        let r = ranked(&offers);
        assert_eq!(r[0].provider, "first");
        assert_eq!(r[1].provider, "second");
    }

    #[test]
    fn negative_zero_ties_with_zero() {
        let offers = vec![offer("first", 0.0, 1.0), offer("second", -0.0, 5.0)];
        assert!(price_defect(&offers[1].tokens).is_none());
        assert_eq!(recommend(&offers), Some(0));

        let offers = vec![offer("first", -0.0, 1.0), offer("second", 0.0, 1.0)];
        assert_eq!(recommend(&offers), Some(0));
        assert_eq!(ranked(&offers)[1].provider, "second");
    }

    #[test]
    fn empty_has_no_recommendation() {
        assert_eq!(recommend(&[]), None);
    }

    #[test]
    fn ranked_orders_all_offers() {
        let offers = vec![offer("a", 3.0, 1.0), offer("b", 1.0, 1.0), offer("c", 2.0, 1.0)];
        let names: Vec<&str> = ranked(&offers).iter().map(|o| o.provider.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn defects_are_reported() {
        assert!(price_defect(&TokenPrice::new(0.0, 0.0, "USD")).is_none());
        assert!(price_defect(&TokenPrice::new(-1.0, 0.0, "USD")).is_some());
        assert!(price_defect(&TokenPrice::new(1.0, f64::NAN, "USD")).is_some());
        assert!(price_defect(&TokenPrice::new(f64::INFINITY, 1.0, "USD")).is_some());
    }
}
