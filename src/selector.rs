//! Provider selector (spec §4.9, C6).
//!
//! Produces a deterministic, priority-ordered list of eligible adapters for
//! a destination phone and amount. The head of the list is the primary
//! attempt for C5; the remainder is its failover order.

use std::sync::Arc;

use crate::breaker::BreakerRegistry;
use crate::errors::OrchestratorError;
use crate::provider::ProviderRegistry;
use crate::types::ProviderTag;
use crate::util::money_amount::Amount;

pub struct Selection {
    pub ordered_tags: Vec<ProviderTag>,
    pub cross_network: bool,
}

/// Selects and orders eligible providers for `phone_digits`/`amount` (spec §4.9 steps 1-6).
pub fn select(
    providers: &ProviderRegistry,
    breakers: &BreakerRegistry,
    phone_digits: &str,
    amount: Amount,
) -> Result<Selection, OrchestratorError> {
    let matching: Vec<_> = providers
        .all()
        .iter()
        .filter(|adapter| adapter.supports_phone(phone_digits))
        .collect();

    let eligible = filter_eligible(&matching, breakers, amount);
    if !eligible.is_empty() {
        return Ok(Selection {
            ordered_tags: eligible,
            cross_network: false,
        });
    }

    let fallback = filter_eligible(&providers.all().iter().collect::<Vec<_>>(), breakers, amount);
    if fallback.is_empty() {
        return Err(OrchestratorError::NoEligibleProvider);
    }
    Ok(Selection {
        ordered_tags: fallback,
        cross_network: true,
    })
}

fn filter_eligible(
    candidates: &[&Arc<dyn crate::provider::ProviderAdapter>],
    breakers: &BreakerRegistry,
    amount: Amount,
) -> Vec<ProviderTag> {
    candidates
        .iter()
        .filter(|adapter| !breakers.is_open(adapter.provider_tag()))
        .filter(|adapter| amount.is_between(adapter.limits().min, adapter.limits().max))
        .map(|adapter| adapter.provider_tag().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, CallOutcome};
    use crate::provider::airteltigo::AirtelTigoAdapter;
    use crate::provider::mtn::MtnAdapter;
    use crate::provider::ProviderLimits;
    use std::time::Duration;

    fn limits() -> ProviderLimits {
        ProviderLimits {
            min: Amount::parse("1.00").unwrap(),
            max: Amount::parse("5000.00").unwrap(),
            daily: Amount::parse("20000.00").unwrap(),
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(vec![
            Arc::new(MtnAdapter::new("u".into(), "k".into(), "s".into(), limits())),
            Arc::new(AirtelTigoAdapter::new("u".into(), "c".into(), "s".into(), "w".into(), limits())),
        ])
    }

    #[test]
    fn prefers_phone_matching_provider_when_healthy() {
        let registry = registry();
        let breakers = BreakerRegistry::new(vec![
            ("mtn".to_string(), BreakerConfig::default()),
            ("airteltigo".to_string(), BreakerConfig::default()),
        ]);
        let selection = select(&registry, &breakers, "233241234567", Amount::parse("50.00").unwrap()).unwrap();
        assert_eq!(selection.ordered_tags, vec!["mtn".to_string()]);
        assert!(!selection.cross_network);
    }

    #[test]
    fn falls_back_cross_network_when_preferred_provider_breaker_is_open() {
        let registry = registry();
        let config = BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        };
        let breakers = BreakerRegistry::new(vec![
            ("mtn".to_string(), config),
            ("airteltigo".to_string(), BreakerConfig::default()),
        ]);
        breakers.admit("mtn").unwrap();
        breakers.record("mtn", CallOutcome::Failure, Duration::from_millis(10));

        let selection = select(&registry, &breakers, "233241234567", Amount::parse("50.00").unwrap()).unwrap();
        assert!(selection.cross_network);
        assert_eq!(selection.ordered_tags, vec!["airteltigo".to_string()]);
    }
}
