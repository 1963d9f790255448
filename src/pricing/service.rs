//! Pricing service layer

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    PriceConfiguration, PricingDefaults, PricingError, Quote, QuoteSource, Scope,
    SetPriceRequest, WasteType,
};
use crate::ledger::parse_amount;
use crate::models::{Principal, UserRole};
use crate::store::Store;

/// Resolves prices for municipal collections and recycler pickups
#[derive(Clone)]
pub struct PricingResolver {
    store: Arc<dyn Store>,
    defaults: PricingDefaults,
}

impl PricingResolver {
    pub fn new(store: Arc<dyn Store>, defaults: PricingDefaults) -> Self {
        Self { store, defaults }
    }

    /// Configured price for `waste_type` in `scope`, or the scope's default
    pub async fn resolve(&self, scope: Scope, waste_type: WasteType) -> Result<Quote, PricingError> {
        if let Some(config) = self.store.price(scope, waste_type).await? {
            return Ok(Quote {
                scope,
                waste_type,
                price: config.price,
                unit: config.unit,
                source: QuoteSource::Configured,
            });
        }

        let price = match scope {
            Scope::Municipality(_) => self.defaults.collection_fee,
            Scope::Recycler(_) => self.defaults.recycling_rate,
        };
        tracing::warn!(
            scope = %scope,
            waste_type = %waste_type,
            price = %price,
            "No price configured, falling back to default"
        );
        Ok(Quote {
            scope,
            waste_type,
            price,
            unit: scope.default_unit().to_string(),
            source: QuoteSource::Default,
        })
    }

    /// Set the caller's own price for a waste type
    pub async fn set_price(
        &self,
        principal: &Principal,
        request: SetPriceRequest,
    ) -> Result<PriceConfiguration, PricingError> {
        let scope = owned_scope(principal)?;
        let price = parse_amount(request.price)
            .map_err(|e| PricingError::InvalidInput(e.to_string()))?;
        let unit = request
            .unit
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| scope.default_unit().to_string());

        let now = Utc::now();
        let config = PriceConfiguration {
            id: Uuid::new_v4(),
            scope,
            waste_type: request.waste_type,
            price,
            unit,
            created_at: now,
            updated_at: now,
        };
        let saved = self.store.upsert_price(&config).await?;

        tracing::info!(
            scope = %scope,
            waste_type = %saved.waste_type,
            price = %saved.price,
            "Price configured"
        );
        Ok(saved)
    }

    pub async fn list_prices(&self, scope: Scope) -> Result<Vec<PriceConfiguration>, PricingError> {
        Ok(self.store.prices(scope).await?)
    }
}

/// Scope a principal may price: its municipality, or itself as a recycler
fn owned_scope(principal: &Principal) -> Result<Scope, PricingError> {
    match principal.role {
        UserRole::Municipality => principal
            .municipality_id
            .map(Scope::Municipality)
            .ok_or_else(|| {
                PricingError::Unauthorized("account is not attached to a municipality".to_string())
            }),
        UserRole::Recycler => Ok(Scope::Recycler(principal.user_id)),
        _ => Err(PricingError::Unauthorized(
            "only municipalities and recyclers set prices".to_string(),
        )),
    }
}

/// Parse a scope from query parameters; exactly one of the two must be set
pub fn scope_from_query(
    municipality_id: Option<Uuid>,
    recycler_id: Option<Uuid>,
) -> Result<Scope, PricingError> {
    Scope::from_columns(municipality_id, recycler_id).ok_or_else(|| {
        PricingError::InvalidInput(
            "exactly one of municipality_id or recycler_id is required".to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::UNIT_PER_KG;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn resolver() -> PricingResolver {
        PricingResolver::new(Arc::new(MemoryStore::new()), PricingDefaults::default())
    }

    #[tokio::test]
    async fn test_resolve_prefers_configured_price() {
        let pricing = resolver();
        let recycler = Principal::new(Uuid::new_v4(), UserRole::Recycler, None);
        let scope = Scope::Recycler(recycler.user_id);

        let fallback = pricing.resolve(scope, WasteType::Glass).await.unwrap();
        assert_eq!(fallback.source, QuoteSource::Default);
        assert_eq!(fallback.price, dec!(10.00));
        assert_eq!(fallback.unit, UNIT_PER_KG);

        pricing
            .set_price(
                &recycler,
                SetPriceRequest {
                    waste_type: WasteType::Glass,
                    price: dec!(12.5),
                    unit: Some("  ".to_string()),
                },
            )
            .await
            .unwrap();
        let quote = pricing.resolve(scope, WasteType::Glass).await.unwrap();
        assert_eq!(quote.source, QuoteSource::Configured);
        assert_eq!(quote.price, dec!(12.50));
        assert_eq!(quote.unit, UNIT_PER_KG);

        // Other waste types keep falling back
        let other = pricing.resolve(scope, WasteType::Paper).await.unwrap();
        assert_eq!(other.source, QuoteSource::Default);
    }

    #[tokio::test]
    async fn test_set_price_replaces_existing() {
        let pricing = resolver();
        let municipality = Uuid::new_v4();
        let admin = Principal::new(Uuid::new_v4(), UserRole::Municipality, Some(municipality));
        for price in [dec!(40), dec!(45)] {
            pricing
                .set_price(
                    &admin,
                    SetPriceRequest {
                        waste_type: WasteType::General,
                        price,
                        unit: None,
                    },
                )
                .await
                .unwrap();
        }
        let prices = pricing
            .list_prices(Scope::Municipality(municipality))
            .await
            .unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].price, dec!(45.00));
    }

    #[tokio::test]
    async fn test_set_price_rejections() {
        let pricing = resolver();
        let customer = Principal::new(Uuid::new_v4(), UserRole::Customer, None);
        let request = |price| SetPriceRequest {
            waste_type: WasteType::Metal,
            price,
            unit: None,
        };
        assert!(matches!(
            pricing.set_price(&customer, request(dec!(5))).await,
            Err(PricingError::Unauthorized(_))
        ));

        let recycler = Principal::new(Uuid::new_v4(), UserRole::Recycler, None);
        assert!(matches!(
            pricing.set_price(&recycler, request(dec!(0))).await,
            Err(PricingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_scope_from_query_needs_exactly_one() {
        let id = Uuid::new_v4();
        assert_eq!(
            scope_from_query(Some(id), None).unwrap(),
            Scope::Municipality(id)
        );
        assert_eq!(scope_from_query(None, Some(id)).unwrap(), Scope::Recycler(id));
        assert!(scope_from_query(None, None).is_err());
        assert!(scope_from_query(Some(id), Some(id)).is_err());
    }
}
