//! Bin service layer - provisioning, sensor ingestion and linking

use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    generate_bin_id, BinError, BinSnapshot, FillLevel, IngestOutcome, ProvisionBinRequest,
    SmartBin,
};
use crate::models::{Principal, UserRole};
use crate::store::{Store, StoreError};

/// Attempts at drawing a free generated bin ID
const MAX_BIN_ID_ATTEMPTS: usize = 5;

/// Bin service for managing smart bins
#[derive(Clone)]
pub struct BinService {
    store: Arc<dyn Store>,
}

impl BinService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register an unlinked bin under the caller's municipality
    pub async fn provision(
        &self,
        principal: &Principal,
        request: ProvisionBinRequest,
    ) -> Result<SmartBin, BinError> {
        let municipality_id = match principal.role {
            UserRole::Municipality => principal.municipality_id.ok_or_else(|| {
                BinError::Unauthorized("account is not attached to a municipality".to_string())
            })?,
            UserRole::Admin => request.municipality_id.ok_or_else(|| {
                BinError::InvalidInput("municipality_id is required".to_string())
            })?,
            _ => {
                return Err(BinError::Unauthorized(
                    "only municipalities provision bins".to_string(),
                ))
            }
        };

        if self.store.municipality(municipality_id).await?.is_none() {
            return Err(BinError::InvalidInput(format!(
                "unknown municipality {}",
                municipality_id
            )));
        }
        check_coordinates(request.latitude, request.longitude)?;

        let location = request.location.trim().to_string();
        if location.is_empty() {
            return Err(BinError::InvalidInput("location is required".to_string()));
        }

        let bin = match request.bin_id.map(|id| id.trim().to_string()) {
            Some(bin_id) if !bin_id.is_empty() => {
                let bin = SmartBin::provisioned(
                    bin_id,
                    municipality_id,
                    location,
                    request.latitude,
                    request.longitude,
                );
                match self.store.insert_bin(&bin).await {
                    Ok(()) => bin,
                    Err(StoreError::Duplicate(_)) => {
                        return Err(BinError::DuplicateBinId(bin.bin_id))
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ => {
                self.insert_with_generated_id(
                    municipality_id,
                    location,
                    request.latitude,
                    request.longitude,
                )
                .await?
            }
        };

        tracing::info!(
            bin_id = %bin.bin_id,
            municipality_id = %municipality_id,
            "Bin provisioned"
        );
        Ok(bin)
    }

    /// Apply a sensor reading and derive the new status
    pub async fn ingest_fill_level(
        &self,
        bin_id: &str,
        reading: i64,
    ) -> Result<IngestOutcome, BinError> {
        let level = FillLevel::new(reading)?;

        let mut uow = self.store.begin().await?;
        let mut bin = uow
            .bin_for_update(bin_id)
            .await?
            .ok_or_else(|| BinError::NotFound(bin_id.to_string()))?;
        if !bin.is_active {
            return Err(BinError::Inactive(bin.bin_id));
        }

        let threshold_crossed = bin.record_fill(level);
        uow.update_bin(&bin).await?;
        uow.commit().await?;

        tracing::debug!(
            bin_id = %bin.bin_id,
            fill_percentage = bin.fill_percentage,
            status = ?bin.status,
            "Bin reading recorded"
        );
        if let Some(event) = &threshold_crossed {
            tracing::info!(
                bin_id = %event.bin_id,
                fill_percentage = event.fill_percentage,
                status = ?event.status,
                "Bin crossed collection threshold"
            );
        }

        Ok(IngestOutcome {
            snapshot: bin.snapshot(),
            threshold_crossed,
        })
    }

    /// Customer claims an unlinked bin
    pub async fn link(&self, principal: &Principal, bin_id: &str) -> Result<SmartBin, BinError> {
        if principal.role != UserRole::Customer {
            return Err(BinError::Unauthorized(
                "only customers can link bins".to_string(),
            ));
        }

        let mut uow = self.store.begin().await?;
        let mut bin = uow
            .bin_for_update(bin_id)
            .await?
            .ok_or_else(|| BinError::NotFound(bin_id.to_string()))?;
        if !bin.is_active {
            return Err(BinError::Inactive(bin.bin_id));
        }
        bin.link_to(principal.user_id)?;
        uow.update_bin(&bin).await?;
        uow.commit().await?;

        tracing::info!(bin_id = %bin.bin_id, customer_id = %principal.user_id, "Bin linked");
        Ok(bin)
    }

    pub async fn bin(&self, bin_id: &str) -> Result<SmartBin, BinError> {
        self.store
            .bin(bin_id)
            .await?
            .ok_or_else(|| BinError::NotFound(bin_id.to_string()))
    }

    pub async fn snapshot(&self, bin_id: &str) -> Result<BinSnapshot, BinError> {
        Ok(self.bin(bin_id).await?.snapshot())
    }

    /// Take a bin out of service. Bins are never deleted.
    pub async fn deactivate(
        &self,
        principal: &Principal,
        bin_id: &str,
    ) -> Result<SmartBin, BinError> {
        let mut uow = self.store.begin().await?;
        let mut bin = uow
            .bin_for_update(bin_id)
            .await?
            .ok_or_else(|| BinError::NotFound(bin_id.to_string()))?;

        let owns = principal.administered_municipality() == Some(bin.municipality_id);
        if !owns && !principal.is_admin() {
            return Err(BinError::Unauthorized(
                "bin belongs to another municipality".to_string(),
            ));
        }

        if bin.is_active {
            bin.is_active = false;
            bin.updated_at = chrono::Utc::now();
            uow.update_bin(&bin).await?;
            uow.commit().await?;
            tracing::info!(bin_id = %bin.bin_id, "Bin deactivated");
        }
        Ok(bin)
    }

    async fn insert_with_generated_id(
        &self,
        municipality_id: Uuid,
        location: String,
        latitude: Option<Decimal>,
        longitude: Option<Decimal>,
    ) -> Result<SmartBin, BinError> {
        for _ in 0..MAX_BIN_ID_ATTEMPTS {
            let bin = SmartBin::provisioned(
                generate_bin_id(),
                municipality_id,
                location.clone(),
                latitude,
                longitude,
            );
            match self.store.insert_bin(&bin).await {
                Ok(()) => return Ok(bin),
                Err(StoreError::Duplicate(_)) => {
                    tracing::warn!(bin_id = %bin.bin_id, "Generated bin ID taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict("could not allocate a unique bin ID".to_string()).into())
    }
}

fn check_coordinates(latitude: Option<Decimal>, longitude: Option<Decimal>) -> Result<(), BinError> {
    let within = |value: Option<Decimal>, bound: i64| {
        value.map_or(true, |v| v.abs() <= Decimal::from(bound))
    };
    if !within(latitude, 90) || !within(longitude, 180) {
        return Err(BinError::InvalidInput(
            "coordinates are out of range".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Municipality;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn setup() -> (BinService, Principal) {
        let store = MemoryStore::new();
        let municipality_id = Uuid::new_v4();
        let admin_id = Uuid::new_v4();
        store
            .insert_municipality(Municipality {
                id: municipality_id,
                name: "Huye".to_string(),
                email: "huye@example.com".to_string(),
                admin_user_id: admin_id,
                created_at: Utc::now(),
            })
            .await;
        (
            BinService::new(Arc::new(store)),
            Principal::new(admin_id, UserRole::Municipality, Some(municipality_id)),
        )
    }

    fn request(bin_id: Option<&str>) -> ProvisionBinRequest {
        ProvisionBinRequest {
            bin_id: bin_id.map(str::to_string),
            municipality_id: None,
            location: " Station Rd ".to_string(),
            latitude: Some(dec!(-2.59)),
            longitude: Some(dec!(29.74)),
        }
    }

    #[tokio::test]
    async fn test_provision_generates_and_guards_ids() {
        let (bins, municipal) = setup().await;

        let generated = bins.provision(&municipal, request(None)).await.unwrap();
        assert!(generated.bin_id.starts_with("BIN"));
        assert_eq!(generated.location, "Station Rd");
        assert!(!generated.is_linked);

        bins.provision(&municipal, request(Some("BIN001"))).await.unwrap();
        assert!(matches!(
            bins.provision(&municipal, request(Some("BIN001"))).await,
            Err(BinError::DuplicateBinId(_))
        ));

        let mut bad = request(None);
        bad.latitude = Some(dec!(91));
        assert!(matches!(
            bins.provision(&municipal, bad).await,
            Err(BinError::InvalidInput(_))
        ));

        let customer = Principal::new(Uuid::new_v4(), UserRole::Customer, None);
        assert!(matches!(
            bins.provision(&customer, request(None)).await,
            Err(BinError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivated_bin_refuses_readings_and_links() {
        let (bins, municipal) = setup().await;
        bins.provision(&municipal, request(Some("BIN007"))).await.unwrap();

        let other = Principal::new(Uuid::new_v4(), UserRole::Municipality, Some(Uuid::new_v4()));
        assert!(matches!(
            bins.deactivate(&other, "BIN007").await,
            Err(BinError::Unauthorized(_))
        ));

        let bin = bins.deactivate(&municipal, "BIN007").await.unwrap();
        assert!(!bin.is_active);

        assert!(matches!(
            bins.ingest_fill_level("BIN007", 40).await,
            Err(BinError::Inactive(_))
        ));
        let customer = Principal::new(Uuid::new_v4(), UserRole::Customer, None);
        assert!(matches!(
            bins.link(&customer, "BIN007").await,
            Err(BinError::Inactive(_))
        ));
    }
}
