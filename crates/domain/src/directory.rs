//! Read-only lookups of the collaborators an order references.
//!
//! Businesses, customers, addresses and variants are owned elsewhere. The
//! order core only reads them, always scoped to a business.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AddressId, BusinessId, CustomerId, ProductId, VariantId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Settings of a business captured onto each new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessContext {
    pub id: BusinessId,
    /// Short descriptor used as the order-number prefix.
    pub code: String,
    pub name: String,
    /// ISO 4217 code, e.g. "AED".
    pub currency: String,
    /// Fraction, e.g. `0.05` for 5%.
    pub vat_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: CustomerId,
    pub business_id: BusinessId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRef {
    pub id: AddressId,
    pub customer_id: CustomerId,
    /// ISO 3166-1 alpha-2, used for country breakdowns.
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRef {
    pub id: VariantId,
    pub product_id: ProductId,
    pub business_id: BusinessId,
    pub name: String,
}

/// Failure of the lookup backend itself. Absence is `Ok(None)`.
#[derive(Debug, Error)]
#[error("lookup failed: {0}")]
pub struct LookupError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl LookupError {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }
}

#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    async fn find_business(
        &self,
        business_id: BusinessId,
    ) -> Result<Option<BusinessContext>, LookupError>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Returns the customer only if it belongs to `business_id`.
    async fn find_customer(
        &self,
        business_id: BusinessId,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerRef>, LookupError>;

    /// Returns the address only if its customer belongs to `business_id`.
    async fn find_address(
        &self,
        business_id: BusinessId,
        address_id: AddressId,
    ) -> Result<Option<AddressRef>, LookupError>;
}

#[async_trait]
pub trait VariantCatalog: Send + Sync {
    /// Returns the variant only if it belongs to `business_id`.
    async fn find_variant(
        &self,
        business_id: BusinessId,
        variant_id: VariantId,
    ) -> Result<Option<VariantRef>, LookupError>;
}

/// Bundle of collaborator lookups handed to the service.
#[derive(Clone)]
pub struct Directories {
    pub businesses: Arc<dyn BusinessDirectory>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub variants: Arc<dyn VariantCatalog>,
}

impl Directories {
    /// Uses one value for all three lookups.
    pub fn from_shared<D>(directory: Arc<D>) -> Self
    where
        D: BusinessDirectory + CustomerDirectory + VariantCatalog + 'static,
    {
        Self {
            businesses: directory.clone(),
            customers: directory.clone(),
            variants: directory,
        }
    }
}

#[derive(Default)]
struct DirectoryData {
    businesses: HashMap<BusinessId, BusinessContext>,
    customers: HashMap<CustomerId, CustomerRef>,
    addresses: HashMap<AddressId, AddressRef>,
    variants: HashMap<VariantId, VariantRef>,
}

/// In-memory implementation of all collaborator lookups.
///
/// Used by tests and by the API when no database is configured.
#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    data: Arc<RwLock<DirectoryData>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_business(&self, business: BusinessContext) {
        self.data
            .write()
            .await
            .businesses
            .insert(business.id, business);
    }

    pub async fn add_customer(&self, customer: CustomerRef) {
        self.data
            .write()
            .await
            .customers
            .insert(customer.id, customer);
    }

    pub async fn add_address(&self, address: AddressRef) {
        self.data.write().await.addresses.insert(address.id, address);
    }

    pub async fn add_variant(&self, variant: VariantRef) {
        self.data.write().await.variants.insert(variant.id, variant);
    }
}

#[async_trait]
impl BusinessDirectory for InMemoryDirectory {
    async fn find_business(
        &self,
        business_id: BusinessId,
    ) -> Result<Option<BusinessContext>, LookupError> {
        Ok(self.data.read().await.businesses.get(&business_id).cloned())
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryDirectory {
    async fn find_customer(
        &self,
        business_id: BusinessId,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerRef>, LookupError> {
        let data = self.data.read().await;
        Ok(data
            .customers
            .get(&customer_id)
            .filter(|c| c.business_id == business_id)
            .cloned())
    }

    async fn find_address(
        &self,
        business_id: BusinessId,
        address_id: AddressId,
    ) -> Result<Option<AddressRef>, LookupError> {
        let data = self.data.read().await;
        let Some(address) = data.addresses.get(&address_id) else {
            return Ok(None);
        };
        let owned = data
            .customers
            .get(&address.customer_id)
            .is_some_and(|c| c.business_id == business_id);
        Ok(owned.then(|| address.clone()))
    }
}

#[async_trait]
impl VariantCatalog for InMemoryDirectory {
    async fn find_variant(
        &self,
        business_id: BusinessId,
        variant_id: VariantId,
    ) -> Result<Option<VariantRef>, LookupError> {
        let data = self.data.read().await;
        Ok(data
            .variants
            .get(&variant_id)
            .filter(|v| v.business_id == business_id)
            .cloned())
    }
}
