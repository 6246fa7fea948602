//! Collaborator lookups read from tables owned by other services.

use async_trait::async_trait;
use common::{AddressId, BusinessId, CustomerId, ProductId, VariantId};
use domain::{
    AddressRef, BusinessContext, BusinessDirectory, CustomerDirectory, CustomerRef, LookupError,
    VariantCatalog, VariantRef,
};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::Result;

/// Reads businesses, customers, addresses and variants from PostgreSQL.
///
/// Expects `businesses`, `customers`, `customer_addresses` and `variants`
/// tables to exist in the same database.
#[derive(Clone)]
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn business(&self, business_id: BusinessId) -> Result<Option<BusinessContext>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT id, code, name, currency, vat_rate FROM businesses WHERE id = $1")
                .bind(business_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|row| -> Result<BusinessContext> {
            Ok(BusinessContext {
                id: BusinessId::from_uuid(row.try_get("id")?),
                code: row.try_get("code")?,
                name: row.try_get("name")?,
                currency: row.try_get("currency")?,
                vat_rate: row.try_get("vat_rate")?,
            })
        })
        .transpose()
    }

    async fn customer(
        &self,
        business_id: BusinessId,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerRef>> {
        let row: Option<PgRow> = sqlx::query(
            "SELECT id, business_id, name FROM customers WHERE id = $1 AND business_id = $2",
        )
        .bind(customer_id.as_uuid())
        .bind(business_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<CustomerRef> {
            Ok(CustomerRef {
                id: CustomerId::from_uuid(row.try_get("id")?),
                business_id: BusinessId::from_uuid(row.try_get("business_id")?),
                name: row.try_get("name")?,
            })
        })
        .transpose()
    }

    async fn address(
        &self,
        business_id: BusinessId,
        address_id: AddressId,
    ) -> Result<Option<AddressRef>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT a.id, a.customer_id, a.country_code
            FROM customer_addresses a
            JOIN customers c ON c.id = a.customer_id
            WHERE a.id = $1 AND c.business_id = $2
            "#,
        )
        .bind(address_id.as_uuid())
        .bind(business_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<AddressRef> {
            Ok(AddressRef {
                id: AddressId::from_uuid(row.try_get("id")?),
                customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
                country_code: row.try_get("country_code")?,
            })
        })
        .transpose()
    }

    async fn variant(
        &self,
        business_id: BusinessId,
        variant_id: VariantId,
    ) -> Result<Option<VariantRef>> {
        let row: Option<PgRow> = sqlx::query(
            "SELECT id, product_id, business_id, name FROM variants \
             WHERE id = $1 AND business_id = $2",
        )
        .bind(variant_id.as_uuid())
        .bind(business_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<VariantRef> {
            Ok(VariantRef {
                id: VariantId::from_uuid(row.try_get("id")?),
                product_id: ProductId::from_uuid(row.try_get("product_id")?),
                business_id: BusinessId::from_uuid(row.try_get("business_id")?),
                name: row.try_get("name")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl BusinessDirectory for PostgresDirectory {
    async fn find_business(
        &self,
        business_id: BusinessId,
    ) -> std::result::Result<Option<BusinessContext>, LookupError> {
        Ok(self.business(business_id).await?)
    }
}

#[async_trait]
impl CustomerDirectory for PostgresDirectory {
    async fn find_customer(
        &self,
        business_id: BusinessId,
        customer_id: CustomerId,
    ) -> std::result::Result<Option<CustomerRef>, LookupError> {
        Ok(self.customer(business_id, customer_id).await?)
    }

    async fn find_address(
        &self,
        business_id: BusinessId,
        address_id: AddressId,
    ) -> std::result::Result<Option<AddressRef>, LookupError> {
        Ok(self.address(business_id, address_id).await?)
    }
}

#[async_trait]
impl VariantCatalog for PostgresDirectory {
    async fn find_variant(
        &self,
        business_id: BusinessId,
        variant_id: VariantId,
    ) -> std::result::Result<Option<VariantRef>, LookupError> {
        Ok(self.variant(business_id, variant_id).await?)
    }
}
