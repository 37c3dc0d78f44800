use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::customer_address::{self, Entity as CustomerAddress},
    errors::ServiceError,
};

/// Address fields as embedded in an order document. A value, not a
/// reference: once snapshotted, edits to the saved address never reach the
/// order. The serde aliases accept legacy stored documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AddressSnapshot {
    pub name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    #[serde(alias = "postalCode", alias = "pincode")]
    pub postal_code: String,
    pub country: String,
    #[serde(alias = "addressType")]
    pub address_type: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddressInput {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 4, message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_address_type")]
    pub address_type: String,
}

fn default_country() -> String {
    "IN".to_string()
}

fn default_address_type() -> String {
    "home".to_string()
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AddressResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub address_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<customer_address::Model> for AddressResponse {
    fn from(model: customer_address::Model) -> Self {
        Self {
            id: model.id,
            customer_id: model.customer_id,
            name: model.name,
            phone: model.phone,
            street: model.street,
            city: model.city,
            state: model.state,
            postal_code: model.postal_code,
            country: model.country,
            address_type: model.address_type,
            created_at: model.created_at,
        }
    }
}

/// Saved-address store, keyed by customer.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DbPool>,
}

impl AddressService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(customer_id = %customer_id))]
    pub async fn save(
        &self,
        customer_id: Uuid,
        input: AddressInput,
    ) -> Result<customer_address::Model, ServiceError> {
        input.validate()?;

        let model = customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            name: Set(input.name),
            phone: Set(input.phone),
            street: Set(input.street),
            city: Set(input.city),
            state: Set(input.state),
            postal_code: Set(input.postal_code),
            country: Set(input.country),
            address_type: Set(input.address_type),
            created_at: Set(Utc::now()),
        };

        let saved = model.insert(&*self.db).await?;
        info!(address_id = %saved.id, "address saved");
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<customer_address::Model>, ServiceError> {
        let addresses = CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .order_by_desc(customer_address::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(addresses)
    }

    /// Look up one of the customer's saved addresses. Returns `None` when the
    /// id does not exist or belongs to a different customer.
    #[instrument(skip(self))]
    pub async fn get_for_customer(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> Result<Option<customer_address::Model>, ServiceError> {
        let address = CustomerAddress::find_by_id(address_id)
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?;
        Ok(address)
    }

    /// Copy a saved address into the value embedded in an order.
    pub fn snapshot(address: &customer_address::Model) -> AddressSnapshot {
        AddressSnapshot {
            name: address.name.clone(),
            phone: address.phone.clone(),
            street: address.street.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
            address_type: address.address_type.clone(),
        }
    }
}
