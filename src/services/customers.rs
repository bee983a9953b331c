use crate::{
    entities::customer,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10}$").expect("valid phone regex"));

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    #[validate(regex(path = "PHONE_RE", message = "phone must be exactly 10 digits"))]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerView {
    pub id: i32,
    pub name: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

impl From<customer::Model> for CustomerView {
    fn from(model: customer::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            phone: model.phone,
            created_at: model.created_at,
        }
    }
}

/// Customers are keyed by phone number; registering a known phone returns the
/// existing record untouched.
#[derive(Debug, Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the customer and whether it was created by this call
    #[instrument(skip(self, request))]
    pub async fn find_or_create(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<(CustomerView, bool), ServiceError> {
        let request = CreateCustomerRequest {
            name: request.name.trim().to_string(),
            phone: request.phone.trim().to_string(),
        };
        request.validate()?;

        if let Some(existing) = self.find_by_phone(&request.phone).await? {
            return Ok((existing.into(), false));
        }

        let inserted = customer::ActiveModel {
            name: Set(request.name.clone()),
            phone: Set(request.phone.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await;

        match inserted {
            Ok(model) => {
                info!(customer_id = model.id, "Customer created");
                self.event_sender
                    .send_or_log(Event::CustomerCreated(model.id));
                Ok((model.into(), true))
            }
            Err(err) => match ServiceError::from(err) {
                // Another request registered the same phone first.
                ServiceError::ConcurrencyConflict(_) => self
                    .find_by_phone(&request.phone)
                    .await?
                    .map(|model| (model.into(), false))
                    .ok_or_else(|| {
                        ServiceError::InternalError("customer vanished after conflict".into())
                    }),
                other => Err(other),
            },
        }
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<customer::Model>, ServiceError> {
        Ok(customer::Entity::find()
            .filter(customer::Column::Phone.eq(phone))
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, customer_id: i32) -> Result<CustomerView, ServiceError> {
        customer::Entity::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .map(CustomerView::from)
            .ok_or_else(|| ServiceError::NotFound(format!("customer {}", customer_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_must_be_ten_digits() {
        let ok = CreateCustomerRequest {
            name: "An".into(),
            phone: "0901234567".into(),
        };
        assert!(ok.validate().is_ok());

        for bad in ["090123456", "09012345678", "09012x4567", ""] {
            let req = CreateCustomerRequest {
                name: "An".into(),
                phone: bad.into(),
            };
            assert!(req.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn empty_name_is_rejected() {
        let req = CreateCustomerRequest {
            name: String::new(),
            phone: "0901234567".into(),
        };
        assert!(req.validate().is_err());
    }
}
