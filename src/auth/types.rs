use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Role of an acting user
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Staff,
}

/// Resolved identity of the caller, attached to every authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: i32,
    pub role: Role,
    /// Shop assignment; staff without one cannot act on shop data
    pub shop_id: Option<i32>,
}

impl Requester {
    pub fn admin(user_id: i32) -> Self {
        Self {
            user_id,
            role: Role::Admin,
            shop_id: None,
        }
    }

    pub fn staff(user_id: i32, shop_id: Option<i32>) -> Self {
        Self {
            user_id,
            role: Role::Staff,
            shop_id,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The shop a staff member is bound to
    pub fn assigned_shop(&self) -> Result<i32, ServiceError> {
        self.shop_id
            .ok_or(ServiceError::StaffNotAssigned(self.user_id))
    }

    /// Admins reach every shop; staff only their own.
    pub fn can_access_shop(&self, shop_id: i32) -> bool {
        self.is_admin() || self.shop_id == Some(shop_id)
    }

    pub fn ensure_shop_access(&self, shop_id: i32) -> Result<(), ServiceError> {
        if self.can_access_shop(shop_id) {
            Ok(())
        } else {
            Err(ServiceError::AccessDenied(format!(
                "user {} cannot act on shop {}",
                self.user_id, shop_id
            )))
        }
    }

    /// Shop filter to apply to listings: `None` means unrestricted.
    pub fn shop_scope(&self) -> Option<i32> {
        if self.is_admin() {
            None
        } else {
            // Unassigned staff match nothing.
            Some(self.shop_id.unwrap_or(-1))
        }
    }
}
