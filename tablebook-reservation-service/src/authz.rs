//! One capability check per operation, evaluated before any write.

use std::str::FromStr;

use tablebook_proto::common;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Reservation, Restaurant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Diner,
    RestaurantOwner,
    Admin,
}

impl From<common::Role> for Role {
    fn from(role: common::Role) -> Self {
        match role {
            common::Role::Diner => Role::Diner,
            common::Role::RestaurantOwner => Role::RestaurantOwner,
            common::Role::Admin => Role::Admin,
        }
    }
}

/// The caller as resolved by the upstream identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

impl TryFrom<Option<common::Actor>> for Actor {
    type Error = ServiceError;

    fn try_from(actor: Option<common::Actor>) -> Result<Self, Self::Error> {
        let actor = actor.ok_or_else(|| ServiceError::validation("actor must be set"))?;
        let user_id = Uuid::from_str(&actor.user_id)
            .map_err(|_| ServiceError::validation("Invalid actor user_id"))?;
        let role = common::Role::try_from(actor.role)
            .map_err(|_| ServiceError::validation("Invalid actor role"))?;
        Ok(Actor::new(user_id, role.into()))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Capability<'a> {
    /// Any diner acting for themselves.
    Diner,
    DinerOwnsReservation(&'a Reservation),
    /// The restaurant's owner; administrators act for every restaurant.
    OwnerOf(&'a Restaurant),
    Admin,
}

/// Wrong role is `Forbidden`; right role but someone else's entity is
/// `NotFound` so existence does not leak.
pub fn authorize(actor: &Actor, capability: Capability<'_>) -> Result<(), ServiceError> {
    match capability {
        Capability::Diner => match actor.role {
            Role::Diner => Ok(()),
            _ => Err(ServiceError::Forbidden),
        },
        Capability::DinerOwnsReservation(reservation) => match actor.role {
            Role::Diner if reservation.user_id == actor.user_id => Ok(()),
            Role::Diner => Err(ServiceError::NotFound),
            _ => Err(ServiceError::Forbidden),
        },
        Capability::OwnerOf(restaurant) => match actor.role {
            Role::Admin => Ok(()),
            Role::RestaurantOwner if restaurant.owner_id == actor.user_id => Ok(()),
            Role::RestaurantOwner => Err(ServiceError::NotFound),
            Role::Diner => Err(ServiceError::Forbidden),
        },
        Capability::Admin => match actor.role {
            Role::Admin => Ok(()),
            _ => Err(ServiceError::Forbidden),
        },
    }
}
