//! Pricing
//!
//! Pure computation of line items and invoice totals from catalog prices.
//! `total = Σ(room price × nights) + Σ(service price × quantity)`, all in
//! integer minor units.

use thiserror::Error;

use super::types::{Room, RoomId, ServiceId, ServiceItem};
use crate::money::Money;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Nights must be positive, got {0}")]
    InvalidNights(i64),

    #[error("Negative catalog price: {0}")]
    NegativePrice(Money),

    #[error("Amount overflow")]
    Overflow,
}

/// Room line with its nightly price snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomCharge {
    pub room_id: RoomId,
    pub unit_price: Money,
    pub amount: Money,
}

/// Service line with its unit price snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCharge {
    pub service_id: ServiceId,
    pub quantity: u32,
    pub unit_price: Money,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub nights: u32,
    pub rooms: Vec<RoomCharge>,
    pub services: Vec<ServiceCharge>,
    pub total: Money,
}

pub struct PricingCalculator;

impl PricingCalculator {
    /// Price every room for `nights` and every service for its quantity.
    pub fn quote(
        rooms: &[Room],
        nights: i64,
        services: &[(ServiceItem, u32)],
    ) -> Result<PriceQuote, PricingError> {
        let nights = u32::try_from(nights)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(PricingError::InvalidNights(nights))?;

        let mut total = Money::ZERO;

        let mut room_charges = Vec::with_capacity(rooms.len());
        for room in rooms {
            if room.price.is_negative() {
                return Err(PricingError::NegativePrice(room.price));
            }
            let amount = room.price.checked_mul(nights)?;
            total = total.checked_add(amount)?;
            room_charges.push(RoomCharge {
                room_id: room.id,
                unit_price: room.price,
                amount,
            });
        }

        let mut service_charges = Vec::with_capacity(services.len());
        for (service, quantity) in services {
            if service.price.is_negative() {
                return Err(PricingError::NegativePrice(service.price));
            }
            let amount = service.price.checked_mul(*quantity)?;
            total = total.checked_add(amount)?;
            service_charges.push(ServiceCharge {
                service_id: service.id,
                quantity: *quantity,
                unit_price: service.price,
                amount,
            });
        }

        Ok(PriceQuote {
            nights,
            rooms: room_charges,
            services: service_charges,
            total,
        })
    }

    pub fn compute_total(
        rooms: &[Room],
        nights: i64,
        services: &[(ServiceItem, u32)],
    ) -> Result<Money, PricingError> {
        Self::quote(rooms, nights, services).map(|q| q.total)
    }
}
