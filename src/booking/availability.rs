//! Room availability under the caller's unit of work.
//!
//! The check reads through the same `BookingTx` the coordinator inserts
//! with, after `lock_rooms`, so nothing can slip in between check and insert.

use tracing::debug;

use super::types::{RoomId, StayInterval};
use crate::store::{BookingTx, StoreError};

pub struct AvailabilityChecker;

impl AvailabilityChecker {
    /// No active booking of `room_id` overlaps `interval`
    pub async fn is_available(
        tx: &mut dyn BookingTx,
        room_id: RoomId,
        interval: &StayInterval,
    ) -> Result<bool, StoreError> {
        let overlapping = tx.count_overlapping(room_id, interval).await?;
        if overlapping > 0 {
            debug!(room_id = %room_id, overlapping, %interval, "Room occupied");
        }
        Ok(overlapping == 0)
    }

    /// First room (in request order) that is not available, if any
    pub async fn first_conflict(
        tx: &mut dyn BookingTx,
        room_ids: &[RoomId],
        interval: &StayInterval,
    ) -> Result<Option<RoomId>, StoreError> {
        for room_id in room_ids {
            if !Self::is_available(tx, *room_id, interval).await? {
                return Ok(Some(*room_id));
            }
        }
        Ok(None)
    }
}
