//! # Queue Messages
//!
//! The queue carries task ids only; everything else is loaded from the
//! store at execution time, so a redelivered message always sees the
//! current task state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One dispatch of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Unique per dispatch; redeliveries of the same task get new ids
    pub delivery_id: Uuid,
    pub task_id: Uuid,
    /// 1-based dispatch attempt
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(task_id: Uuid) -> Self {
        Self::attempt(task_id, 1)
    }

    pub fn attempt(task_id: Uuid, attempt: u32) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            task_id,
            attempt,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_serializes_ids_only() {
        let delivery = Delivery::new(Uuid::new_v4());
        let json = serde_json::to_value(&delivery).unwrap();
        assert_eq!(json["attempt"], 1);
        assert_eq!(json["task_id"], delivery.task_id.to_string());

        let back: Delivery = serde_json::from_value(json).unwrap();
        assert_eq!(back, delivery);
    }
}
