//! Per-temple fan-out of live status and alert events
//!
//! Delivery is best effort: events published while nobody listens are dropped,
//! and a lagging subscriber skips what it missed.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::models::{
    crowd::{Alert, Density},
    slot::{Slot, SlotStatus},
};

/// Status snapshot pushed after every occupancy update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub is_open: bool,
    pub current_occupancy: i32,
    pub occupancy_percentage: i32,
    pub crowd_level: Density,
    pub last_updated: DateTime<Utc>,
    pub capacity: i32,
}

/// Slot availability change caused by a reservation or release
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotEvent {
    pub slot_id: i32,
    pub status: SlotStatus,
    pub booked_count: i32,
    pub available_spots: i32,
}

impl From<&Slot> for SlotEvent {
    fn from(slot: &Slot) -> Self {
        Self {
            slot_id: slot.id,
            status: slot.status,
            booked_count: slot.booked_count,
            available_spots: slot.available_spots(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TempleEvent {
    Status(StatusEvent),
    Alert(Alert),
    Slot(SlotEvent),
}

impl TempleEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            TempleEvent::Status(_) => "status",
            TempleEvent::Alert(_) => "alert",
            TempleEvent::Slot(_) => "slot",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            TempleEvent::Status(status) => serde_json::to_string(status),
            TempleEvent::Alert(alert) => serde_json::to_string(alert),
            TempleEvent::Slot(slot) => serde_json::to_string(slot),
        }
    }
}

type Channels = Arc<RwLock<HashMap<i32, broadcast::Sender<TempleEvent>>>>;

#[derive(Clone)]
pub struct TempleBroadcaster {
    channels: Channels,
    capacity: usize,
}

impl TempleBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Publish to the temple's subscribers; returns how many received it
    pub async fn publish(&self, temple_id: i32, event: TempleEvent) -> usize {
        let channels = self.channels.read().await;
        match channels.get(&temple_id) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub async fn subscribe(&self, temple_id: i32) -> broadcast::Receiver<TempleEvent> {
        let mut channels = self.channels.write().await;
        // Drop channels whose subscribers have all gone away
        channels.retain(|_, sender| sender.receiver_count() > 0);
        channels
            .entry(temple_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(occupancy: i32) -> TempleEvent {
        TempleEvent::Status(StatusEvent {
            is_open: true,
            current_occupancy: occupancy,
            occupancy_percentage: occupancy,
            crowd_level: Density::Low,
            last_updated: Utc::now(),
            capacity: 100,
        })
    }

    #[tokio::test]
    async fn test_events_reach_only_the_temple_subscribers() {
        let hub = TempleBroadcaster::new(8);
        let mut first = hub.subscribe(1).await;
        let mut other = hub.subscribe(2).await;

        assert_eq!(hub.publish(1, status(42)).await, 1);
        match first.recv().await.unwrap() {
            TempleEvent::Status(s) => assert_eq!(s.current_occupancy, 42),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let hub = TempleBroadcaster::new(8);
        assert_eq!(hub.publish(3, status(1)).await, 0);
        assert_eq!(hub.channel_count().await, 0);
    }

    #[test]
    fn test_status_payload_is_camel_case() {
        let json = status(10).to_json().unwrap();
        assert!(json.contains("\"currentOccupancy\":10"));
        assert!(json.contains("\"crowdLevel\":\"low\""));
        assert_eq!(status(10).name(), "status");
    }
}
