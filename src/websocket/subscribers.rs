use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

pub const DEFAULT_MAX_SUBSCRIBERS: usize = 1000;

#[derive(Debug, Clone)]
pub struct SubscriberInfo {
    pub id: Uuid,
    pub peer_addr: String,
    pub connected_at: Instant,
}

#[derive(Clone)]
pub struct SubscriberRegistry {
    active: Arc<Mutex<HashMap<Uuid, SubscriberInfo>>>,
    max_subscribers: usize,
}

impl SubscriberRegistry {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            max_subscribers,
        }
    }

    pub fn try_acquire(&self, peer_addr: &str) -> Option<Uuid> {
        let mut active = self.active.lock();
        if active.len() >= self.max_subscribers {
            return None;
        }

        let id = Uuid::new_v4();
        active.insert(
            id,
            SubscriberInfo {
                id,
                peer_addr: peer_addr.to_string(),
                connected_at: Instant::now(),
            },
        );
        Some(id)
    }

    pub fn release(&self, id: &Uuid) -> Option<SubscriberInfo> {
        let released = self.active.lock().remove(id);
        if let Some(info) = &released {
            info!(
                "Released subscriber {} ({}) after {:?}",
                info.id,
                info.peer_addr,
                info.connected_at.elapsed()
            );
        }
        released
    }

    pub fn count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn max_subscribers(&self) -> usize {
        self.max_subscribers
    }
}
