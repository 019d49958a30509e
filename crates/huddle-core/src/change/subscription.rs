use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::topic::TopicKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    Closed,
}

/// One live push subscription.
///
/// Handed out by the change stream client and owned by the subscription
/// lifecycle manager; nothing else opens or closes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSubscription {
    pub id: Uuid,
    pub topic: TopicKey,
    pub status: SubscriptionStatus,
}

impl ChangeSubscription {
    pub fn new(topic: TopicKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            status: SubscriptionStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}
