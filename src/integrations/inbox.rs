//! In-process notification inbox. Owned by the service context and created
//! at start-up; contents do not survive a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::Result,
    integrations::{Integration, LifecycleEvent},
};

const MAX_PER_ACCOUNT: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

pub struct InboxIntegration {
    inboxes: RwLock<HashMap<Uuid, Vec<Notification>>>,
}

impl InboxIntegration {
    pub fn new() -> Self {
        Self {
            inboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Newest first.
    pub async fn list(&self, account_id: Uuid) -> Vec<Notification> {
        let inboxes = self.inboxes.read().await;
        inboxes
            .get(&account_id)
            .map(|items| items.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    async fn push(&self, account_id: Uuid, title: &str, body: String) {
        let mut inboxes = self.inboxes.write().await;
        let inbox = inboxes.entry(account_id).or_default();
        inbox.push(Notification {
            id: Uuid::new_v4(),
            title: title.to_string(),
            body,
            created_at: Utc::now(),
        });
        if inbox.len() > MAX_PER_ACCOUNT {
            let overflow = inbox.len() - MAX_PER_ACCOUNT;
            inbox.drain(..overflow);
        }
    }
}

impl Default for InboxIntegration {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Integration for InboxIntegration {
    fn name(&self) -> &str {
        "Inbox"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn handle_event(&self, event: &LifecycleEvent) -> Result<()> {
        match event {
            LifecycleEvent::RequestSubmitted(_) => {}
            LifecycleEvent::RequestApproved { request, payment } => {
                self.push(
                    request.account_id,
                    "Membership request approved",
                    format!("Please pay {} to complete order {}.", payment.amount, payment.order_code),
                )
                .await;
            }
            LifecycleEvent::RequestRejected(request) => {
                self.push(
                    request.account_id,
                    "Membership request declined",
                    request.note.clone().unwrap_or_default(),
                )
                .await;
            }
            LifecycleEvent::MembershipActivated { membership, payment } => {
                self.push(
                    membership.account_id,
                    "Welcome to the club",
                    format!("Payment for order {} received. Your membership is active.", payment.order_code),
                )
                .await;
            }
            LifecycleEvent::PaymentFailed { account_id, payment } => {
                self.push(
                    *account_id,
                    "Payment not completed",
                    format!("Order {} was not paid. You can try again from your memberships.", payment.order_code),
                )
                .await;
            }
        }

        Ok(())
    }
}
