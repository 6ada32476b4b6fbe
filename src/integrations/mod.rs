use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::domain::{Membership, MembershipRequest, Payment};
use crate::error::Result;

pub mod inbox;

/// Lifecycle facts published after the owning transaction has committed.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    RequestSubmitted(MembershipRequest),
    RequestApproved { request: MembershipRequest, payment: Payment },
    RequestRejected(MembershipRequest),
    MembershipActivated { membership: Membership, payment: Payment },
    PaymentFailed { account_id: uuid::Uuid, payment: Payment },
}

#[async_trait]
pub trait Integration: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn handle_event(&self, event: &LifecycleEvent) -> Result<()>;
}

pub struct IntegrationManager {
    integrations: RwLock<Vec<Arc<dyn Integration>>>,
}

impl IntegrationManager {
    pub fn new() -> Self {
        Self {
            integrations: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, integration: Arc<dyn Integration>) {
        if integration.is_enabled() {
            tracing::info!("Registered integration: {}", integration.name());
            self.integrations.write().await.push(integration);
        }
    }

    /// Delivers the event to every integration. Failures are logged and never
    /// reach the caller: the state change that produced the event is already
    /// committed.
    pub async fn handle_event(&self, event: LifecycleEvent) {
        let integrations = self.integrations.read().await;

        for integration in integrations.iter() {
            if !integration.is_enabled() {
                continue;
            }

            match integration.handle_event(&event).await {
                Ok(_) => {
                    tracing::debug!(
                        "Integration {} handled event successfully",
                        integration.name()
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Integration {} failed to handle event: {:?}",
                        integration.name(),
                        e
                    );
                }
            }
        }
    }
}

impl Default for IntegrationManager {
    fn default() -> Self {
        Self::new()
    }
}
