use crate::chatwoot::MessagingApi;
use crate::chatwoot_types::{Agent, AvailabilityStatus};
use crate::error::{handle_error, AppError};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
#[error("no agent came online after {attempts} attempts")]
pub struct NoAgentAvailable {
    pub attempts: u32,
}

/// Finds the inbox inbound calls land in and an online agent to take them.
#[derive(Clone)]
pub struct AgentLocator {
    messaging: Arc<dyn MessagingApi>,
    max_attempts: u32,
    poll_interval: Duration,
}

impl AgentLocator {
    pub fn new(messaging: Arc<dyn MessagingApi>, max_attempts: u32, poll_interval: Duration) -> Self {
        Self {
            messaging,
            max_attempts,
            poll_interval,
        }
    }

    /// The first inbox of the account receives phone calls.
    pub async fn find_inbox(&self) -> Result<u64, AppError> {
        self.messaging
            .list_inboxes()
            .await?
            .first()
            .map(|inbox| inbox.id)
            .ok_or_else(|| AppError::NotFound("chatwoot inbox".to_string()))
    }

    /// First agent of the inbox whose status is online. Lookup failures count as "nobody".
    pub async fn find_available_agent(&self, inbox_id: u64) -> Option<Agent> {
        match self.messaging.list_inbox_agents(inbox_id).await {
            Ok(agents) => agents
                .into_iter()
                .find(|agent| agent.availability_status == AvailabilityStatus::Online),
            Err(e) => {
                handle_error("failed to list inbox agents", e);
                None
            }
        }
    }

    /// Poll for an online agent up to `max_attempts` times. `on_busy` runs after every failed
    /// attempt so the caller hears a hold message before the next poll.
    pub async fn wait_for_agent<F>(
        &self,
        customer_number: &str,
        inbox_id: u64,
        mut on_busy: F,
    ) -> Result<Agent, NoAgentAvailable>
    where
        F: FnMut(u32) + Send,
    {
        for attempt in 1..=self.max_attempts {
            if let Some(agent) = self.find_available_agent(inbox_id).await {
                info!(customer_number, attempt, agent_id = agent.id, "agent became available");
                return Ok(agent);
            }
            debug!(customer_number, attempt, "no agent online yet");
            on_busy(attempt);
            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Err(NoAgentAvailable {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMessaging;

    fn locator(messaging: Arc<FakeMessaging>) -> AgentLocator {
        AgentLocator::new(messaging, 3, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn picks_first_online_agent() {
        let messaging = Arc::new(FakeMessaging::default());
        messaging.set_agents(vec![
            FakeMessaging::agent(1, "Busy Bea", "busy"),
            FakeMessaging::agent(2, "Ana", "online"),
            FakeMessaging::agent(3, "Otto", "online"),
        ]);
        let agent = locator(messaging).find_available_agent(1).await.unwrap();
        assert_eq!(agent.id, 2);
    }

    #[tokio::test]
    async fn missing_inbox_is_not_found() {
        let messaging = Arc::new(FakeMessaging::default());
        messaging.set_inboxes(vec![]);
        let err = locator(messaging).find_inbox().await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_with_a_hold_message_each_time() {
        let messaging = Arc::new(FakeMessaging::default());
        messaging.set_agents(vec![FakeMessaging::agent(1, "Bea", "offline")]);
        let locator = locator(messaging.clone());

        let started = tokio::time::Instant::now();
        let mut holds = Vec::new();
        let err = locator
            .wait_for_agent("+15550001", 1, |attempt| holds.push(attempt))
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(holds, vec![1, 2, 3]);
        assert_eq!(messaging.agent_lookups(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_polling_once_an_agent_is_online() {
        let messaging = Arc::new(FakeMessaging::default());
        messaging.set_agents(vec![FakeMessaging::agent(1, "Bea", "offline")]);
        messaging.agents_online_after(2);
        let locator = locator(messaging.clone());

        let mut holds = 0;
        let agent = locator
            .wait_for_agent("+15550001", 1, |_| holds += 1)
            .await
            .unwrap();

        assert_eq!(agent.id, 1);
        assert_eq!(holds, 1);
        assert_eq!(messaging.agent_lookups(), 2);
    }
}
