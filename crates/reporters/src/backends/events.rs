use async_trait::async_trait;
use sentinel_errors::{ConfigError, TransportError};
use sentinel_events::{Event, EventClient, EventDefaults, SendOutcome};
use sentinel_registry::RegistrySnapshot;
use std::sync::Arc;
use tracing::debug;

use crate::{backend::ReportBackend, config::ReporterConfig};

/// Sends every instrument field as an event with `service = "alias field"`
/// through the shared [`EventClient`], one batch per report. The client belongs to the caller and
/// is not closed here.
pub struct EventsBackend {
    client: Arc<EventClient>,
    defaults: EventDefaults,
}

impl EventsBackend {
    pub const fn new(client: Arc<EventClient>, defaults: EventDefaults) -> Self {
        Self { client, defaults }
    }

    /// Options: `tags`, `ttl`, `state`, layered over the client's defaults.
    pub fn from_config(config: &ReporterConfig, client: Arc<EventClient>) -> Result<Self, ConfigError> {
        let mut defaults = client.defaults().clone();
        defaults.tags.extend(config.option_strings("tags")?);
        if let Some(ttl) = config.option_f32("ttl")? {
            defaults.ttl = Some(ttl);
        }
        if let Some(state) = config.option_str("state")? {
            defaults.state = Some(state);
        }
        Ok(Self::new(client, defaults))
    }

    pub const fn defaults(&self) -> &EventDefaults {
        &self.defaults
    }
}

fn outcome_error(outcome: SendOutcome, client: &EventClient) -> Option<TransportError> {
    match outcome {
        SendOutcome::Failed(e) => Some(e),
        SendOutcome::TimedOut => Some(TransportError::Timeout(client.ack_timeout())),
        SendOutcome::Acknowledged | SendOutcome::Buffered | SendOutcome::Disabled => None,
    }
}

#[async_trait]
impl ReportBackend for EventsBackend {
    fn name(&self) -> String {
        "events".to_string()
    }

    async fn report(&self, snapshot: &RegistrySnapshot) -> Result<(), TransportError> {
        let events: Vec<Event> = snapshot
            .flatten()
            .into_iter()
            .map(|(alias, field, value)| {
                Event::new()
                    .service(format!("{} {}", alias, field))
                    .metric(value)
            })
            .collect();
        let Some(outcome) = self.client.send_batch(&self.defaults, &events).await else {
            return Ok(());
        };
        debug!(events = events.len(), "reported metrics as events");
        outcome_error(outcome, &self.client).map_or(Ok(()), Err)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
