use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::utils::{epoch_seconds, local_host};

/// Service name used when neither the event nor the defaults carry one.
pub const NO_SERVICE: &str = "<none>";

/// A single point-in-time observation to push to the event-monitoring
/// service. Every field is optional; missing fields are filled from
/// [`EventDefaults`] when the event is sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub host: Option<String>,
    pub service: Option<String>,
    /// Seconds since the Unix epoch.
    pub time: Option<i64>,
    pub metric: Option<f64>,
    pub state: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
    /// Seconds the event stays valid.
    pub ttl: Option<f32>,
    pub description: Option<String>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub const fn time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    pub const fn metric(mut self, metric: f64) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub const fn ttl(mut self, ttl: f32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fills this event's gaps from `defaults`, leaving `self` untouched.
    ///
    /// Explicit event fields win. `tags` is the union of both sets and
    /// `attributes` are the defaults overridden key by key. When neither side
    /// has a value, `host` falls back to the local host name, `service` to
    /// [`NO_SERVICE`] and `time` to the current epoch second.
    pub fn merge(&self, defaults: &EventDefaults) -> WireEvent {
        let mut attributes = defaults.attributes.clone();
        attributes.extend(
            self.attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let tags = defaults.tags.union(&self.tags).cloned().collect();

        WireEvent {
            host: self
                .host
                .clone()
                .or_else(|| defaults.host.clone())
                .unwrap_or_else(|| local_host().to_string()),
            service: self
                .service
                .clone()
                .or_else(|| defaults.service.clone())
                .unwrap_or_else(|| NO_SERVICE.to_string()),
            time: self.time.unwrap_or_else(epoch_seconds),
            metric: self.metric,
            state: self.state.clone().or_else(|| defaults.state.clone()),
            attributes,
            tags,
            ttl: self.ttl.or(defaults.ttl),
            description: self.description.clone(),
        }
    }
}

/// Fallback values merged into every outbound [`Event`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDefaults {
    pub host: Option<String>,
    pub service: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
    pub ttl: Option<f32>,
    pub state: Option<String>,
}

/// A fully resolved event, as transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub host: String,
    pub service: String,
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metric: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ttl: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}
