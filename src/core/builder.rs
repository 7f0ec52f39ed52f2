use std::sync::Arc;

use crate::{
    core::{MetaRunner, RunnerConfig},
    error::RunnerError,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`MetaRunner`] with optional features.
pub struct MetaRunnerBuilder {
    cfg: RunnerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl MetaRunnerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: RunnerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (payload lifecycle, anomalies, etc.)
    /// through dedicated worker threads with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the meta runner.
    ///
    /// Spawns one worker thread per subscriber; without subscribers the event
    /// bus is silent and nothing is spawned.
    ///
    /// ### Errors
    /// [`RunnerError::Spawn`] if a subscriber worker thread cannot be started.
    pub fn build(self) -> Result<MetaRunner, RunnerError> {
        let bus = if self.subscribers.is_empty() {
            Bus::silent()
        } else {
            Bus::new(SubscriberSet::new(self.subscribers, &self.cfg)?)
        };
        Ok(MetaRunner::from_parts(self.cfg, bus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;

    struct Quiet;

    impl Subscribe for Quiet {
        fn on_event(&self, _event: &Event) {}
    }

    #[test]
    fn subscribers_make_the_bus_audible() {
        let meta = MetaRunnerBuilder::new(RunnerConfig::default())
            .with_subscribers(vec![Arc::new(Quiet)])
            .build()
            .unwrap();
        assert!(!format!("{meta:?}").is_empty());

        let meta = MetaRunnerBuilder::new(RunnerConfig::default()).build().unwrap();
        assert!(meta.flavours().is_empty());
    }
}
