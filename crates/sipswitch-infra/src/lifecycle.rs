//! The component lifecycle every long-running subsystem (transport
//! listeners, transaction sweeper, registrar sweeper, session sweeper)
//! implements, so the server binary can bring them all up and tear them
//! all down uniformly (spec §5 "Graceful shutdown").
//!
//! Grounded on `infra-common::lifecycle::component::{Component,
//! ComponentState}`, narrowed to what a single-process server needs: no
//! pause/resume or dependency graph, just init → start → stop → shutdown
//! in registration order, reversed on the way down.

use async_trait::async_trait;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Created,
    Initialized,
    Running,
    Stopped,
    ShutDown,
}

/// One independently-startable/stoppable piece of the server (a bound
/// listener, a sweeper task, ...).
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    async fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn start(&mut self) -> Result<(), Error>;

    async fn stop(&mut self) -> Result<(), Error>;

    async fn shutdown(&mut self) -> Result<(), Error> {
        self.stop().await
    }
}

/// Drives a fixed set of components through their lifecycle in
/// registration order on the way up, and the reverse order on the way
/// down — so a component started last (and therefore most likely to
/// depend on an earlier one) is also stopped first.
pub struct LifecycleManager {
    components: Vec<Box<dyn Component>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        LifecycleManager { components: Vec::new() }
    }

    pub fn register(&mut self, component: Box<dyn Component>) {
        self.components.push(component);
    }

    pub async fn start_all(&mut self) -> Result<(), Error> {
        for component in &mut self.components {
            component.init().await?;
            component.start().await?;
            tracing::info!(component = component.name(), "component started");
        }
        Ok(())
    }

    pub async fn shutdown_all(&mut self) {
        for component in self.components.iter_mut().rev() {
            if let Err(e) = component.shutdown().await {
                tracing::warn!(component = component.name(), error = %e, "component shutdown failed");
            } else {
                tracing::info!(component = component.name(), "component shut down");
            }
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Component for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&mut self) -> Result<(), Error> {
            self.order.lock().unwrap().push(self.name);
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), Error> {
            self.order.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    #[tokio::test]
    async fn shuts_down_in_reverse_of_start_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = LifecycleManager::new();
        manager.register(Box::new(Recorder { name: "transport", order: order.clone() }));
        manager.register(Box::new(Recorder { name: "registrar", order: order.clone() }));

        manager.start_all().await.unwrap();
        {
            let recorded = order.lock().unwrap();
            assert_eq!(&*recorded, &["transport", "registrar"]);
        }
        order.lock().unwrap().clear();

        manager.shutdown_all().await;
        let recorded = order.lock().unwrap();
        assert_eq!(&*recorded, &["registrar", "transport"]);
    }
}
