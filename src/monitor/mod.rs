//! Monitor module: one independent check loop per target.

mod client;
mod history;
mod notify;
mod report;

pub use client::*;
pub use history::*;
pub use notify::*;
pub use report::*;

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::TargetConfig;
use crate::probe::ProbeError;

/// Every monitor client started by the process.
pub struct MonitorRegistry {
    clients: Vec<Arc<MonitorClient>>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorRegistry {
    /// Build a client per target and start each loop on its own task.
    ///
    /// All clients are built before any loop starts, so a bad target stops
    /// startup without leaving half the targets running.
    pub fn start(
        targets: Vec<TargetConfig>,
        history_capacity: usize,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ProbeError> {
        let clients = targets
            .into_iter()
            .map(|target| MonitorClient::new(target, history_capacity, notifier.clone()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::spawn(clients))
    }

    fn spawn(clients: Vec<Arc<MonitorClient>>) -> Self {
        tracing::info!("Starting monitor with {} targets", clients.len());

        let tasks = clients
            .iter()
            .map(|client| {
                tracing::info!(
                    "Monitor: Adding target {} ({} every {:?})",
                    client.name(),
                    client.config().url,
                    client.config().interval
                );
                tokio::spawn(client.clone().run())
            })
            .collect();

        Self { clients, tasks }
    }

    pub fn clients(&self) -> &[Arc<MonitorClient>] {
        &self.clients
    }

    pub fn get(&self, name: &str) -> Option<&Arc<MonitorClient>> {
        self.clients.iter().find(|c| c.name() == name)
    }

    /// Stop every check loop.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!("Monitor stopped");
    }
}
