//! Timers, the host event feed and teardown.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::TabGroups;
use crate::host::HostEvent;

/// Background tasks of a started [`TabGroups`]. Dropping it stops them
/// without the final save; call [`Runtime::shutdown`] for an orderly stop.
pub struct Runtime {
    groups: TabGroups,
    tasks: Vec<JoinHandle<()>>,
}

impl TabGroups {
    /// Bring the coordinator up. Must be called inside a tokio runtime.
    ///
    /// Clears leftovers from an earlier picker session, discovers the current
    /// tree, and schedules the saved-record restore, a second reconciliation
    /// and the periodic color save.
    pub fn start(&self) -> Runtime {
        let settings = self.settings().clone();
        self.theme_bridge()
            .reset(self.inner.theme_picker.as_deref());

        let report = self.reconcile();
        tracing::info!(
            "Tab groups started with {} groups ({} storage)",
            report.initialized.len(),
            self.store().backend_kind().as_str()
        );

        let mut tasks = Vec::new();

        let groups = self.clone();
        let delay = settings.restore_delay();
        tasks.push(tokio::spawn(async move {
            time::sleep(delay).await;
            groups.restore_saved();
        }));

        let groups = self.clone();
        let delay = settings.reconcile_delay();
        tasks.push(tokio::spawn(async move {
            time::sleep(delay).await;
            groups.reconcile();
        }));

        let groups = self.clone();
        let period = settings.sweep_interval();
        tasks.push(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let saved = groups.sweep_colors();
                tracing::debug!("Periodic save stored {} group colors", saved);
                groups.collect_garbage();
            }
        }));

        Runtime {
            groups: self.clone(),
            tasks,
        }
    }
}

impl Runtime {
    pub fn groups(&self) -> &TabGroups {
        &self.groups
    }

    /// Feed host notifications to the coordinator until the sender closes.
    pub fn attach_events(&mut self, mut events: mpsc::UnboundedReceiver<HostEvent>) {
        let groups = self.groups.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                tracing::trace!("Host event {:?}", event);
                groups.handle_event(event);
            }
            tracing::debug!("Host event feed closed");
        }));
    }

    /// Stop timers, release the picker and rename session, and save colors
    /// one last time. Returns how many colors the final save stored.
    pub fn shutdown(mut self) -> usize {
        self.stop();
        let groups = &self.groups;
        groups.abort_color_jobs();
        groups
            .theme_bridge()
            .reset(groups.inner.theme_picker.as_deref());
        groups.rename_session().reset(groups.host().as_ref());
        groups.close_context_menu();

        let saved = groups.sweep_colors();
        tracing::info!("Tab groups stopped, saved {} group colors", saved);
        saved
    }

    fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}
