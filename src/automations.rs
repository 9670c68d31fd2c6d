//! Environment automations: background behaviors advanced once per tick.
//!
//! Automations are to the actor what reflexes are to a player: they react to
//! world state without going through the conversation loop. The catalog is
//! environment-specific; the core only defines the per-tick contract.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::world::WorldLink;

/// Snapshot handed to automations on every tick.
pub struct AutomationContext {
    /// False while a turn cycle is in flight; automations that act on the
    /// actor's behalf should wait for idle.
    pub idle: bool,
    pub world: Arc<dyn WorldLink>,
}

#[async_trait]
pub trait Automation: Send + Sync {
    fn name(&self) -> &str;

    /// Advance by `delta`, the time since the previous tick started.
    async fn update(&self, ctx: &AutomationContext, delta: Duration) -> Result<()>;
}

/// The automations installed on an actor, advanced together each tick.
/// A failing automation is its own problem: the error is logged and the
/// tick continues.
pub struct AutomationSet {
    automations: Vec<Arc<dyn Automation>>,
}

impl AutomationSet {
    pub fn new(automations: Vec<Arc<dyn Automation>>) -> Self {
        for automation in &automations {
            tracing::debug!("Installed automation: {}", automation.name());
        }
        Self { automations }
    }

    pub fn empty() -> Self {
        Self {
            automations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.automations.is_empty()
    }

    pub async fn update(&self, ctx: &AutomationContext, delta: Duration) {
        for automation in &self.automations {
            if let Err(e) = automation.update(ctx, delta).await {
                tracing::warn!("Automation '{}' failed: {}", automation.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullWorld;

    #[async_trait]
    impl WorldLink for NullWorld {
        async fn say(&self, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    struct Counting {
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl Automation for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn update(&self, _ctx: &AutomationContext, _delta: Duration) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Automation for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }

        async fn update(&self, _ctx: &AutomationContext, _delta: Duration) -> Result<()> {
            anyhow::bail!("broken")
        }
    }

    fn ctx() -> AutomationContext {
        AutomationContext {
            idle: true,
            world: Arc::new(NullWorld),
        }
    }

    #[tokio::test]
    async fn every_automation_runs_each_tick() {
        let counting = Arc::new(Counting {
            ticks: AtomicUsize::new(0),
        });
        let set = AutomationSet::new(vec![counting.clone() as Arc<dyn Automation>]);

        set.update(&ctx(), Duration::from_millis(300)).await;
        set.update(&ctx(), Duration::from_millis(300)).await;
        assert_eq!(counting.ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_failing_automation_does_not_stop_the_others() {
        let counting = Arc::new(Counting {
            ticks: AtomicUsize::new(0),
        });
        let set = AutomationSet::new(vec![
            Arc::new(AlwaysFails) as Arc<dyn Automation>,
            counting.clone() as Arc<dyn Automation>,
        ]);

        set.update(&ctx(), Duration::from_millis(300)).await;
        assert_eq!(counting.ticks.load(Ordering::SeqCst), 1);
    }
}
