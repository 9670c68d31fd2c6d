//! Autonomous self-prompting. While a session is active the actor feeds its
//! standing goal back to itself as a synthetic message, spaced by the
//! background tick cadence, so it keeps acting without new external input.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::interrupt::InterruptGate;
use super::AgentEvent;
use crate::world::WorldLink;

#[derive(Debug)]
struct Session {
    prompt: String,
    cooldown: Duration,
    cycle_in_flight: bool,
    awaiting_foreground: bool,
}

/// At most one session per actor. The stop-request flag lives in the
/// interrupt gate; only `start` clears it.
pub struct SelfPrompter {
    gate: Arc<InterruptGate>,
    world: Arc<dyn WorldLink>,
    event_tx: flume::Sender<AgentEvent>,
    cooldown: Duration,
    session: Mutex<Option<Session>>,
}

impl SelfPrompter {
    pub fn new(
        gate: Arc<InterruptGate>,
        world: Arc<dyn WorldLink>,
        event_tx: flume::Sender<AgentEvent>,
        cooldown: Duration,
    ) -> Self {
        Self {
            gate,
            world,
            event_tx,
            cooldown,
            session: Mutex::new(None),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.lock_session().is_some()
    }

    /// Activate with `prompt` as the standing goal. Clears any residual stop
    /// request; the zero initial cooldown makes the next tick fire a cycle
    /// immediately.
    pub fn start(&self, prompt: &str) {
        self.gate.clear_self_prompt_stop();
        *self.lock_session() = Some(Session {
            prompt: prompt.to_string(),
            cooldown: Duration::ZERO,
            cycle_in_flight: false,
            awaiting_foreground: false,
        });
        tracing::info!("Self-prompting started: {}", prompt);
        let _ = self.event_tx.send(AgentEvent::SelfPromptStarted {
            prompt: prompt.to_string(),
        });
    }

    /// Deactivate, flagging any in-flight cycle to stop at its next turn
    /// boundary rather than waiting for it to finish.
    pub async fn stop(&self, announce: bool) {
        self.gate.request_self_prompt_stop();
        let had_session = self.lock_session().take().is_some();
        if !had_session {
            return;
        }

        tracing::info!("Self-prompting stopped");
        let _ = self.event_tx.send(AgentEvent::SelfPromptStopped);
        if announce {
            if let Err(e) = self.world.say("Self-prompting stopped.").await {
                tracing::warn!("Failed to announce self-prompt stop: {}", e);
            }
        }
    }

    /// Tick-driven cadence. Counts the cooldown down by `delta` and, when it
    /// expires, marks a cycle in flight and returns the synthetic message to
    /// route through the turn controller.
    pub fn poll_due(&self, delta: Duration) -> Option<String> {
        if self.gate.should_interrupt(true) {
            return None;
        }

        let mut session = self.lock_session();
        let session = session.as_mut()?;
        if session.cycle_in_flight || session.awaiting_foreground {
            return None;
        }

        session.cooldown = session.cooldown.saturating_sub(delta);
        if !session.cooldown.is_zero() {
            return None;
        }

        session.cycle_in_flight = true;
        Some(session.prompt.clone())
    }

    /// Called by the spawned cycle task once its turn cycle returns.
    pub fn cycle_finished(&self, used_directive: bool) {
        if !used_directive {
            tracing::debug!("Self-prompt cycle produced no directive");
        }
        let mut session = self.lock_session();
        if let Some(session) = session.as_mut() {
            session.cycle_in_flight = false;
            session.cooldown = self.cooldown;
        }
    }

    /// A turn cycle is about to execute a directive. A user-prompted action
    /// pauses the cadence until that cycle finishes instead of racing it.
    pub fn on_foreground_directive(&self, self_prompt: bool, is_action: bool) {
        if self_prompt || !is_action {
            return;
        }
        let mut session = self.lock_session();
        if let Some(session) = session.as_mut() {
            session.awaiting_foreground = true;
        }
    }

    /// The foreground turn cycle is over; resume the cadence.
    pub fn on_turn_cycle_finished(&self) {
        let mut session = self.lock_session();
        if let Some(session) = session.as_mut() {
            session.awaiting_foreground = false;
        }
    }
}
