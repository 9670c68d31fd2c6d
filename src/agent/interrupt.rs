//! Cooperative cancellation shared by the foreground turn loop and the
//! background self-prompt cycle. There is no queue or lock serializing the
//! two paths; every loop body checks the gate at each turn boundary instead.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct InterruptGate {
    muted: AtomicBool,
    self_prompt_stop: AtomicBool,
}

impl InterruptGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Silence the actor regardless of what triggered the current cycle.
    /// Stays set until a new inbound message cycle clears it.
    pub fn mute(&self) {
        self.muted.store(true, Ordering::SeqCst);
    }

    /// A fresh inbound message always gets a chance to be answered.
    pub fn clear_mute(&self) {
        self.muted.store(false, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Halt self-initiated cycles at their next turn boundary. Does not touch
    /// an in-flight user-triggered reply.
    pub fn request_self_prompt_stop(&self) {
        self.self_prompt_stop.store(true, Ordering::SeqCst);
    }

    /// Cleared only when a new self-prompt session starts.
    pub fn clear_self_prompt_stop(&self) {
        self.self_prompt_stop.store(false, Ordering::SeqCst);
    }

    pub fn self_prompt_stop_requested(&self) -> bool {
        self.self_prompt_stop.load(Ordering::SeqCst)
    }

    /// Checked at every turn boundary.
    pub fn should_interrupt(&self, self_prompt: bool) -> bool {
        self.is_muted() || (self_prompt && self.self_prompt_stop_requested())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_interrupts_every_trigger_source() {
        let gate = InterruptGate::new();
        assert!(!gate.should_interrupt(false));
        assert!(!gate.should_interrupt(true));

        gate.mute();
        assert!(gate.should_interrupt(false));
        assert!(gate.should_interrupt(true));

        gate.clear_mute();
        assert!(!gate.should_interrupt(false));
    }

    #[test]
    fn self_prompt_stop_only_halts_self_prompt_cycles() {
        let gate = InterruptGate::new();
        gate.request_self_prompt_stop();

        assert!(gate.should_interrupt(true));
        assert!(!gate.should_interrupt(false));
    }

    #[test]
    fn clearing_mute_leaves_self_prompt_stop_set() {
        let gate = InterruptGate::new();
        gate.mute();
        gate.request_self_prompt_stop();

        gate.clear_mute();
        assert!(gate.self_prompt_stop_requested());
        assert!(gate.should_interrupt(true));
        assert!(!gate.should_interrupt(false));

        gate.clear_self_prompt_stop();
        assert!(!gate.should_interrupt(true));
    }
}
