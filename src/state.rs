use std::sync::Mutex;

use crate::playback::PlaybackControl;

#[derive(Debug)]
struct Flags {
    is_listening: bool,
    is_active: bool,
    is_speaking: bool,
    /// The barge-in gate: true only while the conversation loop is busy
    /// with AI dispatch or speech playback and the interruption listener
    /// may own the microphone.
    allow_listening_to_user: bool,
}

/// Thread-safe system state shared by the conversation loop and the
/// interruption listener. Every field lives behind one mutex; there are
/// no lock-free reads.
pub struct SystemState {
    flags: Mutex<Flags>,
    /// Whether barge-in is enabled at all for this process. Fixed at
    /// startup; `resume_interruption` is a no-op when false.
    interruption_enabled: bool,
}

impl SystemState {
    pub fn new(interruption_enabled: bool) -> Self {
        Self {
            flags: Mutex::new(Flags {
                is_listening: true,
                is_active: true,
                is_speaking: false,
                allow_listening_to_user: false,
            }),
            interruption_enabled,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Flags> {
        // A poisoned state mutex means a holder panicked; the flags are
        // plain booleans, so the data is still usable.
        self.flags.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pause_listening(&self) {
        self.lock().is_listening = false;
    }

    pub fn resume_listening(&self) {
        self.lock().is_listening = true;
    }

    pub fn should_listen(&self) -> bool {
        let flags = self.lock();
        flags.is_listening && flags.is_active
    }

    /// Close the gate: the conversation loop is about to own the
    /// microphone for a primary capture.
    pub fn pause_interruption(&self) {
        self.lock().allow_listening_to_user = false;
    }

    /// Open the gate for the barge-in listener (if enabled at startup).
    pub fn resume_interruption(&self) {
        self.lock().allow_listening_to_user = self.interruption_enabled;
    }

    pub fn barge_in_allowed(&self) -> bool {
        self.lock().allow_listening_to_user
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.lock().is_speaking = speaking;
    }

    pub fn is_speaking(&self) -> bool {
        self.lock().is_speaking
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_active
    }

    /// Terminal signal: unwinds every loop and triggers cleanup.
    pub fn shutdown(&self) {
        self.lock().is_active = false;
    }

    /// Global interrupt sequence: cancel in-flight playback, discard
    /// queued clips, reset to listening. Safe to call when nothing is
    /// playing; never blocks waiting for audible silence.
    pub fn interrupt(&self, playback: &dyn PlaybackControl) {
        let mut flags = self.lock();
        log::warn!("INTERRUPT: stopping playback, discarding queued work");
        playback.cancel_current();
        playback.flush_pending();
        flags.is_speaking = false;
        flags.is_listening = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct CountingPlayback {
        cancels: AtomicUsize,
        flushes: AtomicUsize,
    }

    impl PlaybackControl for CountingPlayback {
        fn cancel_current(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
        fn flush_pending(&self) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn interrupt_is_idempotent_when_idle() {
        let state = SystemState::new(true);
        let playback = CountingPlayback::default();

        // Nothing speaking, nothing queued: must not panic, and must
        // leave the state listening.
        state.interrupt(&playback);
        state.interrupt(&playback);

        assert!(!state.is_speaking());
        assert!(state.should_listen());
        assert_eq!(playback.cancels.load(Ordering::SeqCst), 2);
        assert_eq!(playback.flushes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn interrupt_resets_speaking_state() {
        let state = SystemState::new(true);
        let playback = CountingPlayback::default();

        state.set_speaking(true);
        state.pause_listening();
        state.interrupt(&playback);

        assert!(!state.is_speaking());
        assert!(state.should_listen());
    }

    #[test]
    fn gate_respects_startup_flag() {
        let disabled = SystemState::new(false);
        disabled.resume_interruption();
        assert!(!disabled.barge_in_allowed());

        let enabled = SystemState::new(true);
        enabled.resume_interruption();
        assert!(enabled.barge_in_allowed());
        enabled.pause_interruption();
        assert!(!enabled.barge_in_allowed());
    }

    #[test]
    fn concurrent_gate_flips_never_tear() {
        let state = Arc::new(SystemState::new(true));

        let writers: Vec<_> = (0..2)
            .map(|i| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        if i == 0 {
                            state.resume_interruption();
                        } else {
                            state.pause_interruption();
                        }
                    }
                })
            })
            .collect();

        // Reader races the writers; every observed value must be a plain
        // boolean some writer stored (the lock makes torn reads
        // impossible, this exercises it under contention).
        let reader = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let _ = state.barge_in_allowed();
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        // Still consistent after the storm.
        state.resume_interruption();
        assert!(state.barge_in_allowed());
    }
}
