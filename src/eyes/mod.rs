//! Eye-animation backends. The renderer is a capability: the rest of the
//! system only flips `SystemState` flags, and whichever backend is
//! selected polls those flags and draws.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strum::{Display, EnumString};

use crate::state::SystemState;

/// Which eye backend to run, selected via `EYE_MODEL` or `--eye-model`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EyeModel {
    /// No eyes at all (headless deployments).
    None,
    /// Text mood indicator, useful over SSH.
    Console,
}

/// What the eyes should convey right now, derived from the shared flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Idle,
    Listening,
    Speaking,
}

impl Mood {
    fn from_state(state: &SystemState) -> Self {
        if state.is_speaking() {
            Mood::Speaking
        } else if state.should_listen() {
            Mood::Listening
        } else {
            Mood::Idle
        }
    }
}

pub trait EyeRenderer: Send {
    /// Draw the given mood. Called only when the mood changes.
    fn render(&mut self, mood: Mood);
}

struct ConsoleEyes;

impl EyeRenderer for ConsoleEyes {
    fn render(&mut self, mood: Mood) {
        let face = match mood {
            Mood::Idle => "( - _ - )",
            Mood::Listening => "( o _ o )",
            Mood::Speaking => "( ^ o ^ )",
        };
        println!("{}", face);
    }
}

fn create(model: EyeModel) -> Option<Box<dyn EyeRenderer>> {
    match model {
        EyeModel::None => None,
        EyeModel::Console => Some(Box::new(ConsoleEyes)),
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Start the renderer thread for the selected backend, or return `None`
/// when eyes are disabled. The thread exits when the system shuts down.
pub fn spawn(model: EyeModel, state: Arc<SystemState>) -> Option<thread::JoinHandle<()>> {
    let mut renderer = create(model)?;
    log::info!("Eye renderer: {}", model);

    let handle = thread::Builder::new()
        .name("eyes".into())
        .spawn(move || {
            let mut last: Option<Mood> = None;
            while state.is_active() {
                let mood = Mood::from_state(&state);
                if last != Some(mood) {
                    renderer.render(mood);
                    last = Some(mood);
                }
                thread::sleep(POLL_INTERVAL);
            }
        })
        .ok()?;

    Some(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn model_parses_from_env_strings() {
        assert_eq!(EyeModel::from_str("none").unwrap(), EyeModel::None);
        assert_eq!(EyeModel::from_str("console").unwrap(), EyeModel::Console);
        assert!(EyeModel::from_str("oled").is_err());
    }

    #[test]
    fn mood_follows_state_flags() {
        let state = SystemState::new(false);
        assert_eq!(Mood::from_state(&state), Mood::Listening);

        state.set_speaking(true);
        assert_eq!(Mood::from_state(&state), Mood::Speaking);

        state.set_speaking(false);
        state.pause_listening();
        assert_eq!(Mood::from_state(&state), Mood::Idle);
    }

    #[test]
    fn disabled_model_spawns_nothing() {
        let state = Arc::new(SystemState::new(false));
        assert!(spawn(EyeModel::None, state).is_none());
    }
}
