use std::fmt;

/// Which effect the render loop applies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    Passthrough,
    Blur,
    Substitute,
}

impl Mode {
    /// Whether frames in this mode need a segmentation
    pub fn needs_segmentation(self) -> bool {
        !matches!(self, Mode::Passthrough)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Passthrough => f.write_str("passthrough"),
            Mode::Blur => f.write_str("blur"),
            Mode::Substitute => f.write_str("substitute"),
        }
    }
}

/// Blur and substitute toggles that are never on together
///
/// Turning one on while the other is on turns the other off.
/// Passthrough is what remains when both are off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeState {
    mode: Mode,
}

impl ModeState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn blur(&self) -> bool {
        self.mode == Mode::Blur
    }

    pub fn substitute(&self) -> bool {
        self.mode == Mode::Substitute
    }

    pub fn set_blur(&mut self, on: bool) {
        self.toggle(Mode::Blur, on);
    }

    pub fn set_substitute(&mut self, on: bool) {
        self.toggle(Mode::Substitute, on);
    }

    fn toggle(&mut self, mode: Mode, on: bool) {
        if on {
            if self.mode != mode && self.mode != Mode::Passthrough {
                tracing::debug!("Enabling {} turns off {}", mode, self.mode);
            }
            self.mode = mode;
        } else if self.mode == mode {
            self.mode = Mode::Passthrough;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_passthrough() {
        let state = ModeState::default();
        assert_eq!(state.mode(), Mode::Passthrough);
        assert!(!state.blur() && !state.substitute());
    }

    #[test]
    fn blur_turns_off_substitute() {
        let mut state = ModeState::default();
        state.set_substitute(true);
        state.set_blur(true);
        assert!(state.blur());
        assert!(!state.substitute());
    }

    #[test]
    fn substitute_turns_off_blur() {
        let mut state = ModeState::default();
        state.set_blur(true);
        state.set_substitute(true);
        assert!(state.substitute());
        assert!(!state.blur());
    }

    #[test]
    fn turning_off_inactive_toggle_is_noop() {
        let mut state = ModeState::default();
        state.set_blur(true);
        state.set_substitute(false);
        assert_eq!(state.mode(), Mode::Blur);

        state.set_blur(false);
        assert_eq!(state.mode(), Mode::Passthrough);
    }
}
