//! [`RemoteControl`] – edge-triggered key-to-motor-command state machine.
//!
//! The held [`KeySet`] is resolved to a [`MotorState`] through
//! [`RESOLUTION_TABLE`], evaluated top to bottom:
//!
//! | Held keys | State |
//! |---|---|
//! | exactly {up, left} | [`MotorState::DriveLeft`] |
//! | exactly {up, right} | [`MotorState::DriveRight`] |
//! | exactly {up} | [`MotorState::DriveForward`] |
//! | exactly {down} | [`MotorState::DriveBackward`] |
//! | exactly {left} | [`MotorState::RotateLeft`] |
//! | exactly {right} | [`MotorState::RotateRight`] |
//! | anything else | [`MotorState::Halt`] |
//!
//! A `command` is transmitted only when the resolved state differs from the
//! current one, so key auto-repeat produces no extra traffic. The new state is
//! recorded whether or not the transmission succeeds.

use teleop_link::{Link, Transport};
use teleop_types::{LinkError, MotorState};
use tracing::{debug, info, warn};

use crate::keys::{Key, KeySet};

/// Destination for motor commands.
pub trait CommandSink {
    fn send_command(&mut self, state: MotorState) -> Result<(), LinkError>;
}

impl<T: Transport> CommandSink for Link<T> {
    fn send_command(&mut self, state: MotorState) -> Result<(), LinkError> {
        self.transmit_command(state)
    }
}

/// Predicate over the held keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern {
    /// Matches when the held set equals this set.
    Exactly(KeySet),
    /// Always matches.
    Any,
}

impl KeyPattern {
    pub fn matches(self, keys: KeySet) -> bool {
        match self {
            KeyPattern::Exactly(set) => set == keys,
            KeyPattern::Any => true,
        }
    }
}

/// Priority-ordered resolution rules; the first match wins.
pub const RESOLUTION_TABLE: [(KeyPattern, MotorState); 7] = [
    (KeyPattern::Exactly(KeySet::of(&[Key::Up, Key::Left])), MotorState::DriveLeft),
    (KeyPattern::Exactly(KeySet::of(&[Key::Up, Key::Right])), MotorState::DriveRight),
    (KeyPattern::Exactly(KeySet::of(&[Key::Up])), MotorState::DriveForward),
    (KeyPattern::Exactly(KeySet::of(&[Key::Down])), MotorState::DriveBackward),
    (KeyPattern::Exactly(KeySet::of(&[Key::Left])), MotorState::RotateLeft),
    (KeyPattern::Exactly(KeySet::of(&[Key::Right])), MotorState::RotateRight),
    (KeyPattern::Any, MotorState::Halt),
];

/// Resolve the held keys to a motor state.
pub fn resolve(keys: KeySet) -> MotorState {
    RESOLUTION_TABLE
        .iter()
        .find(|(pattern, _)| pattern.matches(keys))
        .map_or(MotorState::Halt, |(_, state)| *state)
}

/// A state change produced by a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: MotorState,
    pub to: MotorState,
    /// Whether the command reached the sink.
    pub sent: bool,
}

/// Tracks held keys and the active motor state.
#[derive(Debug, Clone)]
pub struct RemoteControl {
    keys: KeySet,
    state: MotorState,
    remote: bool,
}

impl Default for RemoteControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteControl {
    /// Start halted with no keys held and transmission enabled.
    pub fn new() -> Self {
        Self {
            keys: KeySet::EMPTY,
            state: MotorState::Halt,
            remote: true,
        }
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn keys(&self) -> KeySet {
        self.keys
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Enable or disable transmission. While disabled, transitions are still
    /// tracked but nothing is sent.
    pub fn set_remote(&mut self, remote: bool) {
        self.remote = remote;
    }

    pub fn key_down<S: CommandSink + ?Sized>(&mut self, key: Key, sink: &mut S) -> Option<Transition> {
        self.keys.insert(key);
        self.update(sink)
    }

    pub fn key_up<S: CommandSink + ?Sized>(&mut self, key: Key, sink: &mut S) -> Option<Transition> {
        self.keys.remove(key);
        self.update(sink)
    }

    /// Release every held key (e.g. on focus loss or shutdown).
    pub fn release_all<S: CommandSink + ?Sized>(&mut self, sink: &mut S) -> Option<Transition> {
        self.keys.clear();
        self.update(sink)
    }

    fn update<S: CommandSink + ?Sized>(&mut self, sink: &mut S) -> Option<Transition> {
        let target = resolve(self.keys);
        if target == self.state {
            return None;
        }
        let from = std::mem::replace(&mut self.state, target);

        let sent = if self.remote {
            match sink.send_command(target) {
                Ok(()) => true,
                Err(e) => {
                    warn!(state = %target, error = %e, "motor command not delivered");
                    false
                }
            }
        } else {
            debug!(state = %target, "local mode; command not transmitted");
            false
        };

        info!(%from, to = %target, keys = %self.keys, sent, "motor state changed");
        Some(Transition {
            from,
            to: target,
            sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<MotorState>,
        offline: bool,
    }

    impl CommandSink for RecordingSink {
        fn send_command(&mut self, state: MotorState) -> Result<(), LinkError> {
            if self.offline {
                return Err(LinkError::NotConnected);
            }
            self.sent.push(state);
            Ok(())
        }
    }

    #[test]
    fn table_resolves_every_single_key() {
        assert_eq!(resolve(KeySet::of(&[Key::Up])), MotorState::DriveForward);
        assert_eq!(resolve(KeySet::of(&[Key::Down])), MotorState::DriveBackward);
        assert_eq!(resolve(KeySet::of(&[Key::Left])), MotorState::RotateLeft);
        assert_eq!(resolve(KeySet::of(&[Key::Right])), MotorState::RotateRight);
        assert_eq!(resolve(KeySet::EMPTY), MotorState::Halt);
    }

    #[test]
    fn unlisted_combinations_halt() {
        assert_eq!(resolve(KeySet::of(&[Key::Up, Key::Down])), MotorState::Halt);
        assert_eq!(resolve(KeySet::of(&[Key::Left, Key::Right])), MotorState::Halt);
        assert_eq!(resolve(KeySet::of(&[Key::Down, Key::Left])), MotorState::Halt);
        assert_eq!(resolve(KeySet::of(&Key::ALL)), MotorState::Halt);
    }

    #[test]
    fn up_left_is_diagonal_regardless_of_press_order() {
        let mut sink = RecordingSink::default();

        let mut a = RemoteControl::new();
        a.key_down(Key::Up, &mut sink);
        a.key_down(Key::Left, &mut sink);

        let mut b = RemoteControl::new();
        b.key_down(Key::Left, &mut sink);
        b.key_down(Key::Up, &mut sink);

        assert_eq!(a.state(), MotorState::DriveLeft);
        assert_eq!(b.state(), MotorState::DriveLeft);
    }

    #[test]
    fn press_release_press_sends_three_commands() {
        let mut sink = RecordingSink::default();
        let mut rc = RemoteControl::new();

        rc.key_down(Key::Up, &mut sink);
        rc.key_up(Key::Up, &mut sink);
        rc.key_down(Key::Up, &mut sink);

        assert_eq!(
            sink.sent,
            vec![
                MotorState::DriveForward,
                MotorState::Halt,
                MotorState::DriveForward
            ]
        );
    }

    #[test]
    fn auto_repeat_sends_nothing_extra() {
        let mut sink = RecordingSink::default();
        let mut rc = RemoteControl::new();

        assert!(rc.key_down(Key::Right, &mut sink).is_some());
        for _ in 0..20 {
            assert!(rc.key_down(Key::Right, &mut sink).is_none());
        }
        assert_eq!(sink.sent, vec![MotorState::RotateRight]);
    }

    #[test]
    fn releasing_one_of_two_keys_falls_back() {
        let mut sink = RecordingSink::default();
        let mut rc = RemoteControl::new();

        rc.key_down(Key::Up, &mut sink);
        rc.key_down(Key::Right, &mut sink);
        let t = rc.key_up(Key::Up, &mut sink).expect("transition");

        assert_eq!(t.from, MotorState::DriveRight);
        assert_eq!(t.to, MotorState::RotateRight);
        assert_eq!(
            sink.sent,
            vec![
                MotorState::DriveForward,
                MotorState::DriveRight,
                MotorState::RotateRight
            ]
        );
    }

    #[test]
    fn key_up_of_unheld_key_is_ignored() {
        let mut sink = RecordingSink::default();
        let mut rc = RemoteControl::new();
        assert!(rc.key_up(Key::Down, &mut sink).is_none());
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn failed_send_still_records_state() {
        let mut sink = RecordingSink {
            offline: true,
            ..RecordingSink::default()
        };
        let mut rc = RemoteControl::new();

        let t = rc.key_down(Key::Down, &mut sink).expect("transition");
        assert!(!t.sent);
        assert_eq!(rc.state(), MotorState::DriveBackward);

        // Same net key set: no retry.
        assert!(rc.key_down(Key::Down, &mut sink).is_none());
    }

    #[test]
    fn local_mode_tracks_without_sending() {
        let mut sink = RecordingSink::default();
        let mut rc = RemoteControl::new();
        rc.set_remote(false);

        let t = rc.key_down(Key::Left, &mut sink).expect("transition");
        assert!(!t.sent);
        assert_eq!(rc.state(), MotorState::RotateLeft);
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn release_all_halts() {
        let mut sink = RecordingSink::default();
        let mut rc = RemoteControl::new();
        rc.key_down(Key::Up, &mut sink);
        rc.key_down(Key::Left, &mut sink);

        let t = rc.release_all(&mut sink).expect("transition");
        assert_eq!(t.to, MotorState::Halt);
        assert!(rc.keys().is_empty());
        assert!(rc.release_all(&mut sink).is_none());
    }
}
