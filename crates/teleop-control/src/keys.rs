//! Directional keys and the set of keys currently held.

use std::fmt;
use std::str::FromStr;

/// The four keys the remote controller reacts to. Any other input is the
/// host's business and never reaches [`KeySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Key {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Key {
    pub const ALL: [Key; 4] = [Key::Up, Key::Down, Key::Left, Key::Right];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Key::Up => "up",
            Key::Down => "down",
            Key::Left => "left",
            Key::Right => "right",
        };
        f.write_str(name)
    }
}

impl FromStr for Key {
    type Err = String;

    /// Accepts arrow names (`up`, `down`, …) and WASD letters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "w" => Ok(Key::Up),
            "down" | "s" => Ok(Key::Down),
            "left" | "a" => Ok(Key::Left),
            "right" | "d" => Ok(Key::Right),
            other => Err(format!("'{other}' is not a direction key")),
        }
    }
}

/// Set of held [`Key`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeySet(u8);

impl KeySet {
    pub const EMPTY: KeySet = KeySet(0);

    /// Build a set from a list of keys (usable in `const` context).
    pub const fn of(keys: &[Key]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < keys.len() {
            bits |= keys[i].bit();
            i += 1;
        }
        KeySet(bits)
    }

    /// Add `key`; returns `false` if it was already held.
    pub fn insert(&mut self, key: Key) -> bool {
        let held = self.contains(key);
        self.0 |= key.bit();
        !held
    }

    /// Remove `key`; returns `false` if it was not held.
    pub fn remove(&mut self, key: Key) -> bool {
        let held = self.contains(key);
        self.0 &= !key.bit();
        held
    }

    pub fn contains(self, key: Key) -> bool {
        self.0 & key.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn iter(self) -> impl Iterator<Item = Key> {
        Key::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|k| k.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_track_membership() {
        let mut keys = KeySet::EMPTY;
        assert!(keys.insert(Key::Up));
        assert!(!keys.insert(Key::Up));
        assert!(keys.insert(Key::Left));
        assert_eq!(keys, KeySet::of(&[Key::Left, Key::Up]));
        assert_eq!(keys.len(), 2);

        assert!(keys.remove(Key::Up));
        assert!(!keys.remove(Key::Up));
        assert_eq!(keys, KeySet::of(&[Key::Left]));
    }

    #[test]
    fn parse_accepts_arrows_and_wasd() {
        assert_eq!("UP".parse::<Key>(), Ok(Key::Up));
        assert_eq!("a".parse::<Key>(), Ok(Key::Left));
        assert_eq!(" right ".parse::<Key>(), Ok(Key::Right));
        assert!("space".parse::<Key>().is_err());
    }

    #[test]
    fn display_lists_keys_in_fixed_order() {
        let keys = KeySet::of(&[Key::Right, Key::Up]);
        assert_eq!(keys.to_string(), "{up, right}");
        assert_eq!(KeySet::EMPTY.to_string(), "{}");
    }
}
