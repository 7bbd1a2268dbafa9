//! Key identity and display names.

use serde::{Deserialize, Serialize};

/// macOS virtual keycode identifying a physical key.
///
/// The code is opaque to the detector; it only matters that two events for
/// the same physical key carry the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u16);

impl KeyCode {
    /// Human-readable name for common ANSI-layout keycodes, used in
    /// notification text. Unknown codes fall back to `key <code>`.
    pub fn name(self) -> String {
        let name = match self.0 {
            0 => "a",
            1 => "s",
            2 => "d",
            3 => "f",
            4 => "h",
            5 => "g",
            6 => "z",
            7 => "x",
            8 => "c",
            9 => "v",
            11 => "b",
            12 => "q",
            13 => "w",
            14 => "e",
            15 => "r",
            16 => "y",
            17 => "t",
            18 => "1",
            19 => "2",
            20 => "3",
            21 => "4",
            22 => "6",
            23 => "5",
            24 => "=",
            25 => "9",
            26 => "7",
            27 => "-",
            28 => "8",
            29 => "0",
            30 => "]",
            31 => "o",
            32 => "u",
            33 => "[",
            34 => "i",
            35 => "p",
            36 => "return",
            37 => "l",
            38 => "j",
            39 => "'",
            40 => "k",
            41 => ";",
            42 => "\\",
            43 => ",",
            44 => "/",
            45 => "n",
            46 => "m",
            47 => ".",
            48 => "tab",
            49 => "space",
            50 => "`",
            51 => "delete",
            53 => "escape",
            123 => "left",
            124 => "right",
            125 => "down",
            126 => "up",
            code => return format!("key {}", code),
        };
        name.to_string()
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_key_names() {
        assert_eq!(KeyCode(0).name(), "a");
        assert_eq!(KeyCode(49).name(), "space");
        assert_eq!(KeyCode(53).name(), "escape");
        assert_eq!(KeyCode(126).name(), "up");
    }

    #[test]
    fn test_unknown_key_name_fallback() {
        assert_eq!(KeyCode(200).name(), "key 200");
    }

    #[test]
    fn test_display_matches_name() {
        assert_eq!(KeyCode(36).to_string(), "return");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&KeyCode(49)).unwrap();
        assert_eq!(json, "49");
        let code: KeyCode = serde_json::from_str("49").unwrap();
        assert_eq!(code, KeyCode(49));
    }
}
