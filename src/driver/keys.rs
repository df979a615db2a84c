//! DOM key names to CDP `Input.dispatchKeyEvent` parameters.

/// Modifier bit flags as CDP expects them.
pub const MOD_ALT: i64 = 1;
pub const MOD_CONTROL: i64 = 2;
pub const MOD_META: i64 = 4;
pub const MOD_SHIFT: i64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinition {
    pub key: String,
    pub code: String,
    pub key_code: i64,
    /// Text the key inserts, if any
    pub text: Option<String>,
}

/// Modifier bit for a DOM key name, if it is a modifier.
pub fn modifier_bit(key: &str) -> Option<i64> {
    match key {
        "Alt" => Some(MOD_ALT),
        "Control" => Some(MOD_CONTROL),
        "Meta" => Some(MOD_META),
        "Shift" => Some(MOD_SHIFT),
        _ => None,
    }
}

/// Split `Control+Shift+a` into its modifiers and the final key.
/// A trailing `+` is the plus key: `Control++` presses `+` with Control held.
pub fn split_combo(combo: &str) -> (Vec<&str>, &str) {
    let (head, key) = match combo.strip_suffix('+') {
        Some(head) => (head.trim_end_matches('+'), "+"),
        None => combo.rsplit_once('+').unwrap_or(("", combo)),
    };
    let mods = head.split('+').filter(|p| !p.is_empty()).collect();
    (mods, key)
}

pub fn key_definition(key: &str) -> KeyDefinition {
    let named = |code: &str, key_code: i64, text: Option<&str>| KeyDefinition {
        key: key.to_string(),
        code: code.to_string(),
        key_code,
        text: text.map(str::to_string),
    };

    match key {
        "Enter" => named("Enter", 13, Some("\r")),
        "Tab" => named("Tab", 9, None),
        "Escape" => named("Escape", 27, None),
        "Backspace" => named("Backspace", 8, None),
        "Delete" => named("Delete", 46, None),
        "Space" | " " => KeyDefinition {
            key: " ".to_string(),
            code: "Space".to_string(),
            key_code: 32,
            text: Some(" ".to_string()),
        },
        "ArrowUp" => named("ArrowUp", 38, None),
        "ArrowDown" => named("ArrowDown", 40, None),
        "ArrowLeft" => named("ArrowLeft", 37, None),
        "ArrowRight" => named("ArrowRight", 39, None),
        "Home" => named("Home", 36, None),
        "End" => named("End", 35, None),
        "PageUp" => named("PageUp", 33, None),
        "PageDown" => named("PageDown", 34, None),
        "Insert" => named("Insert", 45, None),
        "Alt" => named("AltLeft", 18, None),
        "Control" => named("ControlLeft", 17, None),
        "Meta" => named("MetaLeft", 91, None),
        "Shift" => named("ShiftLeft", 16, None),
        _ => {
            if let Some(n) = key.strip_prefix('F').and_then(|n| n.parse::<i64>().ok()) {
                if (1..=12).contains(&n) {
                    return named(key, 111 + n, None);
                }
            }
            char_definition(key)
        }
    }
}

fn char_definition(key: &str) -> KeyDefinition {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => {
            let upper = c.to_ascii_uppercase();
            let (code, key_code) = if c.is_ascii_alphabetic() {
                (format!("Key{}", upper), upper as i64)
            } else if c.is_ascii_digit() {
                (format!("Digit{}", c), c as i64)
            } else {
                (String::new(), 0)
            };
            KeyDefinition {
                key: key.to_string(),
                code,
                key_code,
                text: Some(key.to_string()),
            }
        }
        _ => KeyDefinition {
            key: key.to_string(),
            code: key.to_string(),
            key_code: 0,
            text: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_combo() {
        assert_eq!(split_combo("Control+Shift+a"), (vec!["Control", "Shift"], "a"));
        assert_eq!(split_combo("Enter"), (vec![], "Enter"));
        assert_eq!(split_combo("+"), (vec![], "+"));
        assert_eq!(split_combo("Control++"), (vec!["Control"], "+"));
    }

    #[test]
    fn test_letter_definition() {
        let def = key_definition("a");
        assert_eq!(def.code, "KeyA");
        assert_eq!(def.key_code, 65);
        assert_eq!(def.text.as_deref(), Some("a"));
    }

    #[test]
    fn test_named_and_function_keys() {
        assert_eq!(key_definition("Enter").key_code, 13);
        assert_eq!(key_definition("F5").key_code, 116);
        assert!(key_definition("Tab").text.is_none());
    }

    #[test]
    fn test_modifier_bits() {
        assert_eq!(modifier_bit("Control"), Some(MOD_CONTROL));
        assert_eq!(modifier_bit("a"), None);
    }
}
