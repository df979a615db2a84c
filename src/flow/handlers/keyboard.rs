use crate::driver::{LoadState, WaitState};
use crate::error::Result;
use crate::flow::context::RunContext;
use crate::flow::handlers::{wait_for_element, Session};
use crate::flow::schema::{KeyboardAction, KeyboardProps};
use std::sync::Arc;
use std::time::Duration;

pub async fn execute(session: &Session, props: &KeyboardProps, ctx: &RunContext) -> Result<()> {
    let page = Arc::clone(session.page()?);

    let action = props.action_type.or_else(|| {
        if props.key.is_some() {
            Some(KeyboardAction::Press)
        } else if props.text.is_some() {
            Some(KeyboardAction::Type)
        } else {
            None
        }
    });

    match action {
        Some(KeyboardAction::Press) => {
            let Some(key) = props.key.as_deref().filter(|k| !k.trim().is_empty()) else {
                return Ok(());
            };
            let combo = key_combo(key, &props.modifiers);
            page.press_key(&combo).await?;
            tracing::debug!("Pressed {}", combo);

            if combo == "Enter" || combo.ends_with("+Enter") {
                let timeout = session.timeout(props.timeout);
                if let Err(e) = page.wait_for_load_state(LoadState::NetworkIdle, timeout).await {
                    tracing::warn!("Network did not go idle after Enter: {}", e);
                }
            }
        }
        Some(KeyboardAction::Type) => {
            let Some(text) = ctx.interpolate_opt(props.text.as_ref()) else {
                return Ok(());
            };
            let delay = Duration::from_millis(props.delay.unwrap_or(0));
            match props.target.locator(ctx) {
                Some(locator) => {
                    let timeout = session.timeout(props.timeout);
                    let element =
                        wait_for_element(&page, &locator, WaitState::Visible, timeout).await?;
                    page.type_text(&element, &text, delay).await?;
                }
                None => page.keyboard_type(&text, delay).await?,
            }
        }
        None => {}
    }
    Ok(())
}

/// Canonical DOM name for a modifier alias; other keys pass through unchanged.
pub fn normalize_modifier(name: &str) -> String {
    let trimmed = name.trim();
    let canonical = match trimmed.to_lowercase().as_str() {
        "ctrl" | "control" => "Control",
        "cmd" | "command" | "win" | "meta" | "super" => "Meta",
        "alt" | "option" => "Alt",
        "shift" => "Shift",
        _ => return trimmed.to_string(),
    };
    canonical.to_string()
}

/// Build `Mod+...+Key` from a key (possibly already a combo) and extra modifiers.
pub fn key_combo(key: &str, modifiers: &[String]) -> String {
    let key = key.trim();
    // A trailing `+` is the plus key itself: `+`, `ctrl++`
    let (head, last) = match key.strip_suffix('+') {
        Some(head) => (head.trim_end().trim_end_matches('+'), "+"),
        None => match key.rsplit_once('+') {
            Some((head, last)) => (head, last.trim()),
            None => ("", key),
        },
    };

    let mut combo: Vec<String> = Vec::new();
    for m in modifiers
        .iter()
        .map(String::as_str)
        .chain(head.split('+').map(str::trim))
    {
        if m.is_empty() {
            continue;
        }
        let m = normalize_modifier(m);
        if !combo.contains(&m) {
            combo.push(m);
        }
    }
    combo.push(last.to_string());
    combo.join("+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_aliases() {
        assert_eq!(normalize_modifier("ctrl"), "Control");
        assert_eq!(normalize_modifier("CMD"), "Meta");
        assert_eq!(normalize_modifier("super"), "Meta");
        assert_eq!(normalize_modifier("option"), "Alt");
        assert_eq!(normalize_modifier("Shift"), "Shift");
        assert_eq!(normalize_modifier("a"), "a");
    }

    #[test]
    fn test_key_combo() {
        assert_eq!(key_combo("Enter", &[]), "Enter");
        assert_eq!(
            key_combo("a", &["ctrl".to_string(), "shift".to_string()]),
            "Control+Shift+a"
        );
        assert_eq!(key_combo("cmd+c", &[]), "Meta+c");
        assert_eq!(key_combo("ctrl+a", &["control".to_string()]), "Control+a");
    }

    #[test]
    fn test_key_combo_plus_key() {
        assert_eq!(key_combo("+", &[]), "+");
        assert_eq!(key_combo("ctrl++", &[]), "Control++");
        assert_eq!(key_combo("+", &["shift".to_string()]), "Shift++");
    }
}
