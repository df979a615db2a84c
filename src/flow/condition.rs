//! Element predicates for switch branches and condition loops. All checks are
//! immediate; none of them waits for the element to appear.

use crate::driver::{Locator, Page};
use crate::error::Result;
use crate::flow::schema::{LoopCondition, SwitchCondition};
use std::sync::Arc;

pub async fn evaluate_switch(
    page: &Arc<dyn Page>,
    condition: SwitchCondition,
    locator: &Locator,
    value: Option<&str>,
) -> Result<bool> {
    let element = page.query(locator).await?;

    let result = match condition {
        SwitchCondition::Exists => element.is_some(),
        SwitchCondition::NotExists => element.is_none(),
        SwitchCondition::Visible => match &element {
            Some(el) => page.is_visible(el).await?,
            None => false,
        },
        SwitchCondition::NotVisible => match &element {
            Some(el) => !page.is_visible(el).await?,
            None => true,
        },
        SwitchCondition::Clickable => match &element {
            Some(el) => page.is_enabled(el).await?,
            None => false,
        },
        SwitchCondition::NotClickable => match &element {
            Some(el) => !page.is_enabled(el).await?,
            None => true,
        },
        SwitchCondition::TextEquals
        | SwitchCondition::TextNotEquals
        | SwitchCondition::TextContains
        | SwitchCondition::TextNotContains => {
            let Some(expected) = value.filter(|v| !v.is_empty()) else {
                return Ok(false);
            };
            let text = match &element {
                Some(el) => page.text_content(el).await?,
                None => None,
            };
            compare_text(condition, text.as_deref(), expected)
        }
    };
    Ok(result)
}

/// Exact, case-sensitive comparison with no trimming. A missing text never equals
/// or contains anything.
fn compare_text(condition: SwitchCondition, text: Option<&str>, expected: &str) -> bool {
    match condition {
        SwitchCondition::TextEquals => text == Some(expected),
        SwitchCondition::TextNotEquals => text != Some(expected),
        SwitchCondition::TextContains => text.is_some_and(|t| t.contains(expected)),
        SwitchCondition::TextNotContains => !text.is_some_and(|t| t.contains(expected)),
        _ => false,
    }
}

pub async fn evaluate_loop(
    page: &Arc<dyn Page>,
    condition: LoopCondition,
    locator: &Locator,
) -> Result<bool> {
    let element = page.query(locator).await?;
    let result = match (condition, &element) {
        (LoopCondition::Exists, el) => el.is_some(),
        (LoopCondition::Visible, Some(el)) => page.is_visible(el).await?,
        (LoopCondition::Visible, None) => false,
        (LoopCondition::Hidden, Some(el)) => !page.is_visible(el).await?,
        (LoopCondition::Hidden, None) => true,
        (LoopCondition::Clickable, Some(el)) => page.is_enabled(el).await?,
        (LoopCondition::Clickable, None) => false,
    };
    Ok(result)
}
