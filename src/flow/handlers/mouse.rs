use crate::driver::{ScrollTarget, WaitState};
use crate::error::Result;
use crate::flow::context::RunContext;
use crate::flow::handlers::{wait_for_element, Session};
use crate::flow::schema::{MouseAction, MouseProps};
use std::sync::Arc;

pub async fn execute(session: &Session, props: &MouseProps, ctx: &RunContext) -> Result<()> {
    let page = Arc::clone(session.page()?);
    let timeout = session.timeout(props.timeout);

    match props.action_type {
        Some(MouseAction::MoveToElement) => {
            if let Some(locator) = props.target.locator(ctx) {
                let element = wait_for_element(&page, &locator, WaitState::Visible, timeout).await?;
                page.hover(&element).await?;
            }
        }
        Some(MouseAction::MoveToPosition) => {
            if let (Some(x), Some(y)) = (props.x, props.y) {
                page.mouse_move(x, y).await?;
            }
        }
        Some(MouseAction::ScrollToElement) => {
            if let Some(locator) = props.target.locator(ctx) {
                let element =
                    wait_for_element(&page, &locator, WaitState::Attached, timeout).await?;
                page.scroll_into_view(&element, props.smooth).await?;
            }
        }
        Some(MouseAction::ScrollToPosition) => {
            if let (Some(x), Some(y)) = (props.x, props.y) {
                page.scroll_to(ScrollTarget::Position { x, y }, props.smooth)
                    .await?;
            }
        }
        None => {}
    }
    Ok(())
}
