use crate::driver::{ScrollTarget, WaitState};
use crate::error::Result;
use crate::flow::context::RunContext;
use crate::flow::handlers::{wait_for_element, Session};
use crate::flow::schema::{ScrollKind, ScrollProps};
use std::sync::Arc;
use std::time::Duration;

pub async fn execute(session: &Session, props: &ScrollProps, ctx: &RunContext) -> Result<()> {
    let page = Arc::clone(session.page()?);

    let scrolled = match props.scroll_type {
        Some(ScrollKind::Element) => match props.target.locator(ctx) {
            Some(locator) => {
                let timeout = session.timeout(props.timeout);
                let element =
                    wait_for_element(&page, &locator, WaitState::Attached, timeout).await?;
                page.scroll_into_view(&element, props.smooth).await?;
                true
            }
            None => false,
        },
        Some(ScrollKind::Position) => match (props.x, props.y) {
            (Some(x), Some(y)) => {
                page.scroll_to(ScrollTarget::Position { x, y }, props.smooth)
                    .await?;
                true
            }
            _ => false,
        },
        Some(ScrollKind::Top) => {
            page.scroll_to(ScrollTarget::Top, props.smooth).await?;
            true
        }
        Some(ScrollKind::Bottom) => {
            page.scroll_to(ScrollTarget::Bottom, props.smooth).await?;
            true
        }
        None => false,
    };

    if scrolled {
        if let Some(delay) = props.scroll_delay.filter(|d| *d > 0) {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
    Ok(())
}
