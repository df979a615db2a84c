use crate::driver::{ElementHandle, ElementState, LoadState, Page, WaitState};
use crate::error::Result;
use crate::flow::context::RunContext;
use crate::flow::handlers::{normalize_selector, wait_for_element, Session};
use crate::flow::schema::ClickProps;
use crate::picker::PickedSelector;
use std::sync::Arc;

pub async fn execute(
    session: &Session,
    node_id: &str,
    props: &ClickProps,
    ctx: &mut RunContext,
) -> Result<()> {
    let page = Arc::clone(session.page()?);
    let timeout = session.timeout(props.timeout);

    let element = if props.use_loop_element {
        match ctx.loop_element.clone() {
            Some(element) => element,
            None => {
                tracing::debug!("Click node {} has no loop element to target", node_id);
                return Ok(());
            }
        }
    } else {
        let locator = match props.target.locator(ctx) {
            Some(locator) => locator,
            None => {
                let picked = picked_selector(session, &page, node_id, ctx).await?;
                normalize_selector(&picked.selector, Some(picked.selector_type))
            }
        };

        if let Err(e) = page.wait_for_load_state(LoadState::NetworkIdle, timeout).await {
            tracing::warn!("Network did not go idle before click: {}", e);
        }

        let element = wait_for_element(&page, &locator, WaitState::Visible, timeout).await?;
        page.wait_for_element_state(&element, ElementState::Enabled, timeout)
            .await?;
        element
    };

    click_and_settle(session, &page, &element, props.wait_after_click, props.click_timeout).await
}

/// Selector for a node without one: reuse what the picker returned earlier in this
/// run, else ask the user now.
async fn picked_selector(
    session: &Session,
    page: &Arc<dyn Page>,
    node_id: &str,
    ctx: &mut RunContext,
) -> Result<PickedSelector> {
    if let Some(picked) = ctx.picked_selectors.get(node_id) {
        return Ok(picked.clone());
    }

    tracing::info!("Click node {} has no selector, starting element picker", node_id);
    let picked = session.picker.pick(page, ctx.cancel_token()).await?;
    ctx.picked_selectors
        .insert(node_id.to_string(), picked.clone());
    Ok(picked)
}

/// Click `element`, then optionally wait for the page to react.
pub(crate) async fn click_and_settle(
    session: &Session,
    page: &Arc<dyn Page>,
    element: &ElementHandle,
    wait_after_click: bool,
    click_timeout: Option<f64>,
) -> Result<()> {
    page.scroll_into_view(element, false).await?;
    let before = if wait_after_click {
        Some(page.url().await?)
    } else {
        None
    };

    page.click(element).await?;

    if let Some(before) = before {
        let timeout = session.timeout(click_timeout);
        tokio::select! {
            changed = page.wait_for_url_change(&before, timeout) => match changed {
                Ok(url) => tracing::debug!("Click navigated to {}", url),
                Err(e) => tracing::warn!("No navigation after click: {}", e),
            },
            loaded = page.wait_for_load_state(LoadState::Load, timeout) => {
                if let Err(e) = loaded {
                    tracing::warn!("Page did not finish loading after click: {}", e);
                }
            }
        }
        tokio::time::sleep(session.settings.click_settle()).await;
    }

    Ok(())
}
