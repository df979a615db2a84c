use crate::driver::LoadState;
use crate::error::Result;
use crate::flow::context::RunContext;
use crate::flow::handlers::{click, Session};
use crate::flow::schema::{BrowserAction, BrowserProps, ClickProps, Target};
use std::collections::HashMap;
use std::sync::Arc;

const MAXIMIZED: (u32, u32) = (1920, 1080);
const MINIMIZED: (u32, u32) = (800, 600);

pub async fn execute(
    session: &mut Session,
    node_id: &str,
    props: &BrowserProps,
    ctx: &mut RunContext,
) -> Result<()> {
    let page = Arc::clone(session.page()?);

    if let (Some(width), Some(height)) = (props.width, props.height) {
        page.set_viewport(width, height).await?;
    }
    if let Some(user_agent) = &props.user_agent {
        let headers = HashMap::from([("User-Agent".to_string(), user_agent.clone())]);
        page.set_extra_http_headers(&headers).await?;
    }

    let Some(action) = props.action_type else {
        return Ok(());
    };

    match action {
        BrowserAction::Goto => {
            let Some(url) = ctx.interpolate_opt(props.url.as_ref()) else {
                return Ok(());
            };
            page.goto(&url).await?;
        }
        BrowserAction::Back => page.go_back().await?,
        BrowserAction::Forward => page.go_forward().await?,
        BrowserAction::Reload => page.reload().await?,
        BrowserAction::Close => {
            if let Some(page) = session.take_page() {
                page.close().await?;
            }
            tracing::info!("Page closed by node {}", node_id);
            return Ok(());
        }
        BrowserAction::Maximize => {
            page.set_viewport(MAXIMIZED.0, MAXIMIZED.1).await?;
            return Ok(());
        }
        BrowserAction::Minimize => {
            page.set_viewport(MINIMIZED.0, MINIMIZED.1).await?;
            return Ok(());
        }
        BrowserAction::Click => {
            if props.click_selector.is_none() {
                return Ok(());
            }
            let click_props = ClickProps {
                target: Target {
                    selector: props.click_selector.clone(),
                    selector_type: props.click_selector_type,
                },
                wait_after_click: props.wait_after_click,
                click_timeout: props.click_timeout,
                timeout: props.timeout,
                use_loop_element: false,
            };
            return click::execute(session, node_id, &click_props, ctx).await;
        }
    }

    if props.wait_for_load && props.timeout.is_some() {
        page.wait_for_load_state(LoadState::NetworkIdle, session.timeout(props.timeout))
            .await?;
    }
    Ok(())
}
