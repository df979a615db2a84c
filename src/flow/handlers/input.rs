use crate::driver::{ElementState, WaitState};
use crate::error::{FlowError, Result};
use crate::flow::context::RunContext;
use crate::flow::handlers::{delay_or, wait_for_element, Session};
use crate::flow::schema::InputProps;
use std::sync::Arc;
use std::time::Duration;

pub async fn execute(session: &Session, props: &InputProps, ctx: &RunContext) -> Result<()> {
    let locator = props.target.locator(ctx);
    let text = ctx.interpolate_opt(props.text.as_ref()).filter(|t| !t.is_empty());
    let (Some(locator), Some(text)) = (locator, text) else {
        return Err(FlowError::Input("selector and text are required".to_string()));
    };

    match fill_and_verify(session, &locator, &text, props).await {
        Ok(()) => Ok(()),
        Err(e @ (FlowError::Input(_) | FlowError::InputVerification { .. })) => Err(e),
        Err(e) => Err(FlowError::Input(e.to_string())),
    }
}

async fn fill_and_verify(
    session: &Session,
    locator: &crate::driver::Locator,
    text: &str,
    props: &InputProps,
) -> Result<()> {
    let page = Arc::clone(session.page()?);
    let timeout = session.timeout(props.timeout);

    let element = wait_for_element(&page, locator, WaitState::Visible, timeout).await?;
    page.wait_for_element_state(&element, ElementState::Enabled, timeout)
        .await?;

    if props.clear_first {
        page.clear_value(&element).await?;
    }

    page.scroll_into_view(&element, false).await?;

    if props.simulate_typing {
        let delay = Duration::from_millis(props.typing_delay.unwrap_or(0));
        page.type_text(&element, text, delay).await?;
    } else {
        page.fill(&element, text).await?;
    }

    if props.wait_after_input {
        tokio::time::sleep(delay_or(props.wait_timeout, Duration::ZERO)).await;
    }

    let actual = page.input_value(&element).await?;
    if actual != text {
        return Err(FlowError::InputVerification {
            expected: text.to_string(),
            actual,
        });
    }

    tracing::debug!("Input into {} verified", locator);
    Ok(())
}
