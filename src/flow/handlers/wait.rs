use crate::driver::WaitState;
use crate::error::Result;
use crate::flow::context::RunContext;
use crate::flow::handlers::Session;
use crate::flow::schema::{WaitKind, WaitProps};
use std::sync::Arc;

pub async fn execute(session: &Session, props: &WaitProps, ctx: &RunContext) -> Result<()> {
    let page = Arc::clone(session.page()?);

    let state = match props.wait_type {
        Some(WaitKind::Timeout) => {
            tokio::time::sleep(session.delay(props.timeout)).await;
            return Ok(());
        }
        Some(WaitKind::Visible) if props.reverse => WaitState::Hidden,
        Some(WaitKind::Visible) => WaitState::Visible,
        Some(WaitKind::Exists) if props.reverse => WaitState::Detached,
        Some(WaitKind::Exists) => WaitState::Attached,
        None => return Ok(()),
    };

    let Some(locator) = props.target.locator(ctx) else {
        return Ok(());
    };
    page.wait_for_selector(&locator, state, session.timeout(props.timeout))
        .await?;
    tracing::debug!("{} reached {:?}", locator, state);
    Ok(())
}
