use crate::driver::{ElementHandle, Locator, Page, WaitState};
use crate::error::Result;
use crate::flow::context::RunContext;
use crate::flow::filter::apply_filter;
use crate::flow::handlers::{wait_for_element, Session};
use crate::flow::schema::{ExtractProps, ExtractType, ListItemType};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ROW_SELECTOR: &str = "tr";
const DEFAULT_CELL_SELECTOR: &str = "td, th";

pub async fn execute(session: &Session, props: &ExtractProps, ctx: &mut RunContext) -> Result<()> {
    let Some(name) = props.variable_name.as_deref().filter(|n| !n.is_empty()) else {
        return Ok(());
    };
    let page = Arc::clone(session.page()?);

    let value = extract_filtered(&page, props, ctx, session.timeout(props.timeout)).await?;
    if value.is_null() {
        tracing::debug!("Extraction for {} produced nothing", name);
        return Ok(());
    }

    if props.append {
        ctx.append_variable(name, value);
    } else {
        ctx.set_variable(name, value);
    }
    Ok(())
}

/// Extract and filter without storing. `Null` when nothing was extracted or the
/// filter rejected the value.
pub async fn extract_filtered(
    page: &Arc<dyn Page>,
    props: &ExtractProps,
    ctx: &RunContext,
    timeout: Duration,
) -> Result<Value> {
    match extract(page, props, ctx, timeout).await? {
        Some(value) => apply_filter(value, &props.filter),
        None => Ok(Value::Null),
    }
}

async fn extract(
    page: &Arc<dyn Page>,
    props: &ExtractProps,
    ctx: &RunContext,
    timeout: Duration,
) -> Result<Option<Value>> {
    let Some(extract_type) = props.extract_type else {
        return Ok(None);
    };
    let locator = props.target.locator(ctx);

    if extract_type == ExtractType::List {
        let items = match (&ctx.loop_element, props.use_loop_element, &locator) {
            (Some(parent), true, Some(locator)) => {
                page.query_within(parent, locator.expression()).await?
            }
            (_, true, _) => return Ok(None),
            (_, false, Some(locator)) => page.query_all(locator).await?,
            (_, false, None) => return Ok(None),
        };
        let item_type = props.list_item_type.unwrap_or_default();
        let mut values = Vec::with_capacity(items.len());
        for item in &items {
            let value = match item_type {
                ListItemType::Html => page.inner_html(item).await?,
                ListItemType::Text => trimmed_text(page, item).await?,
            };
            values.push(Value::String(value));
        }
        return Ok(Some(Value::Array(values)));
    }

    let Some(root) = root_element(page, props, ctx, locator.as_ref(), timeout).await? else {
        return Ok(None);
    };

    let value = match extract_type {
        ExtractType::Text => Some(Value::String(trimmed_text(page, &root).await?)),
        ExtractType::Attribute => match props.attribute_name.as_deref() {
            Some(attr) if !attr.is_empty() => page.attribute(&root, attr).await?.map(Value::String),
            _ => None,
        },
        ExtractType::Html => Some(Value::String(page.inner_html(&root).await?)),
        ExtractType::Table => Some(extract_table(page, &root, props).await?),
        ExtractType::List => None,
    };
    Ok(value)
}

async fn root_element(
    page: &Arc<dyn Page>,
    props: &ExtractProps,
    ctx: &RunContext,
    locator: Option<&Locator>,
    timeout: Duration,
) -> Result<Option<ElementHandle>> {
    if props.use_loop_element {
        return Ok(ctx.loop_element.clone());
    }
    match locator {
        Some(locator) => Ok(Some(
            wait_for_element(page, locator, WaitState::Attached, timeout).await?,
        )),
        None => Ok(None),
    }
}

async fn trimmed_text(page: &Arc<dyn Page>, element: &ElementHandle) -> Result<String> {
    Ok(page
        .text_content(element)
        .await?
        .unwrap_or_default()
        .trim()
        .to_string())
}

async fn cell_texts(page: &Arc<dyn Page>, cells: &[ElementHandle]) -> Result<Vec<String>> {
    let mut texts = Vec::with_capacity(cells.len());
    for cell in cells {
        texts.push(trimmed_text(page, cell).await?);
    }
    Ok(texts)
}

/// `[header?, row1, row2, ...]`, each row a list of trimmed cell texts.
async fn extract_table(
    page: &Arc<dyn Page>,
    root: &ElementHandle,
    props: &ExtractProps,
) -> Result<Value> {
    let row_selector = non_empty(props.row_selector.as_deref()).unwrap_or(DEFAULT_ROW_SELECTOR);
    let cell_selector = non_empty(props.cell_selector.as_deref()).unwrap_or(DEFAULT_CELL_SELECTOR);

    let header = match non_empty(props.header_selector.as_deref()) {
        Some(selector) => {
            let cells = page.query_within(root, selector).await?;
            Some(cell_texts(page, &cells).await?).filter(|h| !h.is_empty())
        }
        None => None,
    };

    let mut table: Vec<Vec<String>> = Vec::new();
    if let Some(header) = &header {
        table.push(header.clone());
    }

    for row in page.query_within(root, row_selector).await? {
        let cells = page.query_within(&row, cell_selector).await?;
        if cells.is_empty() {
            continue;
        }
        let texts = cell_texts(page, &cells).await?;
        // A header row also matched by the row selector is not repeated
        if table.len() == 1 && header.as_ref() == Some(&texts) {
            continue;
        }
        table.push(texts);
    }

    Ok(Value::Array(
        table
            .into_iter()
            .map(|row| Value::Array(row.into_iter().map(Value::String).collect()))
            .collect(),
    ))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
