use crate::driver::{ImageFormat, ScreenshotOptions, WaitState};
use crate::error::Result;
use crate::flow::context::RunContext;
use crate::flow::handlers::{wait_for_element, Session};
use crate::flow::schema::{ScreenshotKind, ScreenshotProps};
use std::path::Path;
use std::sync::Arc;

const DEFAULT_JPEG_QUALITY: u8 = 100;

pub async fn execute(session: &Session, props: &ScreenshotProps, ctx: &RunContext) -> Result<()> {
    let Some(path) = ctx.interpolate_opt(props.path.as_ref()).filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    let page = Arc::clone(session.page()?);

    let mut options = options_for_path(&path, props.quality);
    options.omit_background = props.omit_background;

    let bytes = match props.screenshot_type {
        Some(ScreenshotKind::FullPage) => {
            options.full_page = true;
            page.screenshot(&options).await?
        }
        Some(ScreenshotKind::Viewport) => page.screenshot(&options).await?,
        Some(ScreenshotKind::Element) => {
            let Some(locator) = props.target.locator(ctx) else {
                return Ok(());
            };
            let timeout = session.timeout(props.timeout);
            let element = wait_for_element(&page, &locator, WaitState::Visible, timeout).await?;
            page.element_screenshot(&element, &options).await?
        }
        None => return Ok(()),
    };

    let path = Path::new(&path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &bytes).await?;
    tracing::info!("Screenshot saved to {:?} ({} bytes)", path, bytes.len());
    Ok(())
}

/// Image format follows the file extension; quality only applies to JPEG.
pub fn options_for_path(path: &str, quality: Option<u8>) -> ScreenshotOptions {
    let lower = path.to_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        ScreenshotOptions {
            format: ImageFormat::Jpeg,
            quality: Some(quality.unwrap_or(DEFAULT_JPEG_QUALITY).min(100)),
            ..Default::default()
        }
    } else {
        ScreenshotOptions::default()
    }
}
