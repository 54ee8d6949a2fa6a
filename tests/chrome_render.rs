//! Headless Chrome rendering. Needs a local Chrome or Chromium.
//!
//! Run with: `cargo test --test chrome_render -- --ignored`

use std::time::Duration;
use tempfile::TempDir;
use thumbforge::render::{ChromeRenderer, RenderEngine, RenderJob, TimedRenderer, Viewport};
use thumbforge::rows::RowData;
use thumbforge::template::{stock_template, substitute};

fn renderer() -> TimedRenderer<ChromeRenderer> {
    let timeout = Duration::from_secs(60);
    TimedRenderer::new(ChromeRenderer::new(None, timeout), timeout)
}

// ===========================================================================
// Screenshots
// ===========================================================================

#[test]
#[ignore]
fn renders_png_at_viewport_size() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("out.png");
    let viewport = Viewport {
        width: 640,
        height: 360,
    };
    let job = RenderJob::new(
        "<html><body style=\"background:#c00\"><h1>Hello</h1></body></html>".into(),
        output.clone(),
        viewport,
    );

    renderer().render(&job).unwrap();

    assert_eq!(image::image_dimensions(&output).unwrap(), (640, 360));
}

#[test]
#[ignore]
fn renders_stock_template() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("stock.png");
    let data = RowData::from([
        ("badge".to_string(), "New".to_string()),
        (
            "main_title".to_string(),
            "Buy <span class='highlight'>Shoes</span> Now".to_string(),
        ),
        ("sub_title".to_string(), "Limited".to_string()),
        ("image_url".to_string(), String::new()),
    ]);
    let html = substitute(&stock_template(), &data);
    let job = RenderJob::new(html, output.clone(), Viewport::default());

    renderer().render(&job).unwrap();

    assert_eq!(image::image_dimensions(&output).unwrap(), (1280, 720));
}
