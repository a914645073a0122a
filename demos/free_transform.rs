use std::time::Instant;

use env_logger::Builder;
use log::info;
use strip_warp::{open_source, perspective_warp, FreeTransform, OverlayConfig, Point, PointerEvent};

fn main() {
    Builder::from_default_env().format_timestamp_nanos().init();
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "test_image/source.png".to_string());

    let source = open_source(&path).unwrap();
    let (w, h) = (source.width() as f32, source.height() as f32);
    info!("Loading image: {}x{}", source.width(), source.height());

    let mut transform = FreeTransform::new(OverlayConfig::default());
    transform.load_rgba(source.clone()).unwrap();

    // Drag the top corners inwards and the bottom-right corner out
    let drags = [
        (Point::new(0.0, 0.0), Point::new(w * 0.15, h * 0.1)),
        (Point::new(w, 0.0), Point::new(w * 0.8, h * 0.05)),
        (Point::new(w, h), Point::new(w * 1.1, h * 0.95)),
    ];

    let instance = Instant::now();
    for (from, to) in drags {
        transform.handle(PointerEvent::Down(from)).unwrap();
        transform.handle(PointerEvent::Move(to)).unwrap();
        transform.handle(PointerEvent::Up).unwrap();
    }
    info!("strip warps took: {:?}", instance.elapsed());

    transform
        .render_overlay()
        .unwrap()
        .save("test_image/free_transform.png")
        .unwrap();

    // Same quad through the homography path for comparison
    let quad = *transform.quad().unwrap();
    let (cw, ch) = quad.canvas_size();
    let instance = Instant::now();
    let exact = perspective_warp(
        &source,
        &quad,
        cw,
        ch,
        imageproc::geometric_transformations::Interpolation::Bilinear,
    )
    .unwrap();
    info!("homography warp took: {:?}", instance.elapsed());
    exact.save("test_image/perspective.png").unwrap();

    info!("quad: {:?}", quad.corners());
}
