use std::time::Instant;

use env_logger::Builder;
use log::info;
use strip_warp::{detect_objects, open_source, visualize_contours, DetectionParams};

fn main() {
    Builder::from_default_env().format_timestamp_nanos().init();
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "test_image/source.png".to_string());

    let img = open_source(&path).unwrap();
    let params = DetectionParams::default();

    info!("start detection");
    let instance = Instant::now();

    let detection = detect_objects(&img, &params).unwrap();

    let elapsed = instance.elapsed();
    info!("detection took: {elapsed:?}");

    let result = visualize_contours(&img, &detection.contours, &params);
    result.save("test_image/contours.png").unwrap();
    detection.edges.save("test_image/edges.png").unwrap();

    info!("found {} external contours", detection.contours.len());
}
