//! Capture one fused position from a simulated, jittery receiver.
//!
//! Run with: cargo run --example capture_position

use std::sync::Arc;
use std::time::Duration;

use trail_recorder::{
    collect_fused_location, fuse_samples, FusionConfig, GeoSample, SampleBroadcaster, SampleEvent,
};

#[tokio::main]
async fn main() {
    let config = FusionConfig::default();

    println!("Location Fusion Example\n");
    println!(
        "Config: window={}ms, max_samples={}, quality={}m\n",
        config.window_millis, config.max_samples, config.quality_accuracy_meters
    );

    // Offline: fuse a fixed burst
    let burst = [
        GeoSample::new(46.55800, 7.83500, 0).with_accuracy(5.0),
        GeoSample::new(46.55805, 7.83500, 1_000).with_accuracy(10.0),
        GeoSample::new(46.56500, 7.84000, 2_000).with_accuracy(1000.0),
    ];
    println!("1. Fixed burst of {} fixes:", burst.len());
    match fuse_samples(&burst, &config) {
        Ok(fused) => println!(
            "   {:.6}, {:.6} ±{:.1} m from {} fixes\n",
            fused.lat, fused.lng, fused.accuracy_meters, fused.sample_count
        ),
        Err(e) => println!("   {}\n", e),
    }

    // Live: a receiver thread publishing every 400 ms
    let source = Arc::new(SampleBroadcaster::new());
    let feeder = {
        let source = Arc::clone(&source);
        std::thread::spawn(move || {
            let jitter = [0.0, 0.00002, -0.00001, 0.00003, -0.00002, 0.00001];
            for (i, offset) in jitter.iter().enumerate() {
                std::thread::sleep(Duration::from_millis(400));
                let sample = GeoSample::new(46.5580 + offset, 7.8350 - offset, i as i64 * 400)
                    .with_accuracy(6.0 + i as f64)
                    .with_altitude(1000.0 + offset * 1e5);
                source.publish(SampleEvent::Fix(sample));
            }
        })
    };

    println!("2. Live capture:");
    match collect_fused_location(source.as_ref(), &config).await {
        Ok(fused) => println!(
            "   {:.6}, {:.6} ±{:.1} m, altitude {:?}, from {} fixes",
            fused.lat, fused.lng, fused.accuracy_meters, fused.altitude_meters, fused.sample_count
        ),
        Err(e) => println!("   capture failed: {}", e),
    }
    println!("   subscribers left: {}", source.subscriber_count());

    let _ = feeder.join();
}
