//! Record a short simulated hike, pause it, persist it and restore it.
//!
//! Run with: cargo run --example record_trail

use std::sync::Arc;

use trail_recorder::{
    Clock, GeoSample, JsonFileStore, ManualClock, SampleBroadcaster, SampleEvent, TrackEvent,
    TrackRecorder,
};

fn main() {
    let source = Arc::new(SampleBroadcaster::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let path = std::env::temp_dir().join("trail-recorder-demo.json");
    let store = Arc::new(JsonFileStore::new(&path));

    let recorder = TrackRecorder::new(source.clone(), store.clone(), clock.clone()).with_listener(
        Arc::new(|event: &TrackEvent| match event {
            TrackEvent::StateChanged(state) => println!("   -> {}", state),
            TrackEvent::PointAccepted { total_distance_meters, .. } => {
                println!("   accepted, total {:.1} m", total_distance_meters)
            }
            TrackEvent::PointRejected { reason, .. } => println!("   rejected: {}", reason),
            TrackEvent::PositionError(error) => println!("   position error: {}", error),
            TrackEvent::StorageFailed(message) => println!("   storage failed: {}", message),
        }),
    );

    println!("Trail Recorder Example\n");
    println!("1. Start recording:");
    if let Err(e) = recorder.start() {
        eprintln!("   {}", e);
        return;
    }

    // Walk north along a ridge (Bernese Oberland), one fix every 10 s.
    // Fix 3 is a noisy indoor reading, fix 5 is a multipath jump.
    let fixes = [
        (46.55800, 7.83500, 5.0, 1000.0),
        (46.55830, 7.83505, 4.0, 1004.0),
        (46.55831, 7.83505, 60.0, 1004.5),
        (46.55860, 7.83510, 5.0, 1009.0),
        (46.56500, 7.84200, 8.0, 1010.0),
        (46.55890, 7.83520, 6.0, 1006.0),
    ];

    println!("\n2. Feed {} fixes:", fixes.len());
    for (lat, lng, accuracy, altitude) in fixes {
        clock.advance(10_000);
        let sample = GeoSample::new(lat, lng, clock.now_millis())
            .with_accuracy(accuracy)
            .with_altitude(altitude);
        source.publish(SampleEvent::Fix(sample));
    }

    println!("\n3. Pause:");
    let _ = recorder.pause();
    clock.advance(120_000);

    let metrics = recorder.metrics();
    println!("\nMetrics:");
    println!("   Points:    {}", metrics.point_count);
    println!("   Distance:  {:.1} m", metrics.total_distance_meters);
    println!("   Gain/Loss: +{:.1} m / -{:.1} m", metrics.elevation_gain_meters, metrics.elevation_loss_meters);
    println!("   Elapsed:   {} s", metrics.elapsed_millis / 1000);
    println!("   Avg speed: {:.2} km/h", metrics.avg_speed_kmh);
    if let Some(bounds) = recorder.bounds() {
        let (lat, lng) = bounds.center();
        println!("   Center:    {:.5}, {:.5}", lat, lng);
    }

    println!("\n4. Restore from {}:", path.display());
    let restored = TrackRecorder::new(source.clone(), store, clock.clone());
    match restored.restore() {
        Ok(true) => println!(
            "   restored {} points, state {}",
            restored.metrics().point_count,
            restored.state()
        ),
        Ok(false) => println!("   nothing to restore"),
        Err(e) => println!("   restore failed: {}", e),
    }

    let _ = std::fs::remove_file(&path);
}
