// src/main.rs

use spectral_canvas::{AudioBuffer, Color, PaintConfig, Point, create_engine_controller};

/// ===============================
/// Main
/// ===============================

fn main() {
    let sample_rate = 48_000.0;
    let block_frames = 256;

    // --------------------------------
    // Engine
    // --------------------------------

    let config = PaintConfig::default().with_audio(sample_rate, block_frames);
    let (mut client, mut controller) = create_engine_controller(config);

    // --------------------------------
    // Paint a rising stroke
    // --------------------------------

    client
        .begin_stroke(Point::new(-40.0, -20.0), 0.9, Color::from_rgb(255, 64, 0))
        .ok();
    for step in 0..8 {
        let t = step as f32;
        client
            .update_stroke(Point::new(-40.0 + t * 10.0, -20.0 + t * 5.0), 0.9)
            .ok();
    }

    let mut data = vec![0.0f32; block_frames * 2];

    println!("Starting paint engine sanity test…");

    for block in 0..8 {
        if block == 4 {
            client.end_stroke().ok();
        }

        let mut buffer = AudioBuffer::new(&mut data, 2);
        controller.process_block(&mut buffer);

        let peak = buffer
            .channel(0)
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        let readback = client.readback();
        println!(
            "Block {block}: {} oscillators, peak {peak:.3}, cpu {:.3}",
            readback.active_oscillators, readback.cpu_load
        );
    }

    // --------------------------------
    // Play the painted region back
    // --------------------------------

    client.set_playhead_position(0.4).ok();
    let mut buffer = AudioBuffer::new(&mut data, 2);
    controller.process_block(&mut buffer);

    println!(
        "Playhead at 0.4: {} regions, {} playback voices",
        controller.engine().regions().len(),
        controller.engine().playback_voice_count()
    );
    println!("Sanity test completed.");
}
