// tests/concurrency.rs
//
// Cross-thread properties of the oscillator pool and the engine split.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use spectral_canvas::{
    AudioBuffer, Color, OscillatorPool, PaintConfig, PaintEngine, PaintRenderer, Point,
    create_engine_controller, create_paint_engine,
};

fn render_blocks(renderer: &mut PaintRenderer, data: &mut [f32], blocks: usize) {
    for _ in 0..blocks {
        let mut buffer = AudioBuffer::new(data, 2);
        renderer.process_block(&mut buffer);
    }
}

/// Free stack and in-use slots never overlap and never exceed capacity.
fn assert_pool_invariants(engine: &PaintEngine) {
    let pool = engine.pool();
    let free: HashSet<usize> = engine.free_indices().iter().copied().collect();
    assert_eq!(free.len(), engine.free_indices().len(), "duplicate free index");

    let in_use: HashSet<usize> = (0..pool.capacity())
        .filter(|&i| pool.state(i).in_use())
        .collect();
    assert!(in_use.len() <= pool.capacity());
    assert!(free.is_disjoint(&in_use), "slot both free and in use");
    assert!(free.iter().all(|&i| i < pool.capacity()));
}

#[test]
fn test_swap_never_aliases_buffers() {
    let pool = Arc::new(OscillatorPool::new(16));
    let done = Arc::new(AtomicBool::new(false));

    let requester = {
        let pool = Arc::clone(&pool);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut accepted = 0usize;
            while !done.load(Ordering::Acquire) {
                if pool.request_buffer_swap() {
                    accepted += 1;
                }
            }
            accepted
        })
    };

    let mut swaps = 0usize;
    for _ in 0..100_000 {
        if pool.swap_buffers_if_pending() {
            swaps += 1;
        }
        let (front, back) = pool.buffer_indices();
        assert_ne!(front, back);
        assert!(front < 2 && back < 2);
    }
    done.store(true, Ordering::Release);

    let accepted = requester.join().unwrap();
    // Each accepted request is honoured by at most one swap.
    assert!(swaps <= accepted);
    let (front, back) = pool.buffer_indices();
    assert_ne!(front, back);
}

#[test]
fn test_stroke_flood_while_rendering() {
    let config = PaintConfig::default().with_max_oscillators(32);
    let (mut engine, mut renderer) = create_paint_engine(config);
    renderer.prepare_to_play(48_000.0, 128);
    let done = Arc::new(AtomicBool::new(false));

    let audio = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut data = vec![0.0f32; 128 * 2];
            let mut blocks = 0;
            while !done.load(Ordering::Acquire) {
                render_blocks(&mut renderer, &mut data, 1);
                assert!(data.iter().all(|s| s.is_finite()));
                blocks += 1;
            }
            // Let pending releases finish.
            render_blocks(&mut renderer, &mut data, 200);
            (renderer, blocks)
        })
    };

    for stroke in 0..20 {
        let y = -40.0 + stroke as f32 * 4.0;
        engine.begin_stroke(Point::new(-90.0, y), 0.9, Color::from_rgb(200, 40, 90));
        for step in 0..200 {
            let pressure = if step % 3 == 0 { 0.9 } else { 0.3 };
            engine.update_stroke(Point::new(-90.0 + step as f32 * 0.9, y), pressure);
            assert!(engine.pool().states().iter().filter(|s| s.in_use()).count() <= 32);
        }
        engine.end_stroke();
        assert_pool_invariants(&engine);
    }

    // Releases only reach the audio thread once their activation is published.
    while engine.has_pending_writes() {
        engine.flush_pending_writes();
        thread::yield_now();
    }
    done.store(true, Ordering::Release);

    let (_renderer, blocks) = audio.join().unwrap();
    assert!(blocks > 0);

    engine.flush_pending_writes();
    assert_eq!(engine.pool().active_count(), 0);
    assert_eq!(engine.regions().strokes().count(), 20);

    // Every slot is either free or waiting in the reclaim ring.
    engine.allocate_oscillator();
    assert_pool_invariants(&engine);
    assert_eq!(engine.free_indices().len(), 31);
}

#[test]
fn test_saturated_pool_prefers_releasing_slot() {
    let config = PaintConfig::default().with_max_oscillators(8);
    let (mut engine, mut renderer) = create_paint_engine(config);
    renderer.prepare_to_play(48_000.0, 128);
    let mut data = vec![0.0f32; 128 * 2];

    engine.begin_stroke(Point::new(0.0, 0.0), 1.0, Color::WHITE);
    for i in 0..8 {
        engine.update_stroke(Point::new(i as f32 * 5.0, 0.0), 1.0);
    }
    // Only the first activation fit in the first swap.
    render_blocks(&mut renderer, &mut data, 1);
    assert!(engine.flush_pending_writes());
    render_blocks(&mut renderer, &mut data, 1);
    assert_eq!(engine.pool().active_count(), 8);
    assert!(engine.free_indices().is_empty());

    // Slot 5 starts releasing; it must be chosen over sustaining slots.
    let voice = engine.pool().state(5).handle(5);
    assert!(engine.release_oscillator(voice));
    render_blocks(&mut renderer, &mut data, 1);

    assert_eq!(engine.find_best_oscillator_for_replacement(), 5);
    assert_eq!(engine.allocate_oscillator(), 5);
}

#[test]
fn test_controller_on_audio_thread() {
    let (mut client, mut controller) = create_engine_controller(PaintConfig::default());

    let audio = thread::spawn(move || {
        let mut data = vec![0.0f32; 512 * 2];
        let mut heard = false;
        for _ in 0..50 {
            let mut buffer = AudioBuffer::new(&mut data, 2);
            controller.process_block(&mut buffer);
            heard |= data.iter().any(|&s| s != 0.0);
            thread::yield_now();
        }
        (controller, heard)
    });

    client
        .begin_stroke(Point::new(0.0, 0.0), 0.8, Color::WHITE)
        .unwrap();
    for step in 0..10 {
        // A full queue only drops the sample.
        let _ = client.update_stroke(Point::new(step as f32, 0.0), 0.8);
    }
    client.end_stroke().unwrap();

    let (mut controller, _heard) = audio.join().unwrap();
    controller.process_commands();
    assert_eq!(controller.engine().regions().len(), 1);
    assert_eq!(controller.pending_commands(), 0);
}
