use opl_bridge::{ring_buffer_session, OfflineHost, SessionConfig, RENDER_QUANTUM_FRAMES};
use serde_json::json;

const QUANTUM_SAMPLES: usize = RENDER_QUANTUM_FRAMES * 2;

#[test]
fn two_blocks_then_silence() {
    let (controller, session) = ring_buffer_session(&SessionConfig::default()).unwrap();
    controller.push_samples(vec![0.1; QUANTUM_SAMPLES]).unwrap();
    controller.push_samples(vec![0.2; QUANTUM_SAMPLES]).unwrap();

    let mut host = OfflineHost::new(session);
    let out = host.render_quanta(3);
    assert!(out[..QUANTUM_SAMPLES].iter().all(|&s| s == 0.1));
    assert!(out[QUANTUM_SAMPLES..2 * QUANTUM_SAMPLES].iter().all(|&s| s == 0.2));
    assert!(out[2 * QUANTUM_SAMPLES..].iter().all(|&s| s == 0.0));
}

#[test]
fn output_preserves_push_order_across_odd_chunk_sizes() {
    let (controller, session) = ring_buffer_session(&SessionConfig::default()).unwrap();
    let total = 3 * QUANTUM_SAMPLES;
    let samples: Vec<f32> = (0..total).map(|i| i as f32).collect();
    for chunk in samples.chunks(90) {
        controller.push_samples(chunk.to_vec()).unwrap();
    }

    let mut host = OfflineHost::new(session);
    assert_eq!(host.render_quanta(3), samples);
    assert!(host.processor().queue().is_empty());
}

#[test]
fn wire_messages_drive_the_queue() {
    let (controller, session) = ring_buffer_session(&SessionConfig::default()).unwrap();
    let mut host = OfflineHost::new(session);

    controller.post_message(&json!(vec![0.5; QUANTUM_SAMPLES * 2])).unwrap();
    let first = host.render_quanta(1);
    assert!(first.iter().all(|&s| s == 0.5));

    assert!(controller.post_message(&json!("CLEAR")).unwrap());
    assert!(host.render_quanta(1).iter().all(|&s| s == 0.0));
}

#[test]
fn samples_pushed_from_another_thread_arrive_in_order() {
    let (controller, session) = ring_buffer_session(&SessionConfig::default()).unwrap();
    let producer = std::thread::spawn(move || {
        for block in 0..4 {
            controller
                .push_samples(vec![block as f32; QUANTUM_SAMPLES])
                .unwrap();
        }
    });
    producer.join().unwrap();

    let mut host = OfflineHost::new(session);
    let out = host.render_quanta(4);
    for (block, samples) in out.chunks_exact(QUANTUM_SAMPLES).enumerate() {
        assert!(samples.iter().all(|&s| s == block as f32));
    }
}
