//! Frame delivery across threads

use head_tracking::frame_adapter::{BufferedFrame, Frame, FrameAdapter, FrameCallback, FrameContent};
use head_tracking::types::{Face, MovingPoint, Point, Timestamp, INVALID_FACE_IDX};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

#[allow(clippy::cast_precision_loss)]
fn frame(index: u32) -> BufferedFrame {
    let x = index as f32;
    BufferedFrame {
        faces: vec![Face {
            point: MovingPoint::at(Point::new(x, 0.0, 600.0)),
            angle: Point::zeros(),
            raw_face_index: INVALID_FACE_IDX,
        }],
        timestamp: Timestamp::system(f64::from(index)),
        ..BufferedFrame::default()
    }
}

#[test]
fn test_polled_frames_are_never_torn() {
    let adapter = Arc::new(FrameAdapter::new(None, true));
    let writer = {
        let adapter = Arc::clone(&adapter);
        thread::spawn(move || {
            for i in 0..2000 {
                adapter.on_frame(&frame(i));
            }
        })
    };

    let mut last_ms = -1.0;
    while !writer.is_finished() {
        if let Some(polled) = adapter.get_frame().unwrap() {
            // Face and timestamp were written together
            assert_eq!(f64::from(polled.faces[0].point.pos.x), polled.timestamp.ms);
            assert!(polled.timestamp.ms >= last_ms);
            last_ms = polled.timestamp.ms;
        }
    }
    writer.join().unwrap();

    let polled = adapter.get_frame().unwrap().unwrap();
    assert_eq!(polled.timestamp.ms, 1999.0);
}

#[test]
fn test_callback_sees_borrowed_frame() {
    let last_ms = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&last_ms);
    let callback: FrameCallback = Box::new(move |frame: &dyn Frame| {
        assert_eq!(frame.faces().len(), 1);
        seen.store(frame.timestamp().ms.to_bits(), Ordering::SeqCst);
    });
    let adapter = FrameAdapter::new(Some(callback), false);
    assert!(!adapter.is_polling_enabled());

    adapter.on_frame(&frame(7));
    assert_eq!(f64::from_bits(last_ms.load(Ordering::SeqCst)), 7.0);
    assert!(adapter.get_frame().is_err());
}

#[test]
fn test_content_mask_drops_unrequested_parts() {
    let adapter = FrameAdapter::with_content(None, Some(FrameContent::PROFILING));
    adapter.on_frame(&frame(3));

    let polled = adapter.get_frame().unwrap().unwrap();
    assert!(polled.faces.is_empty());
    // Timestamps always travel with the frame
    assert_eq!(polled.timestamp.ms, 3.0);
}

#[test]
fn test_buffered_frame_copy() {
    let original = frame(11);
    let copy = BufferedFrame::from_frame(&original);
    assert_eq!(copy, original);
}
