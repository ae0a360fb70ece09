use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;

fn pool(threads: usize) -> ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .expect("test pool")
}

#[test]
fn test_pipeline_preserves_submission_order() {
    let items: Vec<usize> = (0..200).collect();
    // Early items sleep longest so completion order is roughly reversed.
    let pipeline = Pipeline::spawn(pool(4), items.clone(), 3, "order", |&i| {
        std::thread::sleep(Duration::from_micros(((200 - i) * 20) as u64));
        i * 2
    })
    .unwrap();

    let results: Vec<usize> = pipeline.collect();
    let expected: Vec<usize> = items.iter().map(|i| i * 2).collect();
    assert_eq!(results, expected);
}

#[test]
fn test_pipeline_delivers_every_item() {
    let items: Vec<u32> = (0..1000).collect();
    let mut pipeline = Pipeline::spawn(pool(2), items, 100, "count", |&v| v).unwrap();
    assert_eq!(pipeline.expected(), 1000);

    let mut count = 0;
    for _ in pipeline.by_ref() {
        count += 1;
    }
    assert_eq!(count, 1000);
    assert!(pipeline.is_complete());
    assert_eq!(pipeline.received(), 1000);
}

#[test]
fn test_pipeline_empty_input() {
    let mut pipeline = Pipeline::spawn(pool(2), Vec::<u8>::new(), 10, "empty", |&v| v).unwrap();
    assert!(pipeline.next().is_none());
    assert!(pipeline.is_complete());
}

#[test]
fn test_pipeline_zero_loadsize_is_clamped() {
    let pipeline = Pipeline::spawn(pool(2), vec![1, 2, 3], 0, "clamp", |&v| v + 1).unwrap();
    assert_eq!(pipeline.collect::<Vec<_>>(), vec![2, 3, 4]);
}

#[test]
fn test_pipeline_early_drop_stops_producer() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    let items: Vec<usize> = (0..10_000).collect();

    let mut pipeline = Pipeline::spawn(pool(2), items, 4, "drop", move |&v| {
        counter.fetch_add(1, Ordering::SeqCst);
        v
    })
    .unwrap();

    assert_eq!(pipeline.next(), Some(0));
    drop(pipeline);

    // Window of 8 items plus one channel's worth: nowhere near the full input.
    assert!(
        processed.load(Ordering::SeqCst) < 100,
        "producer kept running after drop: {} items",
        processed.load(Ordering::SeqCst)
    );
}

#[test]
fn test_two_pipelines_zip_in_lockstep() {
    let a = Pipeline::spawn(pool(2), (0..50).collect::<Vec<i32>>(), 5, "a", |&v| v).unwrap();
    let b = Pipeline::spawn(pool(3), (0..50).collect::<Vec<i32>>(), 5, "b", |&v| -v).unwrap();

    for (x, y) in a.zip(b) {
        assert_eq!(x, -y);
    }
}

#[test]
fn test_pipeline_worker_panic_truncates_stream() {
    let items: Vec<usize> = (0..10).collect();
    let mut pipeline = Pipeline::spawn(pool(2), items, 10, "panic", |&v| {
        if v == 5 {
            panic!("bad item");
        }
        v
    })
    .unwrap();

    let delivered: Vec<usize> = pipeline.by_ref().collect();
    assert!(delivered.len() < 10);
    assert!(!pipeline.is_complete());
}
