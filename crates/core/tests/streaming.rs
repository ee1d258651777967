use std::time::Duration;

use futures_util::StreamExt;
use rivulet_core::prelude::*;
use rivulet_core::test::{RecordingSink, RecordingTimer};
use rivulet_core::{BodyReceiver, Error};

async fn collect(mut receiver: BodyReceiver) -> (Vec<String>, Option<std::io::Error>) {
    let mut chunks = Vec::new();
    while let Some(chunk) = receiver.next().await {
        match chunk {
            Ok(chunk) => chunks.push(String::from_utf8(chunk.to_vec()).unwrap()),
            Err(e) => return (chunks, Some(e)),
        }
    }
    (chunks, None)
}

#[tokio::test]
async fn chunked_lines_arrive_in_order() {
    let (sender, receiver) = body_channel();
    let emitter = Emitter::new().with_timer(RecordingTimer::new());
    let session = emitter.open(sender, Mode::Synchronous).unwrap();
    let producer = Producer::iter((1..=5).map(|i| format!("Streaming text line {i}\n")))
        .pacing(Duration::from_millis(100));

    let reader = tokio::spawn(collect(receiver));
    emitter.run_producer(&session, producer).await.unwrap();
    let (chunks, error) = reader.await.unwrap();

    assert!(error.is_none());
    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks[0], "Streaming text line 1\n");
    assert_eq!(chunks[4], "Streaming text line 5\n");
    assert_eq!(session.status(), Status::Completed);
}

#[tokio::test]
async fn events_are_framed_and_numbered() {
    let pool = WorkerPool::new(PoolConfig::new());
    let (sender, receiver) = body_channel();
    let emitter = Emitter::new().with_pool(pool.clone());
    let session = emitter
        .open_framed(sender, Mode::Asynchronous, Framing::Event)
        .unwrap();
    let producer = Producer::iter(["a", "b", "c"].map(|s| StreamItem::text(s).tag("tick")));

    let handle = emitter.spawn_producer(&session, producer).unwrap();
    let (chunks, error) = collect(receiver).await;

    assert!(error.is_none());
    assert_eq!(
        chunks,
        vec![
            "event: tick\ndata: a\nid: 1\n\n",
            "event: tick\ndata: b\nid: 2\n\n",
            "event: tick\ndata: c\nid: 3\n\n",
        ]
    );
    assert_eq!(handle.join().await, Status::Completed);
    assert!(pool.shutdown(None).await);
}

#[tokio::test]
async fn client_disconnect_fails_the_session() {
    let pool = WorkerPool::new(PoolConfig::new());
    let (sender, mut receiver) = body_channel();
    let emitter = Emitter::new()
        .with_pool(pool)
        .with_timer(RecordingTimer::new());
    let session = emitter.open(sender, Mode::Asynchronous).unwrap();
    let producer = Producer::iter((0..1000).map(|i| format!("{i}\n")));

    let handle = emitter.spawn_producer(&session, producer).unwrap();
    let first = receiver.next().await.unwrap().unwrap();
    assert_eq!(&first[..], b"0\n");
    drop(receiver);

    assert_eq!(handle.join().await, Status::Failed);
    assert!(session.error().unwrap().is_emit());
    let err = session.emit(StreamItem::text("late")).await.unwrap_err();
    assert!(err.is_closed_session());
}

#[tokio::test]
async fn failure_aborts_the_body() {
    let (sender, receiver) = body_channel();
    let emitter = Emitter::new();
    let session = emitter.open(sender, Mode::Synchronous).unwrap();
    let items = futures_util::stream::iter(vec![
        Ok(StreamItem::text("a")),
        Err(std::io::Error::other("database went away")),
    ]);

    let reader = tokio::spawn(collect(receiver));
    let err = emitter
        .run_producer(&session, Producer::new(items))
        .await
        .unwrap_err();
    let (chunks, error) = reader.await.unwrap();

    assert!(matches!(err, Error::Producer(_)));
    assert_eq!(chunks, vec!["a"]);
    assert!(error.unwrap().to_string().contains("database went away"));
}

#[tokio::test]
async fn redundant_completion_is_absorbed() {
    let sink = RecordingSink::new();
    let emitter = Emitter::new();
    let session = emitter.open(sink.clone(), Mode::Synchronous).unwrap();
    emitter
        .run_producer(&session, Producer::iter(["a", "b", "c"]))
        .await
        .unwrap();

    // a second completion, as a `finally` block would issue, changes nothing
    assert!(!session.complete().await);
    assert!(!session.fail(Error::Cancelled).await);
    assert_eq!(session.status(), Status::Completed);
    assert!(session.error().is_none());
    assert_eq!(sink.writes(), vec!["a", "b", "c"]);
    assert_eq!(sink.closes(), 1);
    assert_eq!(sink.aborts(), 0);
}

#[tokio::test]
async fn panicking_producer_aborts_the_body() {
    let pool = WorkerPool::new(PoolConfig::new());
    let (sender, receiver) = body_channel();
    let emitter = Emitter::new().with_pool(pool);
    let session = emitter.open(sender, Mode::Asynchronous).unwrap();
    let items = futures_util::stream::iter(1..=3).map(|i| {
        if i == 2 {
            panic!("lost the cursor");
        }
        Ok::<_, std::io::Error>(format!("{i}\n"))
    });

    let handle = emitter
        .spawn_producer(&session, Producer::new(items))
        .unwrap();
    let (chunks, error) = collect(receiver).await;

    assert_eq!(chunks, vec!["1\n"]);
    assert!(error.unwrap().to_string().contains("lost the cursor"));
    assert_eq!(handle.join().await, Status::Failed);
    assert_eq!(session.status(), Status::Failed);
}

#[tokio::test(start_paused = true)]
async fn aborted_producer_aborts_the_body() {
    let pool = WorkerPool::new(PoolConfig::new());
    let (sender, receiver) = body_channel();
    let emitter = Emitter::new().with_pool(pool);
    let session = emitter.open(sender, Mode::Asynchronous).unwrap();
    let producer = Producer::iter((1..=10).map(|i| format!("{i}\n")))
        .pacing(Duration::from_secs(30));

    let handle = emitter.spawn_producer(&session, producer).unwrap();
    let reader = tokio::spawn(collect(receiver));
    tokio::time::sleep(Duration::from_secs(45)).await;
    handle.abort();

    let (chunks, error) = reader.await.unwrap();
    assert_eq!(chunks, vec!["1\n", "2\n"]);
    assert_eq!(error.unwrap().to_string(), "producer cancelled");
    assert_eq!(handle.join().await, Status::Failed);
    assert!(matches!(session.error(), Some(Error::Cancelled)));
}
