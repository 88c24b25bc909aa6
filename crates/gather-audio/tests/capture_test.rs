use gather_audio::{encode_pcm16, AudioError, AudioFrame, CapturePipeline, PushMicrophone};
use std::time::Duration;
use tokio::sync::mpsc;

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<AudioFrame>) -> AudioFrame {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("frame channel closed")
}

#[tokio::test]
async fn test_frames_are_fixed_size_and_ordered() {
    let (mic, feed) = PushMicrophone::new();
    let mut pipeline = CapturePipeline::new(Box::new(mic)).with_frame_size(4);
    pipeline.initialize().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    pipeline.start_capture(tx).unwrap();

    // Device blocks do not line up with frame boundaries
    assert!(feed.push(vec![0.1, 0.2, 0.3]));
    assert!(feed.push(vec![0.4, 0.5, 0.6, 0.7, 0.8, 0.9]));

    let first = next_frame(&mut rx).await;
    let second = next_frame(&mut rx).await;
    assert_eq!(first.sequence, 0);
    assert_eq!(first.data, encode_pcm16(&[0.1, 0.2, 0.3, 0.4]));
    assert_eq!(second.sequence, 1);
    assert_eq!(second.data, encode_pcm16(&[0.5, 0.6, 0.7, 0.8]));

    // The trailing sample stays buffered until the frame fills
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(pipeline.frames_emitted(), 2);
}

#[tokio::test]
async fn test_start_before_initialize_fails() {
    let (mic, _feed) = PushMicrophone::new();
    let mut pipeline = CapturePipeline::new(Box::new(mic));
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = pipeline.start_capture(tx).unwrap_err();
    assert!(matches!(err, AudioError::Device(_)));
    assert_eq!(pipeline.frames_emitted(), 0);
}

#[tokio::test]
async fn test_denied_microphone_surfaces_device_error() {
    let (mic, feed) = PushMicrophone::unavailable("permission denied");
    let mut pipeline = CapturePipeline::new(Box::new(mic));

    assert_eq!(
        pipeline.initialize().unwrap_err(),
        AudioError::Device("permission denied".to_string())
    );
    assert!(!pipeline.is_initialized());
    assert_eq!(feed.stats().acquisitions, 0);
}

#[tokio::test]
async fn test_lifecycle_is_idempotent() {
    let (mic, feed) = PushMicrophone::new();
    let mut pipeline = CapturePipeline::new(Box::new(mic));

    pipeline.initialize().unwrap();
    pipeline.initialize().unwrap();
    assert_eq!(feed.stats().acquisitions, 1);

    let (tx, _rx) = mpsc::unbounded_channel();
    pipeline.start_capture(tx.clone()).unwrap();
    // Restarting replaces the running capture
    pipeline.start_capture(tx).unwrap();
    assert_eq!(feed.stats().starts, 2);
    assert_eq!(feed.stats().stops, 1);

    pipeline.stop_capture();
    pipeline.stop_capture();
    assert!(!feed.is_live());
    assert_eq!(feed.stats().stops, 2);

    pipeline.teardown();
    pipeline.teardown();
    assert_eq!(feed.stats().releases, 1);
    assert!(!pipeline.is_initialized());
}

#[tokio::test]
async fn test_dropping_pipeline_releases_microphone() {
    let (mic, feed) = PushMicrophone::new();
    {
        let mut pipeline = CapturePipeline::new(Box::new(mic));
        pipeline.initialize().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        pipeline.start_capture(tx).unwrap();
    }
    assert!(!feed.is_live());
    assert_eq!(feed.stats().releases, 1);
}
