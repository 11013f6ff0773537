//! Interactive session workflows: detect, edit, re-threshold, remove, save

mod common;

use common::{dynamic, specked_frame, FakeUnet};
use spotless_film::{
    CanvasPoint, CanvasSize, ChangeSet, DustRemovalConfig, DustRemovalError, DustRemovalSession,
    InpaintMethod, MaskStatus, SessionChange, ToolMode,
};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

const CANVAS: CanvasSize = CanvasSize {
    width: 96.0,
    height: 96.0,
};

fn config() -> DustRemovalConfig {
    DustRemovalConfig::builder()
        .threshold(0.5)
        .window_size(32)
        .stride(16)
        .inpaint_method(InpaintMethod::Telea)
        .dilation_kernel(3)
        .brush_radius(3)
        .build()
        .unwrap()
}

fn session(backend: FakeUnet) -> DustRemovalSession {
    DustRemovalSession::new(config(), Box::new(backend), Handle::current()).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_editing_workflow() {
    let mut session = session(FakeUnet::darkness());
    session
        .set_image(&dynamic(specked_frame(96, 96, &[(20, 20), (70, 40)], 3)), None)
        .unwrap();

    session.start_detection().unwrap();
    assert!(!session.set_tool(ToolMode::Brush));
    session.wait_for_tasks_async().await;

    assert_eq!(session.mask_status(), MaskStatus::Detected);
    let mask = session.mask().unwrap();
    assert!(mask.is_on(21, 21));
    assert!(mask.is_on(71, 41));
    assert!(!mask.is_on(50, 80));
    assert_eq!(session.detection_progress(), 100);

    // Paint a new blot by hand; canvas and image share a 1:1 scale
    assert!(session.set_tool(ToolMode::Brush));
    assert!(session.begin_stroke());
    assert!(session.stroke_at(CanvasPoint::new(50.0, 80.0), CANVAS));
    session.end_stroke();
    assert_eq!(session.mask_status(), MaskStatus::Edited);
    assert!(session.mask().unwrap().is_on(50, 80));
    assert!(session.can_undo());

    session.start_removal().unwrap();
    session.wait_for_tasks_async().await;
    let result = session.result().unwrap();
    assert!(result.get_pixel(21, 21)[0] > 150);
    assert!(result.get_pixel(71, 41)[0] > 150);
    assert_eq!(result.get_pixel(5, 5)[0], 200);

    // Undo the hand-painted blot
    assert!(session.undo());
    assert!(!session.mask().unwrap().is_on(50, 80));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rethreshold_rebuilds_mask() {
    let mut session = session(FakeUnet::darkness());
    session
        .set_image(&dynamic(specked_frame(64, 64, &[(10, 10)], 4)), None)
        .unwrap();
    session.start_detection().unwrap();
    session.wait_for_tasks_async().await;
    let detected = session.mask().unwrap().count_on();

    // Grey background reads as ~0.22, so a low threshold flags everything
    session.set_threshold(0.1).unwrap();
    assert_eq!(session.mask().unwrap().count_on(), 64 * 64);
    session.set_threshold(0.5).unwrap();
    assert_eq!(session.mask().unwrap().count_on(), detected);
    assert_eq!(session.mask_status(), MaskStatus::Detected);

    assert!(session.set_threshold(1.0).is_err());
    assert!(session.set_threshold(0.0).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_detection_reports_error() {
    let mut session = session(FakeUnet::failing());
    session
        .set_image(&dynamic(specked_frame(32, 32, &[], 0)), None)
        .unwrap();
    session.start_detection().unwrap();
    session.wait_for_tasks_async().await;

    assert!(matches!(session.take_error(), Some(DustRemovalError::Inference(_))));
    assert_eq!(session.mask_status(), MaskStatus::Unset);
    assert!(!session.is_processing());
    assert!(session.can_detect());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_result_from_replaced_image_is_discarded() {
    let mut session = session(FakeUnet::darkness());
    session
        .set_image(&dynamic(specked_frame(64, 64, &[(10, 10)], 4)), None)
        .unwrap();
    session.start_detection().unwrap();
    session
        .set_image(&dynamic(specked_frame(48, 48, &[], 0)), None)
        .unwrap();
    session.wait_for_tasks_async().await;

    assert!(session.mask().is_none());
    assert_eq!(session.mask_status(), MaskStatus::Unset);
    assert_eq!(session.image_size().unwrap().width, 48);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_observers_receive_coalesced_changes() {
    let seen: Arc<Mutex<Vec<ChangeSet>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let mut session = session(FakeUnet::darkness());
    session.subscribe(Arc::new(move |changes: &ChangeSet| {
        sink.lock().unwrap().push(changes.clone());
    }));

    session.batch(|s| {
        s.set_brush_radius(12);
        s.set_overlay_opacity(0.3);
        s.zoom_in();
    });

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains(&SessionChange::View));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_save_result_next_to_source() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("roll1_frame07.png");
    specked_frame(48, 48, &[(24, 24)], 3).save(&input).unwrap();

    let mut session = session(FakeUnet::darkness());
    session.load_image(&input).unwrap();
    assert!(session.save_result(None).is_err());

    session.start_detection().unwrap();
    session.wait_for_tasks_async().await;
    session.start_removal().unwrap();
    session.wait_for_tasks_async().await;

    let saved = session.save_result(None).unwrap();
    assert!(saved.exists());
    assert_eq!(saved.parent(), input.parent());
    assert_ne!(saved, input);
}
