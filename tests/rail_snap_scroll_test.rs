//! Snap and ramped-scroll behavior of the rail navigator.

use std::collections::HashSet;
use std::sync::Arc;

use railview::classes::TEXT_CLASS_ID;
use railview::layout::analyze;
use railview::rail::RailNav;
use railview::test_utils::{detections_from_rows, white_input, FakeDetector};
use railview::{BBox, Camera, Config, LayoutBlock, LineInfo, PageAnalysis, ScrollDir, Viewport};

fn text_classes() -> HashSet<usize> {
    [TEXT_CLASS_ID].into_iter().collect()
}

/// One 500x600 block on a 600x800 page with three detected lines.
fn single_block_analysis() -> Arc<PageAnalysis> {
    let lines = [130.0f32, 300.0, 500.0]
        .iter()
        .map(|&y| LineInfo { y, height: 20.0 })
        .collect();
    Arc::new(PageAnalysis {
        blocks: vec![LayoutBlock {
            bbox: BBox::new(50.0, 100.0, 500.0, 600.0),
            class_id: TEXT_CLASS_ID,
            confidence: 0.9,
            order: 0,
            lines,
        }],
        page_width: 600.0,
        page_height: 800.0,
    })
}

fn active_rail(zoom: f64) -> (RailNav, Camera, Viewport) {
    let mut nav = RailNav::new(Config::default());
    nav.set_analysis(single_block_analysis(), &text_classes());
    let mut cam = Camera::default();
    cam.set_zoom(zoom);
    cam.zoom_speed = 0.0;
    let viewport = Viewport::new(1000.0, 700.0);
    nav.update_zoom(&cam, viewport);
    (nav, cam, viewport)
}

#[test]
fn snap_lands_block_on_rail_and_line_on_center() {
    let (mut nav, mut cam, viewport) = active_rail(4.0);
    assert!(nav.active());

    cam.offset_x = 40.0;
    cam.offset_y = -350.0;
    nav.start_snap_to_current(&cam, viewport);

    let mut guard = 0;
    while nav.tick(&mut cam, 0.016, viewport) {
        guard += 1;
        assert!(guard < 100, "snap never completed");
    }

    // Target: block left edge at 5% of viewport width, line 130 at mid
    // viewport height.
    assert!((cam.offset_x - -150.0).abs() < 1e-9);
    assert!((cam.offset_y - -170.0).abs() < 1e-9);

    let block_left_screen = cam.offset_x + 50.0 * 4.0;
    assert!((block_left_screen - 1000.0 * 0.05).abs() <= 1.0);
    let line_center_screen = cam.offset_y + 130.0 * 4.0;
    assert!((line_center_screen - 700.0 / 2.0).abs() <= 1.0);
}

#[test]
fn snap_eases_monotonically_toward_target() {
    let (mut nav, mut cam, viewport) = active_rail(4.0);
    cam.offset_x = 40.0;
    cam.offset_y = -350.0;
    nav.start_snap_to_current(&cam, viewport);

    let mut last_x = cam.offset_x;
    let mut last_y = cam.offset_y;
    for _ in 0..10 {
        nav.tick(&mut cam, 0.02, viewport);
        assert!(cam.offset_x <= last_x);
        assert!(cam.offset_y >= last_y);
        last_x = cam.offset_x;
        last_y = cam.offset_y;
    }
    // Cubic ease-out covers most of the distance in the first third.
    let progress = (40.0 - cam.offset_x) / (40.0 - -150.0);
    assert!(progress > 0.7, "eased progress was only {progress}");
}

#[test]
fn ramp_displacement_matches_closed_form_during_ramp() {
    // s_start=10, s_max=50, ramp=1.5: D(0.75) = 7.5 + 2.5 = 10 points.
    let (mut nav, mut cam, viewport) = active_rail(4.0);
    cam.offset_x = -100.0;
    nav.start_scroll(ScrollDir::Forward, cam.offset_x);
    nav.tick(&mut cam, 0.75, viewport);
    assert!((cam.offset_x - (-100.0 - 10.0 * 4.0)).abs() < 1e-9);
}

#[test]
fn ramp_displacement_matches_closed_form_past_ramp() {
    // D(3.0) = 15 + 20 + 75 = 110 points.
    let (mut nav, mut cam, viewport) = active_rail(4.0);
    cam.offset_x = -100.0;
    nav.start_scroll(ScrollDir::Forward, cam.offset_x);
    nav.tick(&mut cam, 3.0, viewport);
    assert!((cam.offset_x - (-100.0 - 110.0 * 4.0)).abs() < 1e-9);
}

#[test]
fn backward_scroll_moves_camera_positive() {
    let (mut nav, mut cam, viewport) = active_rail(4.0);
    cam.offset_x = -540.0;
    nav.start_scroll(ScrollDir::Backward, cam.offset_x);
    nav.tick(&mut cam, 0.75, viewport);
    assert!((cam.offset_x - (-540.0 + 10.0 * 4.0)).abs() < 1e-9);
}

#[test]
fn scroll_position_is_independent_of_frame_pacing() {
    let partitions: [&[f64]; 3] = [
        &[2.2],
        &[0.016; 100],        // sums to 1.6, see below
        &[0.5, 0.5, 0.5, 0.7],
    ];

    // Two partitions of the same total must land on the same position.
    let run = |dts: &[f64]| {
        let (mut nav, mut cam, viewport) = active_rail(4.0);
        cam.offset_x = -100.0;
        nav.start_scroll(ScrollDir::Forward, cam.offset_x);
        for &dt in dts {
            nav.tick(&mut cam, dt, viewport);
        }
        cam.offset_x
    };

    let a = run(partitions[0]);
    let c = run(partitions[2]);
    assert!(
        ((a - c) / a).abs() < 1e-9,
        "partitioned holds diverged: {a} vs {c}"
    );

    // And displacement is monotonic in hold time.
    let short = run(partitions[1]);
    assert!(short > a, "1.6s hold should displace less than 2.2s hold");
}

#[test]
fn zero_detections_leave_rail_inactive_at_any_zoom() {
    let mut det = FakeDetector::new(Some(detections_from_rows(7, &[])));
    let input = white_input(600, 800, 600.0, 800.0);
    let analysis = analyze(&mut det, &input).unwrap();
    assert!(analysis.blocks.is_empty());

    let mut nav = RailNav::new(Config::default());
    nav.set_analysis(Arc::new(analysis), &text_classes());
    assert_eq!(nav.navigable_count(), 0);

    let mut cam = Camera::default();
    cam.set_zoom(5.0);
    nav.update_zoom(&cam, Viewport::new(1000.0, 700.0));
    assert!(!nav.active());
}

#[test]
fn scroll_stops_at_block_edges() {
    let (mut nav, mut cam, viewport) = active_rail(4.0);
    cam.offset_x = -100.0;
    nav.start_scroll(ScrollDir::Forward, cam.offset_x);
    // A very long hold runs the camera into the clamp: the block's padded
    // right edge pins to the right viewport edge.
    nav.tick(&mut cam, 120.0, viewport);
    let padded_right = 550.0 + 0.05 * 500.0;
    assert!((cam.offset_x - (viewport.w - padded_right * 4.0)).abs() < 1e-9);
}
