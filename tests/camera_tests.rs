use glam::{Mat4, Vec3};
use mesh_viewer::camera::{
    Camera, CameraMovement, MAX_ZOOM, MIN_ZOOM, PITCH_LIMIT,
};

const EPSILON: f32 = 1e-5;

#[test]
fn front_stays_unit_and_orthogonal_across_orientations() {
    for yaw_step in -6..=6 {
        for pitch_step in -5..=5 {
            let yaw = yaw_step as f32 * 30.0;
            let pitch = pitch_step as f32 * 17.0;
            let camera = Camera::with_orientation(Vec3::ZERO, yaw, pitch);

            assert!(
                (camera.front().length() - 1.0).abs() < EPSILON,
                "front not unit length at yaw {yaw}, pitch {pitch}"
            );
            assert!(
                camera.front().dot(camera.up()).abs() < EPSILON,
                "front not orthogonal to up at yaw {yaw}, pitch {pitch}"
            );
            assert!(
                camera.front().dot(camera.right()).abs() < EPSILON,
                "front not orthogonal to right at yaw {yaw}, pitch {pitch}"
            );
            assert!(
                camera.up().dot(camera.right()).abs() < EPSILON,
                "up not orthogonal to right at yaw {yaw}, pitch {pitch}"
            );
        }
    }
}

#[test]
fn constrained_pitch_never_leaves_the_limits() {
    let mut camera = Camera::new(Vec3::ZERO);

    for _ in 0..100 {
        camera.process_mouse_movement(3.0, 500.0, true);
        assert!(camera.pitch() <= PITCH_LIMIT);
    }
    assert_eq!(camera.pitch(), PITCH_LIMIT);

    for _ in 0..100 {
        camera.process_mouse_movement(-3.0, -500.0, true);
        assert!(camera.pitch() >= -PITCH_LIMIT);
    }
    assert_eq!(camera.pitch(), -PITCH_LIMIT);
}

#[test]
fn unconstrained_pitch_may_pass_the_poles() {
    let mut camera = Camera::new(Vec3::ZERO);
    camera.process_mouse_movement(0.0, 2000.0, false);
    assert!(camera.pitch() > PITCH_LIMIT);
    // The basis is still well-formed even upside down.
    assert!((camera.front().length() - 1.0).abs() < EPSILON);
}

#[test]
fn view_matrix_matches_look_at() {
    let camera = Camera::new(Vec3::new(0.0, 0.0, 3.0));
    let expected = Mat4::look_at_rh(
        Vec3::new(0.0, 0.0, 3.0),
        Vec3::new(0.0, 0.0, 2.0),
        Vec3::Y,
    );

    let view = camera.view_matrix();
    for (got, want) in view
        .to_cols_array()
        .iter()
        .zip(expected.to_cols_array().iter())
    {
        assert!((got - want).abs() < EPSILON, "view {view:?} != {expected:?}");
    }
}

#[test]
fn scroll_pins_at_both_zoom_bounds() {
    let mut camera = Camera::new(Vec3::ZERO);

    for _ in 0..50 {
        camera.process_mouse_scroll(5.0);
        assert!(camera.zoom() >= MIN_ZOOM);
    }
    assert_eq!(camera.zoom(), MIN_ZOOM);

    for _ in 0..50 {
        camera.process_mouse_scroll(-5.0);
        assert!(camera.zoom() <= MAX_ZOOM);
    }
    assert_eq!(camera.zoom(), MAX_ZOOM);
}

#[test]
fn mouse_offsets_scale_by_sensitivity() {
    let mut camera = Camera::new(Vec3::ZERO);
    let yaw_before = camera.yaw();

    camera.process_mouse_movement(10.0, 0.0, true);
    // Default sensitivity is 0.1.
    assert!((camera.yaw() - yaw_before - 1.0).abs() < EPSILON);
}

#[test]
fn movement_is_scaled_by_delta_time() {
    let mut fast = Camera::new(Vec3::ZERO);
    let mut slow = Camera::new(Vec3::ZERO);

    fast.process_keyboard(CameraMovement::Forward, 1.0);
    slow.process_keyboard(CameraMovement::Forward, 0.25);

    assert!((fast.position.length() - 4.0 * slow.position.length()).abs() < EPSILON);
}

#[test]
fn opposite_movements_cancel() {
    let mut camera = Camera::new(Vec3::new(1.0, 2.0, 3.0));
    camera.process_keyboard(CameraMovement::Left, 0.5);
    camera.process_keyboard(CameraMovement::Right, 0.5);
    assert!((camera.position - Vec3::new(1.0, 2.0, 3.0)).length() < EPSILON);
}
