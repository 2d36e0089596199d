use roverbus::camera::{PipelineManager, SimVideoBackend};

fn endpoints(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("10.0.0.7:{}", 5000 + i)).collect()
}

fn manager(pipelines: usize, devices: usize) -> PipelineManager<SimVideoBackend> {
    PipelineManager::new(SimVideoBackend::with_devices(devices), &endpoints(pipelines), devices)
}

#[test]
fn test_starts_with_no_assignments() {
    let manager = manager(4, 10);
    assert_eq!(manager.pipeline_count(), 4);
    assert_eq!(manager.active(), vec![-1, -1, -1, -1]);
}

#[test]
fn test_assigns_requested_devices() {
    let mut manager = manager(4, 10);
    let active = manager.change_cameras(&[0, 2, -1, 3]);
    assert_eq!(active, vec![0, 2, -1, 3]);
}

#[test]
fn test_requests_beyond_pipeline_count_are_ignored() {
    let mut manager = manager(2, 10);
    let active = manager.change_cameras(&[0, 1, 2, 3, 4]);
    assert_eq!(active, vec![0, 1]);
}

#[test]
fn test_short_request_stops_missing_pipelines() {
    let mut manager = manager(3, 10);
    manager.change_cameras(&[0, 1, 2]);

    // A request naming only pipeline 0 stops the others
    let active = manager.change_cameras(&[0]);
    assert_eq!(active, vec![0, -1, -1]);
}

#[test]
fn test_unknown_device_leaves_pipeline_stopped() {
    let mut manager = manager(2, 4);
    let active = manager.change_cameras(&[7, 1]);
    assert_eq!(active, vec![-1, 1]);
}

#[test]
fn test_same_device_shared_by_two_pipelines() {
    let mut manager = manager(3, 10);
    let active = manager.change_cameras(&[5, 5, -1]);
    assert_eq!(active, vec![5, 5, -1]);

    // Releasing one pipeline keeps the shared device streaming on the other
    let active = manager.change_cameras(&[-1, 5, -1]);
    assert_eq!(active, vec![-1, 5, -1]);
    manager.update_streams();
    assert_eq!(manager.active(), vec![-1, 5, -1]);
}

#[test]
fn test_reassignment_is_a_no_op_for_unchanged_pipelines() {
    let mut manager = manager(2, 10);
    manager.change_cameras(&[0, 1]);
    let active = manager.change_cameras(&[0, 2]);
    assert_eq!(active, vec![0, 2]);
}

#[test]
fn test_capture_failure_tears_down_every_user_of_the_device() {
    let mut backend = SimVideoBackend::with_devices(10);
    backend.fail_device(3);
    // Device 3 fails at open time, so it never streams
    let mut manager = PipelineManager::new(backend, &endpoints(3), 10);
    let active = manager.change_cameras(&[3, 3, 1]);
    assert_eq!(active, vec![-1, -1, 1]);
}

#[test]
fn test_capture_failure_mid_stream_stops_pipelines() {
    let mut manager = manager(3, 10);
    manager.change_cameras(&[2, 2, 1]);

    // Healthy pass leaves assignments alone
    manager.update_streams();
    assert_eq!(manager.active(), vec![2, 2, 1]);

    // Device 2 starts failing: both of its pipelines stop, device 1 stays
    manager.backend_mut().fail_device(2);
    manager.update_streams();
    assert_eq!(manager.active(), vec![-1, -1, 1]);
}

#[test]
fn test_failed_device_can_be_reassigned_after_recovery() {
    let mut manager = manager(2, 10);
    manager.change_cameras(&[4, -1]);
    manager.backend_mut().fail_device(4);
    manager.update_streams();
    assert_eq!(manager.active(), vec![-1, -1]);

    manager.backend_mut().restore_device(4);
    let active = manager.change_cameras(&[4, -1]);
    assert_eq!(active, vec![4, -1]);
}
