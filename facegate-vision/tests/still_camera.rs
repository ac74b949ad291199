use facegate_vision::{CameraError, CameraSource, FrameSource, StillCamera};
use image::{Rgb, RgbImage};

fn write_frame(dir: &std::path::Path, name: &str, shade: u8) {
    RgbImage::from_pixel(6, 4, Rgb([shade, shade, shade]))
        .save(dir.join(name))
        .unwrap();
}

#[test]
fn test_directory_frames_replay_in_name_order() {
    env_logger::try_init().ok();
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path(), "b.png", 20);
    write_frame(dir.path(), "a.png", 10);
    std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

    let mut camera = StillCamera::new(dir.path());
    let mut session = camera.open().unwrap();

    let first = session.read_frame().unwrap();
    assert_eq!(first.dimensions(), (6, 4));
    assert_eq!(first.get_pixel(0, 0).0, [10, 10, 10]);
    assert_eq!(session.read_frame().unwrap().get_pixel(0, 0).0, [20, 20, 20]);
    assert!(matches!(session.read_frame(), Err(CameraError::EndOfStream)));
}

#[test]
fn test_each_session_starts_over() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path(), "only.png", 99);
    let path = dir.path().join("only.png");

    let mut camera = StillCamera::new(&path);
    for _ in 0..2 {
        let mut session = camera.open().unwrap();
        assert_eq!(session.read_frame().unwrap().get_pixel(5, 3).0, [99, 99, 99]);
        assert!(matches!(session.read_frame(), Err(CameraError::EndOfStream)));
    }
}

#[test]
fn test_empty_directory_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let mut camera = StillCamera::new(dir.path());
    assert!(matches!(camera.open(), Err(CameraError::Unavailable(_))));
}

#[test]
fn test_undecodable_file_is_capture_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"definitely not png").unwrap();

    let mut session = StillCamera::new(&path).open().unwrap();
    assert!(matches!(session.read_frame(), Err(CameraError::Capture(_))));
}
