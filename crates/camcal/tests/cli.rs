use assert_cmd::Command;
use predicates::prelude::*;

fn camcal() -> Command {
    Command::cargo_bin("camcal").expect("camcal binary")
}

#[test]
fn help_flag_prints_usage() {
    camcal()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--board-width"))
        .stdout(predicate::str::contains("--square-size"));
}

#[test]
fn no_arguments_prints_help_and_succeeds() {
    camcal()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn zero_board_width_is_rejected() {
    camcal()
        .args(["-w", "0", "-h", "6", "list.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("board width"));
}

#[test]
fn too_few_frames_is_rejected() {
    camcal()
        .args(["-w", "9", "-h", "6", "-n", "3", "list.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("greater than 3"));
}

#[test]
fn unknown_flag_is_rejected() {
    camcal().args(["-w", "9", "--bogus"]).assert().failure();
}

#[test]
fn circle_grids_have_no_detector() {
    camcal()
        .args(["-w", "4", "-h", "11", "--pattern", "acircles", "list.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no detector"));
}

#[test]
fn missing_input_reports_capture_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    camcal()
        .args(["-w", "9", "-h", "6"])
        .arg(dir.path().join("missing.avi"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not initialize video capture"));
}

#[test]
fn image_list_without_boards_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut names = Vec::new();
    for i in 0..4 {
        let path = dir.path().join(format!("blank{i}.png"));
        image::GrayImage::from_pixel(64, 48, image::Luma([128]))
            .save(&path)
            .expect("save");
        names.push(path.display().to_string());
    }
    let list = dir.path().join("list.json");
    std::fs::write(&list, serde_json::to_string(&names).expect("json")).expect("write list");
    let out = dir.path().join("camera.json");

    camcal()
        .args(["-w", "9", "-h", "6", "-o"])
        .arg(&out)
        .arg(&list)
        .assert()
        .success();
    assert!(!out.exists());
}
