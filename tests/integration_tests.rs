use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

fn clip_squeeze() -> Command {
    let mut cmd = Command::cargo_bin("clip-squeeze").unwrap();
    cmd.env_remove("CLIP_SQUEEZE_TOKEN").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    clip_squeeze()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("upload"));
}

#[test]
fn test_subcommand_help() {
    for subcommand in ["validate", "compress", "upload"] {
        clip_squeeze().args([subcommand, "--help"]).assert().success();
    }
}

#[test]
fn test_compress_missing_args() {
    clip_squeeze().arg("compress").assert().failure();
}

#[test]
fn test_compress_nonexistent_file() {
    let temp = TempDir::new().unwrap();
    clip_squeeze()
        .args(["compress", "nonexistent.mp4"])
        .arg(temp.child("out.mp4").path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_compress_rejects_out_of_range_quality_factor() {
    let temp = TempDir::new().unwrap();
    let input = temp.child("clip.mp4");
    input.write_binary(b"not really a video").unwrap();

    clip_squeeze()
        .args(["compress", "--crf", "40"])
        .arg(input.path())
        .arg(temp.child("out.mp4").path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("40"));
}

#[test]
fn test_compress_fake_image_fails_cleanly() {
    let temp = TempDir::new().unwrap();
    let input = temp.child("photo.jpg");
    input.write_binary(b"fake image data").unwrap();

    clip_squeeze()
        .args(["compress"])
        .arg(input.path())
        .arg(temp.child("out.jpg").path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn test_validate_accepts_small_media() {
    let temp = TempDir::new().unwrap();
    temp.child("a.png").write_binary(&[0u8; 1024]).unwrap();
    temp.child("b.mp4").write_binary(&[0u8; 2048]).unwrap();
    temp.child("notes.txt").write_str("ignored").unwrap();

    clip_squeeze()
        .arg("validate")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("a.png"))
        .stdout(predicate::str::contains("b.mp4"))
        .stdout(predicate::str::contains("notes.txt").not());
}

#[test]
fn test_validate_rejects_oversized_image() {
    let temp = TempDir::new().unwrap();
    let big = temp.child("huge.jpg");
    big.write_binary(&vec![0u8; 11 * 1024 * 1024]).unwrap();

    clip_squeeze()
        .arg("validate")
        .arg(big.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Image must be less than 10MB"));
}

#[test]
fn test_validate_recursive() {
    let temp = TempDir::new().unwrap();
    temp.child("season/week1/dunk.mov").write_binary(&[1u8; 64]).unwrap();

    clip_squeeze().arg("validate").arg(temp.path()).assert().failure();
    clip_squeeze()
        .args(["validate", "-r"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("dunk.mov"));
}

#[test]
fn test_validate_empty_directory() {
    let temp = TempDir::new().unwrap();
    clip_squeeze()
        .arg("validate")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No media files found"));
}

#[test]
fn test_upload_requires_intent_and_target() {
    let temp = TempDir::new().unwrap();
    temp.child("a.png").write_binary(&[0u8; 16]).unwrap();

    clip_squeeze().arg("upload").arg(temp.path()).assert().failure();
    clip_squeeze()
        .args(["upload", "--intent", "banner", "--target", "athlete-1"])
        .arg(temp.path())
        .assert()
        .failure();
}

#[test]
fn test_bad_config_file() {
    let temp = TempDir::new().unwrap();
    let config = temp.child("clip-squeeze.toml");
    config.write_str("[video]\nquality_factor = 99\n").unwrap();
    temp.child("a.png").write_binary(&[0u8; 16]).unwrap();

    clip_squeeze()
        .arg("--config")
        .arg(config.path())
        .arg("validate")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}
