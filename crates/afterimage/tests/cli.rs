use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn afterimage(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_afterimage"));
    command.env("AFTERIMAGE_CONFIG_DIR", config_dir);
    command
}

#[test]
fn effects_lists_registry_and_params() {
    let root = TempDir::new().unwrap();
    let output = afterimage(root.path())
        .arg("effects")
        .output()
        .expect("failed to run afterimage effects");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["motion_blur", "random_paint", "ripple_fade", "ascii_trail"] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
    assert!(stdout.contains("char_width"));
}

#[test]
fn invalid_decay_is_rejected() {
    let root = TempDir::new().unwrap();
    let output = afterimage(root.path())
        .args(["render", "--output"])
        .arg(root.path().join("out.png"))
        .args(["--decay", "1.5"])
        .output()
        .expect("failed to run afterimage render");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("decay"), "unexpected stderr:\n{stderr}");
    assert!(!root.path().join("out.png").exists());
}

#[test]
fn config_file_in_config_dir_is_honoured() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("config.toml"), "effect = \"plasma\"\n").unwrap();

    let output = afterimage(root.path())
        .args(["render", "--output"])
        .arg(root.path().join("out.png"))
        .output()
        .expect("failed to run afterimage render");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown effect 'plasma'"), "unexpected stderr:\n{stderr}");
}

#[test]
fn render_writes_png() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("renders/trail.png");

    let output = afterimage(root.path())
        .args(["render", "--frames", "24", "--size", "96x64", "--effect", "ascii_trail"])
        .arg("--output")
        .arg(&path)
        .output()
        .expect("failed to run afterimage render");

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("adapter") || stderr.contains("GPU") {
            eprintln!("Skipping test: no GPU adapter found");
            return;
        }
        panic!("render failed:\n{stderr}");
    }

    let bytes = fs::read(&path).expect("png written");
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}
