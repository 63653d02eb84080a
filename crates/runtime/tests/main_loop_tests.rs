use std::io::Write;
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, Instant};

fn run_main(args: &[&str]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_runtime_main"))
        .args(args)
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .expect("Failed to spawn runtime_main process");

    // Wait for the process to complete, with a timeout
    let timeout = Duration::from_secs(30);
    let start = Instant::now();
    while child.try_wait().expect("Failed to poll runtime_main").is_none() {
        if start.elapsed() > timeout {
            child.kill().expect("Failed to kill timed-out process");
            panic!("runtime_main process timed out after {timeout:?}");
        }
        thread::sleep(Duration::from_millis(50));
    }
    child.wait_with_output().expect("Failed to collect runtime_main output")
}

#[test]
fn sphere_comes_to_rest() {
    let output = run_main(&["--threads", "1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    eprintln!("--- runtime_main STDOUT ---\n{stdout}");
    assert!(output.status.success(), "runtime_main exited with {:?}", output.status.code());
    assert!(stdout.contains("Sphere came to rest"), "Expected log output not found in stdout.");
    assert!(stdout.contains("Final sphere position"));
}

#[test]
fn step_limit_and_settings_file_are_honored() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "physics": {{ "allow_sleeping": false }} }}"#).unwrap();
    let path = file.path().to_str().unwrap().to_owned();

    let output = run_main(&["--steps", "120", "--settings", &path, "--collision-steps", "2"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Step 60: sphere position"), "{stdout}");
    assert!(stdout.contains("Step 120: sphere position"), "{stdout}");
    assert!(stdout.contains("Sphere still moving after 120 steps"), "{stdout}");
}

#[test]
fn bad_settings_file_fails() {
    let output = run_main(&["--settings", "/definitely/not/here.json"]);
    assert!(!output.status.success());
}
