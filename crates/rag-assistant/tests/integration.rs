use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

const ALPHA: &str = "Ferris is the Rust mascot. Cargo builds crates.";
const BETA: &str = "Python favours readability! Indentation is significant.";

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("nested")).unwrap();
    fs::write(files_dir.join("alpha.md"), ALPHA).unwrap();
    fs::write(files_dir.join("nested").join("beta.txt"), BETA).unwrap();
    fs::write(files_dir.join("ignored.png"), "not text").unwrap();

    let config_content = format!(
        r#"[store]
backend = "sqlite"
path = "{}/data/rag.sqlite"

[embedding]
provider = "mock"

[llm]
provider = "mock"

[chat]
persist = true

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn rag_command(config_path: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(rag_binary());
    cmd.arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("JINA_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = rag_command(config_path, args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", rag_binary(), e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Document ids printed by `rag upload` (`... id=<uuid>`).
fn uploaded_ids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split("id=").nth(1))
        .map(|id| id.trim().to_string())
        .collect()
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, again) = run_rag(&config_path, &["init"]);
    assert!(again, "second init failed (not idempotent)");
}

#[test]
fn test_upload_directory_and_list() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    let (stdout, stderr, success) =
        run_rag(&config_path, &["upload", files.to_str().unwrap()]);
    assert!(success, "upload failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(uploaded_ids(&stdout).len(), 2);
    assert!(stdout.contains("uploaded alpha.md"));
    assert!(stdout.contains("uploaded beta.txt"));
    assert!(!stdout.contains("ignored.png"));

    let (stdout, _, success) = run_rag(&config_path, &["documents"]);
    assert!(success);
    assert!(stdout.contains("alpha.md"));
    assert!(stdout.contains("beta.txt"));
    assert!(stdout.contains("Bytes"));
}

#[test]
fn test_upload_rejects_unsupported_file() {
    let (_tmp, config_path) = setup_test_env();
    let png = files_dir(&config_path).join("ignored.png");

    let (stdout, _, success) = run_rag(&config_path, &["upload", png.to_str().unwrap()]);
    assert!(!success, "uploading a .png should fail");
    assert!(stdout.contains("Unsupported file type"));

    let (stdout, _, _) = run_rag(&config_path, &["documents"]);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_upload_rejects_oversized_file() {
    let (_tmp, config_path) = setup_test_env();
    let big = files_dir(&config_path).join("big.txt");
    fs::write(&big, vec![b'a'; 10 * 1024 * 1024 + 1]).unwrap();

    let (stdout, _, success) = run_rag(&config_path, &["upload", big.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("File size exceeds 10MB limit"));
}

#[test]
fn test_get_and_delete() {
    let (_tmp, config_path) = setup_test_env();
    let alpha = files_dir(&config_path).join("alpha.md");

    let (stdout, _, success) = run_rag(&config_path, &["upload", alpha.to_str().unwrap()]);
    assert!(success);
    let id = uploaded_ids(&stdout).remove(0);

    let (stdout, stderr, success) = run_rag(&config_path, &["get", &id]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("filename:    alpha.md"));
    assert!(stdout.contains("--- Chunks (1) ---"));
    assert!(stdout.contains(ALPHA));

    let (stdout, _, success) = run_rag(&config_path, &["delete", &id]);
    assert!(success);
    assert!(stdout.contains("Deleted"));

    let (_, stderr, success) = run_rag(&config_path, &["get", &id]);
    assert!(!success);
    assert!(stderr.contains("document not found"));

    let (_, _, success) = run_rag(&config_path, &["delete", &id]);
    assert!(!success, "deleting twice should fail");
}

#[test]
fn test_search_finds_exact_chunk() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);
    let (_, _, success) = run_rag(&config_path, &["upload", files.to_str().unwrap()]);
    assert!(success);

    let (stdout, stderr, success) = run_rag(&config_path, &["search", ALPHA]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. [1.00] alpha.md (chunk 0)"), "{}", stdout);
}

#[test]
fn test_ask_uses_matching_document() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);
    run_rag(&config_path, &["upload", files.to_str().unwrap()]);

    let (stdout, stderr, success) = run_rag(&config_path, &["ask", ALPHA]);
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.starts_with("Based on the uploaded documents"));
    assert!(stdout.contains("Sources:"));
    assert!(stdout.contains("alpha.md"));
}

#[test]
fn test_ask_without_documents() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_rag(&config_path, &["ask", "What is Rust?"]);
    assert!(success);
    assert!(stdout.contains("I don't have any relevant information"));
}

#[test]
fn test_chat_repl_and_history() {
    let (_tmp, config_path) = setup_test_env();

    let mut child = rag_command(&config_path, &["chat"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"hello there\n/quit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("assistant> Hello! I'm your RAG Assistant."));
    assert!(stdout.contains("I don't have any relevant information"));

    let (stdout, _, success) = run_rag(&config_path, &["history"]);
    assert!(success);
    assert!(stdout.contains("you: hello there"));
    assert!(stdout.contains("assistant: I don't have any relevant information"));
}

#[test]
fn test_greet() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_rag(&config_path, &["greet", "hi there"]);
    assert!(success);
    assert_eq!(
        stdout.trim(),
        "Hello! You said: \"hi there\". How can I assist you further?"
    );

    let (_, _, success) = run_rag(&config_path, &["greet", "   "]);
    assert!(!success);
}

#[test]
fn test_greet_ignores_broken_config() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[embedding]\nprovider = \"local\"\n").unwrap();
    let (stdout, stderr, success) = run_rag(&config_path, &["greet", "hello"]);
    assert!(success, "greet failed: {}", stderr);
    assert!(stdout.contains("You said: \"hello\""));
}

#[test]
fn test_status_with_mock_providers() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_rag(&config_path, &["status"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("store:      sqlite"));
    assert!(stdout.contains("embedding:  mock"));
    assert!(!stdout.contains("Missing environment variables"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[embedding]\nprovider = \"local\"\n").unwrap();
    let (_, stderr, success) = run_rag(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"));
}
