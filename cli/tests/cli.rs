use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;
use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn write_workflow(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

/// `aw` with the per-user config directory pointed at `config_home`.
fn aw_command(config_home: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("aw")?;
    cmd.env("XDG_CONFIG_HOME", config_home);
    cmd.env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn engines_lists_builtin_ids() -> Result<()> {
    let config_home = TempDir::new()?;
    aw_command(config_home.path())?
        .arg("engines")
        .assert()
        .success()
        .stdout(contains("claude"))
        .stdout(contains("codex"))
        .stdout(contains("copilot"))
        .stdout(contains("custom"))
        .stdout(contains("gemini"));
    Ok(())
}

#[test]
fn engines_json_is_machine_readable() -> Result<()> {
    let config_home = TempDir::new()?;
    let output = aw_command(config_home.path())?
        .args(["engines", "--json"])
        .output()?;
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value.as_array().map(Vec::len), Some(5));
    Ok(())
}

#[test]
fn compile_prints_pipeline_steps() -> Result<()> {
    let config_home = TempDir::new()?;
    let project = TempDir::new()?;
    let workflow = write_workflow(
        project.path(),
        "triage.md",
        "---\nengine: claude\nsafe-outputs:\n  create-issue:\n---\nTriage new issues.\n",
    )?;

    aw_command(config_home.path())?
        .arg("compile")
        .arg(&workflow)
        .assert()
        .success()
        .stdout(contains("- name: Setup Node.js"))
        .stdout(contains("- name: Setup MCPs"))
        .stdout(contains("- name: Execute Claude Code"))
        .stdout(contains("tee -a /tmp/gh-aw/agent-stdio.log"));
    Ok(())
}

#[test]
fn compile_engine_flag_overrides_workflow() -> Result<()> {
    let config_home = TempDir::new()?;
    let project = TempDir::new()?;
    let workflow = write_workflow(project.path(), "plain.md", "---\nengine: claude\n---\n")?;

    let output = aw_command(config_home.path())?
        .arg("compile")
        .arg(&workflow)
        .args(["--engine", "codex", "--log-file", "/tmp/run.log", "--json"])
        .output()?;
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["engine_id"], "codex");
    assert_eq!(value["sandbox_mode"], "direct");
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("tee -a /tmp/run.log"));
    Ok(())
}

#[test]
fn config_file_supplies_default_engine() -> Result<()> {
    let config_home = TempDir::new()?;
    let project = TempDir::new()?;
    let config = write_workflow(project.path(), "aw.toml", "default-engine = \"gemini\"\n")?;
    let workflow = write_workflow(project.path(), "unnamed.md", "---\n---\nPrompt\n")?;

    aw_command(config_home.path())?
        .arg("--config")
        .arg(&config)
        .arg("compile")
        .arg(&workflow)
        .assert()
        .success()
        .stdout(contains("- name: Execute Google Gemini CLI"));
    Ok(())
}

#[test]
fn unknown_engine_fails() -> Result<()> {
    let config_home = TempDir::new()?;
    let project = TempDir::new()?;
    let workflow = write_workflow(project.path(), "mystery.md", "---\nengine: mystery\n---\n")?;

    aw_command(config_home.path())?
        .arg("compile")
        .arg(&workflow)
        .assert()
        .failure()
        .stderr(contains("unknown engine `mystery`"));
    Ok(())
}

#[test]
fn missing_frontmatter_fails() -> Result<()> {
    let config_home = TempDir::new()?;
    let project = TempDir::new()?;
    let workflow = write_workflow(project.path(), "bare.md", "Just a prompt.\n")?;

    aw_command(config_home.path())?
        .arg("compile")
        .arg(&workflow)
        .assert()
        .failure()
        .stderr(contains("frontmatter"));
    Ok(())
}

#[test]
fn secrets_prints_one_name_per_line() -> Result<()> {
    let config_home = TempDir::new()?;
    let project = TempDir::new()?;
    let workflow = write_workflow(project.path(), "codex.md", "---\nengine: codex\n---\n")?;

    aw_command(config_home.path())?
        .arg("secrets")
        .arg(&workflow)
        .assert()
        .success()
        .stdout("CODEX_API_KEY\nOPENAI_API_KEY\n");
    Ok(())
}

#[test]
fn domains_include_engine_defaults_and_loopback() -> Result<()> {
    let config_home = TempDir::new()?;
    let project = TempDir::new()?;
    let workflow = write_workflow(
        project.path(),
        "net.md",
        "---\nengine: claude\nnetwork:\n  allowed: [python]\n---\n",
    )?;

    aw_command(config_home.path())?
        .arg("domains")
        .arg(&workflow)
        .assert()
        .success()
        .stdout(contains("  api.anthropic.com\n"))
        .stdout(contains("  pypi.org\n"))
        .stdout(contains("  localhost\n"));
    Ok(())
}
