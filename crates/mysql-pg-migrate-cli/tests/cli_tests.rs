//! CLI integration tests for mysql-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! the offline `plan` command, and exit codes for error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mysql-pg-migrate binary, isolated from the
/// caller's MYSQL_* / PG_* environment.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("mysql-pg-migrate").unwrap();
    for var in [
        "MYSQL_HOST",
        "MYSQL_PORT",
        "MYSQL_USER",
        "MYSQL_PASSWORD",
        "MYSQL_DATABASE",
        "PG_HOST",
        "PG_PORT",
        "PG_USER",
        "PG_PASSWORD",
        "PG_DATABASE",
        "PG_SCHEMA",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

const CONNECTIONS: &str = r#"
source:
  host: mysql.local
  database: legacy
  user: app
target:
  host: pg.local
  database: smartirb
  user: app
"#;

fn config_file(tables: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{}", CONNECTIONS).unwrap();
    writeln!(file, "{}", tables).unwrap();
    file
}

const STATE_AND_USER: &str = r#"
migration:
  tables:
    - source_table: state
      target_table: state
      key_remap: { source_field: id, target_column: id }
      columns:
        - { name: name, data_type: varchar }
        - { name: abbreviation, data_type: varchar }
    - source_table: user
      target_table: user
      columns:
        - { name: login, data_type: varchar }
        - { name: state_id, data_type: integer, nullable: true }
      foreign_keys:
        - { column: state_id, references_table: state, references_field: id }
"#;

const USER_BEFORE_STATE: &str = r#"
migration:
  tables:
    - source_table: user
      target_table: user
      columns:
        - { name: state_id, data_type: integer }
      foreign_keys:
        - { column: state_id, references_table: state, references_field: id }
    - source_table: state
      target_table: state
      key_remap: { source_field: id, target_column: id }
      columns:
        - { name: name, data_type: varchar }
"#;

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("scaffold"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--target-schema"));
}

#[test]
fn test_scaffold_requires_table() {
    cmd()
        .args(["scaffold"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--table"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mysql-pg-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_listed() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--env-file"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "plan"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  host: mysql.local").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("source.database is required"));
}

#[test]
fn test_dependency_order_violation_exits_with_code_1() {
    let file = config_file(USER_BEFORE_STATE);

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("migrated later"));
}

#[test]
fn test_run_without_tables_exits_with_code_1() {
    let file = config_file("");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("at least one table"));
}

#[test]
fn test_run_unknown_table_exits_with_code_1() {
    let file = config_file(STATE_AND_USER);

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "run",
            "--table",
            "county",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not configured"));
}

#[test]
fn test_bad_scaffold_pair_exits_with_code_1() {
    let file = config_file("");

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "scaffold",
            "--table",
            "state:",
        ])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_port_override_exits_with_code_1() {
    let file = config_file(STATE_AND_USER);

    cmd()
        .env("PG_PORT", "not-a-port")
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("PG_PORT"));
}

#[test]
fn test_missing_env_file_exits_with_code_1() {
    let file = config_file(STATE_AND_USER);

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--env-file",
            "no_such.env",
            "plan",
        ])
        .assert()
        .code(1);
}

// =============================================================================
// Plan Tests
// =============================================================================

#[test]
fn test_plan_prints_inserts_in_order() {
    let file = config_file(STATE_AND_USER);

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. state -> public.state"))
        .stdout(predicate::str::contains(
            "INSERT INTO \"public\".\"state\" (\"name\", \"abbreviation\") VALUES ($1::text::varchar, $2::text::varchar) RETURNING \"id\"::text",
        ))
        .stdout(predicate::str::contains("2. user -> public.user"))
        .stdout(predicate::str::contains("resolves state_id -> state.id"));
}

#[test]
fn test_plan_uses_env_schema_override() {
    let file = config_file(STATE_AND_USER);

    cmd()
        .env("PG_SCHEMA", "smartirb")
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("state -> smartirb.state"));
}

#[test]
fn test_plan_output_json() {
    let file = config_file(STATE_AND_USER);

    let output = cmd()
        .args(["--config", file.path().to_str().unwrap(), "--output-json", "plan"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan[0]["source_table"], "state");
    assert_eq!(plan[1]["target"], "public.user");
    assert_eq!(plan[0]["records"], "id -> id");
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
