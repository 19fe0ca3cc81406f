use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Isolated data directory and config file for one test
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn tessera(&self) -> Command {
        let mut cmd = Command::cargo_bin("tessera").unwrap();
        cmd.env("TESSERA_CONFIG", self.dir.path().join("config.toml"))
            .env_remove("RUST_LOG")
            .arg("--data-dir")
            .arg(self.dir.path().join("data"))
            .arg("--backend")
            .arg("redb");
        cmd
    }

    fn run(&self, args: &[&str]) {
        self.tessera().args(args).assert().success();
    }

    fn seed_shop(&self) {
        self.run(&["entity", "create", "databaseService", "mysql"]);
        self.run(&["entity", "create", "database", "shop", "--in", "mysql"]);
        self.run(&["entity", "create", "table", "orders", "--in", "mysql.shop"]);
    }
}

#[test]
fn test_create_and_get_json() {
    let sandbox = Sandbox::new();
    sandbox.seed_shop();

    sandbox
        .tessera()
        .args(["--format", "json", "entity", "get", "table", "mysql.shop.orders", "--fields", "*"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fully_qualified_name\": \"mysql.shop.orders\""))
        .stdout(predicate::str::contains("\"version\": 0.1"))
        .stdout(predicate::str::contains("\"name\": \"mysql.shop\""));
}

#[test]
fn test_duplicate_create_fails() {
    let sandbox = Sandbox::new();
    sandbox.seed_shop();

    sandbox
        .tessera()
        .args(["entity", "create", "table", "orders", "--in", "mysql.shop"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_patch_bumps_version() {
    let sandbox = Sandbox::new();
    sandbox.seed_shop();

    sandbox
        .tessera()
        .args([
            "--format",
            "json",
            "entity",
            "patch",
            "table",
            "mysql.shop.orders",
            "--patch",
            r#"[{"op": "add", "path": "/description", "value": "Customer orders"}]"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": 0.2"))
        .stdout(predicate::str::contains("MINOR_UPDATE"));

    sandbox
        .tessera()
        .args(["entity", "history", "table", "mysql.shop.orders"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.2"))
        .stdout(predicate::str::contains("0.1"))
        .stdout(predicate::str::contains("description"));
}

#[test]
fn test_negative_lineage_depth_fails() {
    let sandbox = Sandbox::new();
    sandbox.seed_shop();

    sandbox
        .tessera()
        .args(["lineage", "table", "mysql.shop.orders", "--upstream", "-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid upstream depth -1"));
}

#[test]
fn test_lineage_edges() {
    let sandbox = Sandbox::new();
    sandbox.seed_shop();
    sandbox.run(&["entity", "create", "table", "daily_revenue", "--in", "mysql.shop"]);
    sandbox.run(&[
        "relation",
        "add-lineage",
        "table:mysql.shop.orders",
        "table:mysql.shop.daily_revenue",
    ]);

    sandbox
        .tessera()
        .args(["lineage", "table", "mysql.shop.daily_revenue", "--upstream", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Upstream edges: 1"))
        .stdout(predicate::str::contains("mysql.shop.orders -> mysql.shop.daily_revenue"));
}

#[test]
fn test_delete_requires_force() {
    let sandbox = Sandbox::new();
    sandbox.seed_shop();

    sandbox
        .tessera()
        .args(["entity", "delete", "table", "mysql.shop.orders"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
    sandbox.run(&["entity", "get", "table", "mysql.shop.orders"]);

    sandbox
        .tessera()
        .args(["entity", "delete", "database", "mysql.shop", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not empty"));
}

#[test]
fn test_config_set_and_get() {
    let sandbox = Sandbox::new();

    sandbox.run(&["config", "set", "principal", "alice"]);
    sandbox
        .tessera()
        .args(["config", "get", "principal"])
        .assert()
        .success()
        .stdout(predicate::str::diff("alice\n"));

    sandbox
        .tessera()
        .args(["config", "set", "default_limit", "0"])
        .assert()
        .failure();
    sandbox
        .tessera()
        .args(["config", "get", "colour"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key"));
}

#[test]
fn test_completions() {
    let sandbox = Sandbox::new();

    sandbox
        .tessera()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tessera"));
}
