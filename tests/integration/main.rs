//! Integration tests for the drover binary

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn drover() -> Command {
        cargo_bin_cmd!("drover")
    }

    fn write_spec(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("cluster.yaml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        drover()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cluster"));
    }

    #[test]
    fn version_displays() {
        drover()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("drover"));
    }

    #[test]
    fn up_missing_config_fails() {
        drover()
            .args(["up", "/nonexistent/cluster.yaml", "--yes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn up_invalid_yaml_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(&dir, "cluster_name: [unclosed");

        drover()
            .args(["up", path.to_str().unwrap(), "--yes", "--no-config-cache"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cluster config"));
    }

    #[test]
    fn up_unsupported_provider_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(
            &dir,
            "cluster_name: demo\nprovider:\n  type: nimbus\nauth:\n  ssh_user: ubuntu\n",
        );

        drover()
            .args(["up", path.to_str().unwrap(), "--yes", "--no-config-cache"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("nimbus"));
    }

    #[test]
    fn exec_rejects_screen_and_tmux() {
        drover()
            .args(["exec", "cluster.yaml", "uptime", "--screen", "--tmux"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot be used with"));
    }

    #[test]
    fn head_ip_without_cluster_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(
            &dir,
            "cluster_name: ghost\nprovider:\n  type: mock\nauth:\n  ssh_user: ubuntu\n",
        );

        drover()
            .args(["head-ip", path.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Head node not found"));
    }

    #[test]
    fn down_declines_without_yes() {
        // Non-interactive runs decline destructive prompts unless --yes
        let dir = TempDir::new().unwrap();
        let path = write_spec(
            &dir,
            "cluster_name: demo\nprovider:\n  type: mock\nauth:\n  ssh_user: ubuntu\n",
        );

        drover()
            .args(["down", path.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Aborted"));
    }

    #[test]
    fn verbose_flag_accepted() {
        drover()
            .args(["-vv", "up", "/nonexistent/cluster.yaml", "--yes"])
            .assert()
            .failure();
    }
}
