// Environment layering. Kept in its own test binary because it mutates
// process-wide environment variables.

use std::fs;

use vm_drs::config::Settings;

#[test]
fn test_environment_overrides_config_files() {
    let dir = std::env::temp_dir().join(format!("vm-drs-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("default.toml"),
        "[balancer]\nload_threshold = 10.0\nmemory_threshold = 80.0\ntarget_nodes = [\"pve9\"]\n",
    )
    .unwrap();

    std::env::set_var("CONFIG_PATH", &dir);
    std::env::set_var("DRS_BALANCER__TARGET_NODES", "a,b");
    std::env::set_var("DRS_BALANCER__LOAD_THRESHOLD", "25");
    std::env::set_var("DRS_STATUS_API__PORT", "9090");

    let loaded = Settings::load(None);

    for key in [
        "CONFIG_PATH",
        "DRS_BALANCER__TARGET_NODES",
        "DRS_BALANCER__LOAD_THRESHOLD",
        "DRS_STATUS_API__PORT",
    ] {
        std::env::remove_var(key);
    }
    fs::remove_dir_all(&dir).unwrap();

    let settings = loaded.unwrap();
    assert_eq!(settings.balancer.target_nodes, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(settings.balancer.load_threshold, 25.0);
    // Untouched file values survive.
    assert_eq!(settings.balancer.memory_threshold, 80.0);
    assert_eq!(settings.status_api.port, 9090);
    assert_eq!(settings.balancer.check_interval_secs, 300);
}
