use std::fs;
use tempfile::TempDir;
use troupe::cli::StartArgs;
use troupe::config::Settings;

#[test]
fn test_load_file_and_agent_dir() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    fs::create_dir_all(root.join("config/agents"))?;

    let troupe_toml = r#"
[server]
host = "127.0.0.1"
port = 12010
capacity = 4
max_pool_size = 100

[client]
poll_interval_ms = 50

[[agents]]
id = "inline"
class = "EchoAgent"
"#;
    fs::write(root.join("troupe.toml"), troupe_toml)?;

    let agent_json = r#"{"id": "json_agent", "class": "EchoAgent", "args": {"name": "J"}}"#;
    fs::write(root.join("config/agents/one.json"), agent_json)?;

    let agent_yaml = r#"
id: yaml_agent
class: UserAgent
args:
  name: Y
"#;
    fs::write(root.join("config/agents/two.yaml"), agent_yaml)?;
    fs::write(root.join("config/agents/notes.txt"), "ignored")?;

    let settings = Settings::from_root(root.to_str().unwrap())?;
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, Some(12010));
    assert_eq!(settings.server.capacity, 4);
    assert_eq!(settings.server.max_pool_size, 100);
    assert_eq!(settings.server.max_expire_time, 7200);
    assert_eq!(settings.client.poll_interval_ms, 50);

    let mut ids: Vec<_> = settings.agents.iter().map(|a| a.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["inline", "json_agent", "yaml_agent"]);
    let yaml = settings.agents.iter().find(|a| a.id == "yaml_agent").unwrap();
    assert_eq!(yaml.args["name"], "Y");

    Ok(())
}

#[test]
fn test_cli_flags_win_over_file() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("custom.toml");
    fs::write(&config_path, "[server]\nport = 12010\ncapacity = 4\n")?;

    let args = StartArgs {
        port: Some(12020),
        max_expire_time: Some(60),
        ..Default::default()
    };
    let settings = Settings::new_with_cli(&config_path, &args)?;
    assert_eq!(settings.server.port, Some(12020));
    assert_eq!(settings.server.capacity, 4);
    assert_eq!(settings.server.max_expire_time, 60);
    Ok(())
}

#[test]
fn test_missing_file_uses_defaults() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let settings = Settings::new_with_cli(&temp_dir.path().join("absent.toml"), &StartArgs::default())?;
    assert_eq!(settings.server.host, "localhost");
    assert!(settings.server.port.is_none());
    assert!(settings.agents.is_empty());
    Ok(())
}

#[test]
fn test_invalid_settings_are_rejected() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    let troupe_toml = r#"
[server]
capacity = 0

[[agents]]
id = "twin"
class = "EchoAgent"

[[agents]]
id = "twin"
class = "EchoAgent"
"#;
    fs::write(root.join("troupe.toml"), troupe_toml)?;

    let err = Settings::from_root(root.to_str().unwrap()).unwrap_err().to_string();
    assert!(err.contains("server.capacity"));
    assert!(err.contains("twin"));
    Ok(())
}
