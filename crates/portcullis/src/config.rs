use portcullis_auth::fs_backend;
use portcullis_server::ServiceConfig;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    /// Folder with the SAML `settings.json`. `--saml-path` takes precedence.
    #[serde(default)]
    pub saml_path: Option<PathBuf>,
    #[serde(flatten)]
    pub auth_config: fs_backend::Config,
}

#[test]
fn parse_config() {
    let config: Config = serde_yaml::from_str(
        r#"
service:
  address: "127.0.0.1:3141"
  metrics_address: "127.0.0.1:9141"
  session_secret: "0123456789abcdef0123456789abcdef"
  token_lifetime_days: 7
  host_routes:
    - { name: "/{user}/{index}/+api", pattern: "/{user}/{index}/+api" }
saml_path: /etc/portcullis/saml
auth_path: /var/lib/portcullis
auth_tokens_pepper: AAAAAAAAAAAAAAAAAAAAAAAA
"#,
    )
    .unwrap();

    assert_eq!(config.service.address.port(), 3141);
    assert_eq!(config.service.token_lifetime_days, 7);
    assert!(config.service.create_users_on_demand);
    assert!(config.service.secure_cookies);
    assert_eq!(config.service.host_routes.len(), 1);
    assert_eq!(config.saml_path, Some(PathBuf::from("/etc/portcullis/saml")));
    assert_eq!(config.auth_config.auth_path, PathBuf::from("/var/lib/portcullis"));
    assert_eq!(config.auth_config.auth_tokens_pepper, [0; 18]);
}

#[test]
fn minimal_config_uses_defaults() {
    let config: Config = serde_yaml::from_str(
        r#"
service:
  address: "0.0.0.0:3141"
  metrics_address: "0.0.0.0:9141"
  session_secret: "0123456789abcdef0123456789abcdef"
auth_path: data
auth_tokens_pepper: AAAAAAAAAAAAAAAAAAAAAAAA
"#,
    )
    .unwrap();

    assert_eq!(config.saml_path, None);
    assert_eq!(config.service.token_lifetime_days, 365);
    assert_eq!(config.service.host_routes, portcullis_server::routes::default_host_routes());
}
