use clap::Parser;
use portcullis_auth::saml::SamlArgs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct PortcullisArgs {
    /// Path to the config file.
    #[arg(short, long)]
    pub config: PathBuf,

    #[command(flatten)]
    pub saml: SamlArgs,
}

#[test]
fn saml_path_flag() {
    let args = PortcullisArgs::try_parse_from(["portcullis", "-c", "portcullis.yaml", "--saml-path", "/etc/saml"]).unwrap();
    assert_eq!(args.config, PathBuf::from("portcullis.yaml"));
    assert_eq!(args.saml.saml_path, Some(PathBuf::from("/etc/saml")));

    let args = PortcullisArgs::try_parse_from(["portcullis", "--config", "p.yaml"]).unwrap();
    assert_eq!(args.saml.saml_path, None);

    assert!(PortcullisArgs::try_parse_from(["portcullis"]).is_err());
}
