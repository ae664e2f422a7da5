//! Merging config values with flags.

use super::parse;
use crate::cli::settings::{proxy_scheme, Settings};
use std::path::Path;
use std::time::Duration;
use tget_core::config::TgetConfig;

#[test]
fn config_defaults_apply_without_flags() {
    let cli = parse(&["tget", "-o", "/tmp/dl", "https://example.com/a"]);
    let s = Settings::resolve(&cli, &TgetConfig::default()).unwrap();
    assert_eq!(s.instances, 5);
    assert!(s.spawn_tor);
    assert!(s.ports.is_empty());
    assert_eq!(s.run_options.concurrency_per_channel, 10);
    assert_eq!(s.proxy.scheme, "socks5h");
    assert_eq!(s.probe.deadline, None);
    assert_eq!(s.out_dir, Path::new("/tmp/dl"));
    let agent = s.template.user_agent.as_deref().unwrap();
    assert!(agent.starts_with("tget/"));
    assert!(!s.channel_options.insecure_tls);
}

#[test]
fn flags_override_config() {
    let mut cfg = TgetConfig::default();
    cfg.proxy.ports = vec![9000];
    cfg.http.user_agent = Some("from-config".to_string());
    let cli = parse(&[
        "tget", "-n", "0", "--concurrency", "0", "-p", "9100", "-S", "socks5", "--host", "tor.lan",
        "-T", "20", "-U", "from-flag", "-k", "--continue", "-f", "-H", "Accept: text/plain",
        "https://example.com/a",
    ]);
    let s = Settings::resolve(&cli, &cfg).unwrap();
    assert_eq!(s.instances, 1);
    assert_eq!(s.run_options.concurrency_per_channel, 1);
    assert_eq!(s.ports, vec![9100]);
    assert_eq!(s.proxy.host, "tor.lan");
    assert_eq!(s.proxy.endpoint(9100).url(), "socks5h://tor.lan:9100");
    assert_eq!(s.probe.deadline, Some(Duration::from_secs(20)));
    assert_eq!(s.template.user_agent.as_deref(), Some("from-flag"));
    assert_eq!(
        s.template.headers,
        vec![("Accept".to_string(), "text/plain".to_string())]
    );
    assert!(s.channel_options.insecure_tls);
    assert!(s.run_options.transfer.resume);
    assert!(s.run_options.transfer.follow_redirect);
    assert!(!s.run_options.transfer.overwrite);
}

#[test]
fn no_spawn_uses_given_ports_as_instances() {
    let cli = parse(&["tget", "--no-spawn", "-n", "8", "-p", "9050,9150", "https://example.com/a"]);
    let s = Settings::resolve(&cli, &TgetConfig::default()).unwrap();
    assert!(!s.spawn_tor);
    assert_eq!(s.instances, 2);

    let cli = parse(&["tget", "--no-spawn", "https://example.com/a"]);
    let s = Settings::resolve(&cli, &TgetConfig::default()).unwrap();
    assert_eq!(s.ports, vec![9050]);
    assert_eq!(s.instances, 1);
}

#[test]
fn bad_header_and_socks_version_are_rejected() {
    let cli = parse(&["tget", "-H", ": nothing", "https://example.com/a"]);
    assert!(Settings::resolve(&cli, &TgetConfig::default()).is_err());

    let cli = parse(&["tget", "-S", "http", "https://example.com/a"]);
    assert!(Settings::resolve(&cli, &TgetConfig::default()).is_err());
}

#[test]
fn socks_versions_map_to_remote_dns_schemes() {
    assert_eq!(proxy_scheme("socks5").unwrap(), "socks5h");
    assert_eq!(proxy_scheme("SOCKS5H").unwrap(), "socks5h");
    assert_eq!(proxy_scheme("4").unwrap(), "socks4a");
    assert!(proxy_scheme("socks6").is_err());
}

#[test]
fn request_body_and_method_flow_into_template() {
    let cli = parse(&["tget", "-X", "put", "-d", "k=v", "-C", "sid=1", "https://example.com/a"]);
    let s = Settings::resolve(&cli, &TgetConfig::default()).unwrap();
    assert_eq!(s.template.method, "put");
    assert_eq!(s.template.body.as_deref(), Some(&b"k=v"[..]));
    assert_eq!(s.template.cookies.as_deref(), Some("sid=1"));
}
