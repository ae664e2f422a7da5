//! Flag parsing.

use super::parse;
use crate::cli::Cli;
use clap::Parser;
use std::path::Path;

#[test]
fn cli_parse_defaults() {
    let cli = parse(&["tget", "https://example.com/a.iso"]);
    assert_eq!(cli.targets, vec!["https://example.com/a.iso"]);
    assert!(!cli.from_file);
    assert!(cli.instances.is_none());
    assert!(cli.concurrency.is_none());
    assert!(cli.ports.is_empty());
    assert_eq!(cli.method, "GET");
    assert!(!cli.resume && !cli.overwrite && !cli.follow_redirect && !cli.unsafe_tls);
    assert!(!cli.no_spawn);
}

#[test]
fn cli_requires_a_target() {
    assert!(Cli::try_parse_from(["tget"]).is_err());
}

#[test]
fn cli_parse_short_flags() {
    let cli = parse(&[
        "tget", "-F", "-o", "/tmp/out", "-n", "3", "-p", "9050,9052", "-p", "9054", "-S", "socks4",
        "-t", "/usr/bin/tor", "-c", "my.torrc", "-T", "60", "-l", "/tmp/tget.log", "-v", "-O", "-f",
        "-k", "-C", "a=1", "-d", "x=y", "-U", "agent/1", "-X", "POST", "list.txt",
    ]);
    assert!(cli.from_file);
    assert_eq!(cli.out_path.as_deref(), Some(Path::new("/tmp/out")));
    assert_eq!(cli.instances, Some(3));
    assert_eq!(cli.ports, vec![9050, 9052, 9054]);
    assert_eq!(cli.socks_version.as_deref(), Some("socks4"));
    assert_eq!(cli.tor_path.as_deref(), Some(Path::new("/usr/bin/tor")));
    assert_eq!(cli.conf.as_deref(), Some(Path::new("my.torrc")));
    assert_eq!(cli.timeout, Some(60));
    assert_eq!(cli.log_path.as_deref(), Some(Path::new("/tmp/tget.log")));
    assert!(cli.verbose && cli.overwrite && cli.follow_redirect && cli.unsafe_tls);
    assert_eq!(cli.cookies.as_deref(), Some("a=1"));
    assert_eq!(cli.data.as_deref(), Some("x=y"));
    assert_eq!(cli.useragent.as_deref(), Some("agent/1"));
    assert_eq!(cli.method, "POST");
    assert_eq!(cli.targets, vec!["list.txt"]);
}

#[test]
fn cli_parse_long_flags() {
    let cli = parse(&[
        "tget",
        "--continue",
        "--concurrency",
        "4",
        "--host",
        "10.0.0.2",
        "--no-spawn",
        "--test-domain",
        "https://probe.example/",
        "--header",
        "Accept: */*",
        "-H",
        "X-A=1",
        "https://a.example/1",
        "https://b.example/2",
    ]);
    assert!(cli.resume);
    assert_eq!(cli.concurrency, Some(4));
    assert_eq!(cli.host.as_deref(), Some("10.0.0.2"));
    assert!(cli.no_spawn);
    assert_eq!(cli.test_domain.as_deref(), Some("https://probe.example/"));
    assert_eq!(cli.headers, vec!["Accept: */*", "X-A=1"]);
    assert_eq!(cli.targets.len(), 2);
}
