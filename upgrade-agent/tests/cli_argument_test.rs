use clap::Parser;
use proptest::prelude::*;
use upgrade_agent::Args;

fn arb_scope() -> impl Strategy<Value = String> {
    "/([a-z0-9_-]{1,12}/){0,3}"
}

proptest! {
    /// Any port triple and scope given on the command line ends up in the
    /// proxy and guard configs unchanged.
    #[test]
    fn prop_cli_values_reach_configs(
        listen_port in 1024u16..,
        admin_port in 1024u16..,
        scope in arb_scope(),
    ) {
        let listen = listen_port.to_string();
        let admin = admin_port.to_string();
        let args = Args::try_parse_from([
            "upgrade-agent",
            "--listen-port", &listen,
            "--admin-port", &admin,
            "--scope", &scope,
        ]);
        prop_assert!(args.is_ok(), "Failed to parse ports {} / {}", listen, admin);

        let args = args.unwrap();
        let proxy = args.proxy_config();
        prop_assert_eq!(proxy.listen_port, listen_port);
        prop_assert_eq!(proxy.admin_port, admin_port);
        prop_assert_eq!(args.guard_config().scope, scope);
    }
}

#[test]
fn test_help_lists_lifecycle_flag() {
    let error = Args::try_parse_from(["upgrade-agent", "--help"]).unwrap_err();
    let help_text = error.to_string();
    assert!(help_text.contains("--wait-for-skip"));
    assert!(help_text.contains("--no-diagnostics"));
}
