use gungnir_lib::signature::{
    ACTION_ALERT, ACTION_DROP, DEFAULT_PRIO, SIG_FLAG_REQUIRE_PACKET, SIG_FLAG_REQUIRE_STREAM,
    SIG_FLAG_TOCLIENT, SIG_FLAG_TOSERVER,
};
use gungnir_lib::{DetectEngine, EngineConfig, RuleError, SigType};

fn engine() -> DetectEngine {
    DetectEngine::new(EngineConfig::default())
}

#[test]
fn parses_a_minimal_rule() {
    let mut de = engine();
    de.append_rule("alert tcp 1.2.3.4 any -> !1.2.3.4 any (msg:\"x\"; sid:1;)")
        .expect("valid rule");

    let sig = &de.signatures()[0];
    assert_eq!(sig.id, 1);
    assert_eq!(sig.gid, 1);
    assert_eq!(sig.prio, DEFAULT_PRIO);
    assert_eq!(sig.msg.as_deref(), Some("x"));
    assert!(sig.flags & SIG_FLAG_TOSERVER != 0);
    assert!(sig.flags & SIG_FLAG_TOCLIENT != 0);
    assert_eq!(sig.sig_type, SigType::IpOnly);
    assert!(!sig.iponly_dst.is_empty());
}

#[test]
fn drop_action_also_alerts() {
    let mut de = engine();
    de.append_rule("drop tcp any any -> any 80 (msg:\"a\"; sid:4;)").expect("valid rule");
    let sig = &de.signatures()[0];
    assert!(sig.action & ACTION_DROP != 0);
    assert!(sig.action & ACTION_ALERT != 0);
    assert_eq!(de.signatures().len(), 1);
}

#[test]
fn anchored_tcp_content_needs_packet_and_stream() {
    let mut de = engine();
    de.append_rule("alert tcp any any -> any any (content:\"abc\"; offset:1; depth:5; sid:5;)")
        .expect("valid rule");
    let sig = &de.signatures()[0];
    assert!(sig.flags & SIG_FLAG_REQUIRE_PACKET != 0);
    assert!(sig.flags & SIG_FLAG_REQUIRE_STREAM != 0);
    assert_eq!(sig.sig_type, SigType::PktStream);
}

#[test]
fn plain_tcp_content_matches_the_stream() {
    let mut de = engine();
    de.append_rule("alert tcp any any -> any any (content:\"abc\"; sid:5;)")
        .expect("valid rule");
    let sig = &de.signatures()[0];
    assert!(sig.flags & SIG_FLAG_REQUIRE_PACKET == 0);
    assert!(sig.flags & SIG_FLAG_REQUIRE_STREAM != 0);
    assert_eq!(sig.sig_type, SigType::Stream);
}

#[test]
fn negated_any_source_is_refused() {
    let mut de = engine();
    let err = de
        .append_rule("alert tcp !any any -> any any (sid:7;)")
        .expect_err("negating any is invalid");
    assert!(matches!(err, RuleError::Parse(_)));
}

#[test]
fn sid_overflow_is_refused() {
    let mut de = engine();
    let err = de
        .append_rule("alert tcp any any -> any any (sid:99999999999999999999;)")
        .expect_err("sid does not fit 32 bits");
    assert!(matches!(err, RuleError::Parse(_)));
    assert!(de.signatures().is_empty());
}

#[test]
fn gid_and_rev_overflow_are_refused() {
    let mut de = engine();
    assert!(de
        .append_rule("alert tcp any any -> any any (sid:1; gid:99999999999999999999;)")
        .is_err());
    assert!(de
        .append_rule("alert tcp any any -> any any (sid:1; rev:99999999999999999999;)")
        .is_err());
}

#[test]
fn missing_sid_is_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert tcp any any -> any any (msg:\"nope\";)").is_err());
}

#[test]
fn open_port_ranges_parse() {
    let mut de = engine();
    de.append_rule("alert tcp 1.2.3.4 1024: -> !1.2.3.4 1024: (sid:1;)").expect("valid rule");
    let sig = &de.signatures()[0];
    assert_eq!(sig.sp.ranges, vec![(1024, u16::MAX)]);
}

#[test]
fn out_of_range_port_is_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert tcp 1.2.3.4 1024:65536 -> !1.2.3.4 any (sid:1;)").is_err());
}

#[test]
fn invalid_direction_is_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert tcp 1.2.3.4 any <- !1.2.3.4 any (sid:1;)").is_err());
}

#[test]
fn unknown_keyword_is_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert tcp any any -> any any (frobnicate:1; sid:1;)").is_err());
}

#[test]
fn unknown_protocol_is_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert nosuchproto any any -> any any (sid:1;)").is_err());
}

#[test]
fn disabled_app_proto_is_refused() {
    let config = EngineConfig {
        disabled_app_protos: vec!["smb".to_string()],
        ..Default::default()
    };
    let mut de = DetectEngine::new(config);
    assert!(de.append_rule("alert smb any any -> any any (sid:1;)").is_err());
    de.append_rule("alert dns any any -> any any (sid:2;)").expect("dns stays enabled");
}

#[test]
fn reject_needs_packet_injection_capability() {
    let mut de = engine();
    assert!(de.append_rule("reject tcp any any -> any any (sid:1;)").is_err());

    let config = EngineConfig { raw_packet_injection: true, ..Default::default() };
    let mut de = DetectEngine::new(config);
    de.append_rule("reject tcp any any -> any any (sid:1;)").expect("capability granted");
}

#[test]
fn action_scopes_are_validated() {
    let mut de = engine();
    de.append_rule("drop:flow tcp any any -> any any (sid:1;)").expect("drop takes flow scope");
    assert!(de.append_rule("drop:tx tcp any any -> any any (sid:2;)").is_err());
    assert!(de.append_rule("alert:packet tcp any any -> any any (sid:3;)").is_err());
    assert!(de.append_rule("config:flow tcp any any -> any any (sid:4;)").is_err());
}

#[test]
fn accept_is_firewall_only() {
    let mut de = engine();
    assert!(de.append_rule("accept:flow tcp any any -> any any (sid:1;)").is_err());
    assert!(de.append_rule("accept:hook tcp any any -> any any (sid:2;)").is_err());
}

#[test]
fn unquoted_msg_is_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert tcp any any -> any any (msg:hello; sid:1;)").is_err());
}

#[test]
fn quotes_on_sid_are_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert tcp any any -> any any (sid:\"1\";)").is_err());
}

#[test]
fn valueless_content_is_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert tcp any any -> any any (content; sid:1;)").is_err());
}

#[test]
fn value_on_nocase_is_refused() {
    let mut de = engine();
    assert!(de
        .append_rule("alert tcp any any -> any any (content:\"a\"; nocase:1; sid:1;)")
        .is_err());
}

#[test]
fn negated_content_sets_the_negation_flag() {
    let mut de = engine();
    de.append_rule("alert tcp any any -> any any (content:!\"abc\"; sid:1;)")
        .expect("valid rule");
    let sig = &de.signatures()[0];
    let pmatch = &sig.matches[1];
    assert_eq!(pmatch.len(), 1);
    let cd = pmatch[0].ctx.as_content().expect("content data");
    assert!(cd.negated);
    assert_eq!(cd.pattern, b"abc");
}

#[test]
fn priority_beats_classtype() {
    let mut de = engine();
    de.append_rule(
        "alert tcp any any -> any any (priority:2; classtype:trojan-activity; sid:1;)",
    )
    .expect("valid rule");
    assert_eq!(de.signatures()[0].prio, 2);

    de.append_rule("alert tcp any any -> any any (classtype:trojan-activity; sid:2;)")
        .expect("valid rule");
    assert_eq!(de.signatures()[0].prio, 1);
}

#[test]
fn unknown_classtype_warns_unless_strict() {
    let mut de = engine();
    de.append_rule("alert tcp any any -> any any (classtype:nosuch; sid:1;)")
        .expect("lenient by default");
    assert_eq!(de.signatures()[0].prio, DEFAULT_PRIO);

    let config = EngineConfig {
        strict_keywords: vec!["classtype".to_string()],
        ..Default::default()
    };
    let mut de = DetectEngine::new(config);
    assert!(de.append_rule("alert tcp any any -> any any (classtype:nosuch; sid:1;)").is_err());
}

#[test]
fn metadata_accumulates_and_renders_json() {
    let mut de = engine();
    de.append_rule(
        "alert tcp any any -> any any (metadata: created_at 2024_01_01, confidence high; \
         metadata: confidence low; sid:1;)",
    )
    .expect("valid rule");
    let md = de.signatures()[0].metadata.as_ref().expect("metadata present");
    assert_eq!(md.entries.len(), 3);
    let parsed: serde_json::Value = serde_json::from_str(&md.json).expect("valid json");
    assert_eq!(parsed["confidence"].as_array().map(Vec::len), Some(2));
}

#[test]
fn references_parse() {
    let mut de = engine();
    de.append_rule(
        "alert tcp any any -> any any (reference:url,example.com/a; reference:cve,2024-1234; sid:1;)",
    )
    .expect("valid rule");
    let sig = &de.signatures()[0];
    assert_eq!(sig.references.len(), 2);
    assert_eq!(sig.references[0].scheme, "url");
    assert!(de
        .append_rule("alert tcp any any -> any any (reference:nocomma; sid:2;)")
        .is_err());
}

#[test]
fn escaped_semicolons_stay_in_the_value() {
    let mut de = engine();
    de.append_rule(r#"alert tcp any any -> any any (content:"a\;b"; sid:1;)"#)
        .expect("valid rule");
    let sig = &de.signatures()[0];
    let cd = sig.matches[1][0].ctx.as_content().expect("content data");
    assert_eq!(cd.pattern, b"a;b");
}

#[test]
fn hex_content_decodes() {
    let mut de = engine();
    de.append_rule("alert tcp any any -> any any (content:\"|de ad be ef|\"; sid:1;)")
        .expect("valid rule");
    let cd = de.signatures()[0].matches[1][0].ctx.as_content().expect("content data");
    assert_eq!(cd.pattern, vec![0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn tcp_pkt_and_tcp_stream_preset_requirements() {
    let mut de = engine();
    de.append_rule("alert tcp-pkt any any -> any any (content:\"a\"; sid:1;)")
        .expect("valid rule");
    assert!(de.signatures()[0].flags & SIG_FLAG_REQUIRE_PACKET != 0);

    de.append_rule("alert tcp-stream any any -> any any (content:\"a\"; sid:2;)")
        .expect("valid rule");
    assert!(de.signatures()[0].flags & SIG_FLAG_REQUIRE_STREAM != 0);
}

#[test]
fn conflicting_packet_and_stream_requirements_are_refused() {
    let mut de = engine();
    assert!(de
        .append_rule("alert tcp-pkt any any -> any any (flow:only_stream; sid:1;)")
        .is_err());
}

#[test]
fn flow_direction_conflicts_are_refused() {
    let mut de = engine();
    assert!(de
        .append_rule("alert tcp any any -> any any (flow:to_server,to_client; sid:1;)")
        .is_err());
    de.append_rule("alert tcp any any -> any any (flow:to_server,established; sid:2;)")
        .expect("valid rule");
    let sig = &de.signatures()[0];
    assert!(sig.flags & SIG_FLAG_TOSERVER != 0);
    assert!(sig.flags & SIG_FLAG_TOCLIENT == 0);
}

#[test]
fn stream_size_forces_packet_inspection_alongside_content() {
    let mut de = engine();
    de.append_rule(
        "alert tcp any any -> any any (stream_size:server,>,120; content:\"a\"; sid:1;)",
    )
    .expect("valid rule");
    let sig = &de.signatures()[0];
    assert!(sig.flags & SIG_FLAG_REQUIRE_STREAM != 0);
    assert!(sig.flags & SIG_FLAG_REQUIRE_PACKET != 0);
}
