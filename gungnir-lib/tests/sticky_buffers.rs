use gungnir_lib::signature::{
    DetectTable, LIST_PMATCH, SIG_FLAG_PREFILTER, SIG_FLAG_TOCLIENT, SIG_FLAG_TOSERVER,
};
use gungnir_lib::{AppProto, DetectEngine, EngineConfig, PrefilterSetting, SigType};

fn engine() -> DetectEngine {
    DetectEngine::new(EngineConfig::default())
}

#[test]
fn rawbytes_on_a_buffer_content_is_refused() {
    let mut de = engine();
    assert!(de
        .append_rule("alert http any any -> any any (file_data; content:\"x\"; rawbytes; sid:8;)")
        .is_err());
}

#[test]
fn rawbytes_on_payload_content_is_fine() {
    let mut de = engine();
    de.append_rule("alert tcp any any -> any any (content:\"x\"; rawbytes; sid:1;)")
        .expect("valid rule");
    let cd = de.signatures()[0].matches[LIST_PMATCH as usize][0]
        .ctx
        .as_content()
        .expect("content data");
    assert!(cd.rawbytes);
}

#[test]
fn uri_buffer_implies_to_server() {
    let mut de = engine();
    de.append_rule("alert http any any -> any any (http.uri; content:\"/a\"; sid:9;)")
        .expect("valid rule");
    let sig = &de.signatures()[0];
    assert!(sig.flags & SIG_FLAG_TOSERVER != 0);
    assert!(sig.flags & SIG_FLAG_TOCLIENT == 0);
    assert_eq!(sig.sig_type, SigType::AppTx);
    assert_eq!(sig.detect_table, DetectTable::AppTd);
}

#[test]
fn explicit_opposite_direction_conflicts_with_buffers() {
    let mut de = engine();
    assert!(de
        .append_rule(
            "alert http any any -> any any (flow:to_client; http.uri; content:\"/a\"; sid:1;)"
        )
        .is_err());
}

#[test]
fn empty_sticky_buffer_is_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert http any any -> any any (http.uri; sid:10;)").is_err());
}

#[test]
fn uri_buffer_on_a_foreign_protocol_is_refused() {
    let mut de = engine();
    assert!(de
        .append_rule("alert dns any any -> any any (http.uri; content:\"a\"; sid:1;)")
        .is_err());
}

#[test]
fn http_uri_modifier_moves_the_content() {
    let mut de = engine();
    de.append_rule("alert tcp any any -> any 80 (content:\"index\"; http_uri; sid:51;)")
        .expect("valid rule");
    let sig = &de.signatures()[0];
    assert_eq!(sig.alproto, AppProto::Http1);
    assert!(sig.matches[LIST_PMATCH as usize].is_empty());

    let uri_list = de.tables.buffers.id_by_name("http.uri").expect("registered");
    let (_, sms) = sig
        .buffer_matches
        .iter()
        .find(|(id, _)| *id == uri_list)
        .expect("content moved into the uri buffer");
    assert_eq!(sms.len(), 1);
    assert_eq!(sms[0].ctx.as_content().expect("content data").pattern, b"index");
}

#[test]
fn http_uri_modifier_needs_a_content() {
    let mut de = engine();
    assert!(de.append_rule("alert tcp any any -> any 80 (http_uri; sid:1;)").is_err());
}

#[test]
fn http_uri_modifier_conflicts_with_other_alprotos() {
    let mut de = engine();
    assert!(de
        .append_rule("alert dns any any -> any any (content:\"x\"; http_uri; sid:1;)")
        .is_err());
}

#[test]
fn attachment_indices_are_unique_and_increasing() {
    let mut de = engine();
    de.append_rule(
        "alert http any any -> any any (content:\"pre\"; http.uri; content:\"u1\"; \
         content:\"u2\"; file.data; content:\"fd\"; sid:50;)",
    )
    .expect("valid rule");
    let sig = &de.signatures()[0];

    let mut all: Vec<u32> = Vec::new();
    for list in &sig.matches {
        all.extend(list.iter().map(|m| m.idx));
    }
    for (_, sms) in &sig.buffer_matches {
        all.extend(sms.iter().map(|m| m.idx));
    }
    let mut sorted = all.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 4, "every match lives in exactly one list");
    assert_eq!(sorted, (0..4).collect::<Vec<u32>>());
}

#[test]
fn file_data_direction_restricts_the_buffer() {
    let mut de = engine();
    let chain = de
        .sig_init("alert http any any -> any any (file.data: to_server; content:\"x\"; sid:91;)")
        .expect("valid rule");
    let sig = &chain.main;
    assert!(sig.flags & SIG_FLAG_TOSERVER != 0);
    assert!(sig.flags & SIG_FLAG_TOCLIENT == 0);
    let init = sig.init_data();
    assert_eq!(init.buffers.len(), 1);
    assert!(init.buffers[0].only_ts);
    assert!(!init.buffers[0].only_tc);
}

#[test]
fn file_data_rejects_garbage_directions() {
    let mut de = engine();
    assert!(de
        .append_rule("alert http any any -> any any (file.data: sideways; content:\"x\"; sid:1;)")
        .is_err());
}

#[test]
fn file_data_needs_a_file_capable_protocol() {
    let mut de = engine();
    assert!(de
        .append_rule("alert dns any any -> any any (file_data; content:\"x\"; sid:1;)")
        .is_err());
}

#[test]
fn file_name_on_http2_is_refused() {
    let mut de = engine();
    assert!(de
        .append_rule("alert http2 any any -> any any (file.name; content:\"x\"; sid:90;)")
        .is_err());
}

#[test]
fn file_name_on_http1_is_fine() {
    let mut de = engine();
    de.append_rule("alert http any any -> any any (file.name; content:\"evil.exe\"; sid:1;)")
        .expect("valid rule");
}

#[test]
fn app_hook_requires_matching_engine_progress() {
    let mut de = engine();
    de.append_rule(
        "alert http:request_line any any -> any any (http.uri; content:\"/a\"; sid:11;)",
    )
    .expect("uri engine runs at request_line progress");

    assert!(de
        .append_rule(
            "alert http:request_body any any -> any any (http.uri; content:\"/a\"; sid:12;)"
        )
        .is_err());
}

#[test]
fn unknown_app_hook_is_refused() {
    let mut de = engine();
    assert!(de.append_rule("alert http:nosuchhook any any -> any any (sid:1;)").is_err());
}

#[test]
fn pkt_hooks_parse_on_ip_protocols() {
    let mut de = engine();
    de.append_rule("alert tcp:pre_flow any any -> any any (sid:72;)").expect("valid rule");
    let sig = &de.signatures()[0];
    assert_eq!(sig.sig_type, SigType::Pkt);
    assert_eq!(sig.detect_table, DetectTable::PacketTd);

    assert!(de.append_rule("alert tcp:nosuch any any -> any any (sid:73;)").is_err());
}

#[test]
fn transactional_rules_need_both_directions() {
    let mut de = engine();
    // only a to-server buffer: not transactional
    assert!(de
        .append_rule("alert http any any => any any (http.uri; content:\"/a\"; sid:1;)")
        .is_err());

    de.append_rule(
        "alert http any any => any any (http.uri; content:\"/a\"; \
         file.data: to_client; content:\"b\"; sid:2;)",
    )
    .expect("both directions are covered");
}

#[test]
fn fast_pattern_overrides_the_longest_content() {
    let mut de = engine();
    let chain = de
        .sig_init(
            "alert tcp any any -> any any (content:\"ab\"; fast_pattern; content:\"longer\"; \
             sid:60;)",
        )
        .expect("valid rule");
    let sig = &chain.main;
    assert!(sig.flags & SIG_FLAG_PREFILTER != 0);
    let mpm = sig.init_data().mpm_sm.expect("fast pattern chosen");
    assert_eq!(sig.init_data().store.get(mpm).idx, 0, "the flagged content wins");

    let chain = de
        .sig_init("alert tcp any any -> any any (content:\"ab\"; content:\"longer\"; sid:61;)")
        .expect("valid rule");
    let sig = &chain.main;
    let mpm = sig.init_data().mpm_sm.expect("longest content chosen");
    assert_eq!(sig.init_data().store.get(mpm).idx, 1);
}

#[test]
fn auto_prefilter_promotes_capable_keywords() {
    let config = EngineConfig { prefilter: PrefilterSetting::Auto, ..Default::default() };
    let mut de = DetectEngine::new(config);
    let chain = de
        .sig_init("alert tcp any any -> any any (dsize:>100; sid:62;)")
        .expect("valid rule");
    assert!(chain.main.flags & SIG_FLAG_PREFILTER != 0);
    assert!(chain.main.init_data().prefilter_sm.is_some());

    let mut plain = engine();
    let chain = plain
        .sig_init("alert tcp any any -> any any (dsize:>100; sid:63;)")
        .expect("valid rule");
    assert!(chain.main.flags & SIG_FLAG_PREFILTER == 0);
}

#[test]
fn explicit_prefilter_marker_is_honored() {
    let mut de = engine();
    let chain = de
        .sig_init("alert tcp any any -> any any (dsize:>100; prefilter; sid:64;)")
        .expect("valid rule");
    assert!(chain.main.flags & SIG_FLAG_PREFILTER != 0);
}

#[test]
fn firewall_rules_need_an_explicit_hook_and_scope() {
    let config = EngineConfig { firewall: true, ..Default::default() };
    let mut de = DetectEngine::new(config);

    // no hook
    assert!(de.append_rule("accept:flow tcp any any -> any 80 (sid:30;)").is_err());
    // no scope
    assert!(de.append_rule("accept tcp:pre_flow any any -> any any (sid:31;)").is_err());
    // pass is not a firewall action
    assert!(de.append_rule("pass:flow tcp:pre_flow any any -> any any (sid:32;)").is_err());
    // transactional direction is not available to firewall rules
    assert!(de
        .append_rule("accept:flow tcp:pre_flow any any => any any (sid:33;)")
        .is_err());

    de.append_rule("accept:flow tcp:pre_stream any any -> any any (sid:34;)")
        .expect("valid firewall rule");
    let sig = &de.signatures()[0];
    assert_eq!(sig.sig_type, SigType::Pkt);
    assert_eq!(sig.detect_table, DetectTable::PacketPreStream);
}

#[test]
fn firewall_detect_table_derivation() {
    let config = EngineConfig { firewall: true, ..Default::default() };
    let mut de = DetectEngine::new(config);

    de.append_rule("accept:flow tcp:pre_flow any any -> any any (sid:40;)")
        .expect("valid firewall rule");
    assert_eq!(de.signatures()[0].detect_table, DetectTable::PacketPreFlow);

    de.append_rule("accept:flow tcp:flow_start any any -> any any (sid:41;)")
        .expect("valid firewall rule");
    assert_eq!(de.signatures()[0].detect_table, DetectTable::PacketFilter);

    de.append_rule("accept:hook http:request_complete any any -> any any (sid:42;)")
        .expect("valid firewall rule");
    assert_eq!(de.signatures()[0].detect_table, DetectTable::AppFilter);
}
