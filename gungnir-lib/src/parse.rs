//! Rule-string tokenization and header parsing.
//!
//! A rule is seven whitespace-separated header tokens followed by a
//! parenthesized option body:
//!
//! ```text
//! action proto src sport dir dst dport ( options )
//! ```
//!
//! Address and port tokens may be bracketed lists; whitespace inside
//! brackets does not separate tokens.

use crate::address::parse_address_group;
use crate::config::EngineConfig;
use crate::engine::EngineTables;
use crate::error::{Result, RuleError};
use crate::ports::parse_port_group;
use crate::proto::{AppProto, Direction, PROTO_ONLY_PKT, PROTO_ONLY_STREAM};
use crate::signature::{
    ActionScope, AppHook, PktHook, Signature, SignatureHook, ACTION_ACCEPT, ACTION_ALERT,
    ACTION_CONFIG, ACTION_DROP, ACTION_PASS, ACTION_REJECT, ACTION_REJECT_BOTH,
    ACTION_REJECT_DST, SIG_FLAG_APPLAYER, SIG_FLAG_DP_ANY, SIG_FLAG_DST_ANY, SIG_FLAG_FIREWALL,
    SIG_FLAG_REQUIRE_PACKET, SIG_FLAG_REQUIRE_STREAM, SIG_FLAG_SP_ANY, SIG_FLAG_SRC_ANY,
    SIG_FLAG_TOCLIENT, SIG_FLAG_TOSERVER, SIG_FLAG_TXBOTHDIR, SIG_INIT_BIDIREC,
};

/// The raw header tokens and option body of one rule. Kept until final
/// validation: the IP-only canonicalization re-parses the literal source
/// and destination strings.
#[derive(Debug, Default, Clone)]
pub struct SignatureParser {
    pub action: String,
    pub protocol: String,
    pub src: String,
    pub sp: String,
    pub direction: String,
    pub dst: String,
    pub dp: String,
    pub opts: String,
}

/// Advance past the next whitespace-delimited token.
fn next_token(input: &mut &str) -> Option<String> {
    let s = input.trim_start();
    if s.is_empty() {
        *input = s;
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(i) => {
            let tok = s[..i].to_string();
            *input = &s[i + 1..];
            Some(tok)
        }
        None => {
            *input = "";
            Some(s.to_string())
        }
    }
}

/// Advance past the next token, treating space inside `[...]` as part of
/// the token. Returns None when no terminator follows, which means the
/// option body is missing.
fn next_list_token(input: &mut &str) -> Option<String> {
    let s = input.trim_start();
    if s.is_empty() {
        *input = s;
        return None;
    }
    let mut depth = 0u32;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ' ' if depth == 0 => {
                let tok = s[..i].to_string();
                *input = &s[i + 1..];
                return Some(tok);
            }
            _ => {}
        }
    }
    *input = "";
    None
}

fn check_printable(rule: &str) -> Result<()> {
    for b in rule.bytes() {
        if (b < 0x20 && !matches!(b, 0x09 | 0x0a | 0x0d)) || b == 0x7f {
            return Err(RuleError::parse("rule contains invalid (control) characters"));
        }
    }
    Ok(())
}

/// Split a rule into its seven header tokens and the option body.
pub fn split_rule(rule: &str) -> Result<SignatureParser> {
    check_printable(rule)?;

    let mut input = rule;
    let mut parser = SignatureParser::default();

    let missing = || RuleError::parse("incomplete rule header");
    parser.action = next_token(&mut input).ok_or_else(missing)?;
    parser.protocol = next_list_token(&mut input).ok_or_else(missing)?;
    parser.src = next_list_token(&mut input).ok_or_else(missing)?;
    parser.sp = next_list_token(&mut input).ok_or_else(missing)?;
    parser.direction = next_token(&mut input).ok_or_else(missing)?;
    parser.dst = next_list_token(&mut input).ok_or_else(missing)?;
    parser.dp = next_list_token(&mut input).ok_or_else(missing)?;

    let opts = input.trim();
    if !opts.starts_with('(') {
        return Err(RuleError::parse("no rule options"));
    }
    let Some(inner) = opts.strip_prefix('(').and_then(|o| o.strip_suffix(')')) else {
        return Err(RuleError::parse("unbalanced parentheses around rule options"));
    };
    parser.opts = inner.trim().to_string();
    Ok(parser)
}

fn action_flags(action: &str, config: &EngineConfig) -> Result<u8> {
    let reject_supported = |name: &str| -> Result<()> {
        if !config.raw_packet_injection {
            return Err(RuleError::Parse(format!(
                "raw packet injection capability is required for action \"{name}\""
            )));
        }
        Ok(())
    };

    if action.eq_ignore_ascii_case("alert") {
        Ok(ACTION_ALERT)
    } else if action.eq_ignore_ascii_case("drop") {
        Ok(ACTION_DROP | ACTION_ALERT)
    } else if action.eq_ignore_ascii_case("pass") {
        Ok(ACTION_PASS)
    } else if action.eq_ignore_ascii_case("reject") || action.eq_ignore_ascii_case("rejectsrc") {
        reject_supported(action)?;
        Ok(ACTION_REJECT | ACTION_DROP | ACTION_ALERT)
    } else if action.eq_ignore_ascii_case("rejectdst") {
        reject_supported(action)?;
        Ok(ACTION_REJECT_DST | ACTION_DROP | ACTION_ALERT)
    } else if action.eq_ignore_ascii_case("rejectboth") {
        reject_supported(action)?;
        Ok(ACTION_REJECT_BOTH | ACTION_DROP | ACTION_ALERT)
    } else if action.eq_ignore_ascii_case("config") {
        Ok(ACTION_CONFIG)
    } else if action.eq_ignore_ascii_case("accept") {
        Ok(ACTION_ACCEPT)
    } else {
        Err(RuleError::Parse(format!("an invalid action \"{action}\" was given")))
    }
}

fn parse_action(sig: &mut Signature, action_in: &str, config: &EngineConfig) -> Result<()> {
    let (name, scope) = match action_in.split_once(':') {
        Some((a, o)) => (a, Some(o)),
        None => (action_in, None),
    };

    let flags = action_flags(name, config)?;

    if let Some(scope) = scope {
        let scope_err = |allowed: &str| {
            RuleError::Parse(format!(
                "invalid action scope \"{scope}\" in action \"{action_in}\": only {allowed} allowed"
            ))
        };
        sig.action_scope = if flags & (ACTION_DROP | ACTION_PASS) != 0 {
            match scope {
                "packet" => ActionScope::Packet,
                "flow" => ActionScope::Flow,
                _ => return Err(scope_err("'packet' and 'flow'")),
            }
        } else if flags & ACTION_ACCEPT != 0 {
            match scope {
                "packet" => ActionScope::Packet,
                "flow" => ActionScope::Flow,
                "tx" => ActionScope::Tx,
                "hook" => ActionScope::Hook,
                _ => return Err(scope_err("'packet', 'flow', 'tx' and 'hook'")),
            }
        } else if flags & ACTION_CONFIG != 0 {
            match scope {
                "packet" => ActionScope::Packet,
                _ => return Err(scope_err("'packet'")),
            }
        } else {
            return Err(RuleError::Parse(format!(
                "invalid action scope \"{scope}\" in action \"{action_in}\": scope only \
                 supported for actions \"drop\", \"pass\" and \"accept\""
            )));
        };
    }

    if sig.init_data().firewall_rule && sig.action_scope == ActionScope::NotSet {
        return Err(RuleError::parse(
            "firewall rules require setting an explicit action scope",
        ));
    }
    if !sig.init_data().firewall_rule && flags & ACTION_ACCEPT != 0 {
        return Err(RuleError::parse("\"accept\" action only supported for firewall rules"));
    }
    if sig.init_data().firewall_rule && flags & ACTION_PASS != 0 {
        return Err(RuleError::parse("\"pass\" action not supported for firewall rules"));
    }

    sig.action = flags;
    Ok(())
}

fn parse_app_hook(sig: &mut Signature, hook: &str, tables: &EngineTables) -> Result<()> {
    let alproto = sig.alproto;
    let (dir_flag, progress) = match hook {
        "request_started" => (SIG_FLAG_TOSERVER, 0),
        "response_started" => (SIG_FLAG_TOCLIENT, 0),
        "request_complete" => {
            (SIG_FLAG_TOSERVER, alproto.completion_progress(Direction::ToServer))
        }
        "response_complete" => {
            (SIG_FLAG_TOCLIENT, alproto.completion_progress(Direction::ToClient))
        }
        name => {
            if let Some(p) = alproto.state_by_name(name, Direction::ToServer) {
                (SIG_FLAG_TOSERVER, p)
            } else if let Some(p) = alproto.state_by_name(name, Direction::ToClient) {
                (SIG_FLAG_TOCLIENT, p)
            } else {
                return Err(RuleError::Parse(format!(
                    "protocol \"{}\" does not support hook \"{name}\"",
                    alproto.name()
                )));
            }
        }
    };
    sig.flags |= dir_flag;

    let list_name = format!("{}:{hook}:generic", alproto.name());
    let list = tables.buffers.id_by_name(&list_name).ok_or_else(|| {
        RuleError::Parse(format!("no list registered as {list_name} for hook {hook}"))
    })?;

    sig.init_data_mut().hook = SignatureHook::App(AppHook { alproto, progress, list });
    sig.app_progress_hook = progress;
    Ok(())
}

fn parse_proto(
    sig: &mut Signature,
    protostr: &str,
    tables: &EngineTables,
    config: &EngineConfig,
) -> Result<()> {
    if protostr.len() > 32 {
        return Err(RuleError::Parse(format!("protocol specification too long: \"{protostr}\"")));
    }

    let (name, hook) = match protostr.split_once(':') {
        Some((p, h)) => (p, Some(h)),
        None => (protostr, None),
    };
    if name.is_empty() {
        return Err(RuleError::Parse(format!("invalid protocol specification \"{protostr}\"")));
    }

    if sig.proto.parse(name) {
        if let Some(h) = hook {
            let Some(ph) = PktHook::from_name(h) else {
                return Err(RuleError::Parse(format!(
                    "protocol \"{name}\" does not support hook \"{h}\""
                )));
            };
            sig.init_data_mut().hook = SignatureHook::Pkt(ph);
        }
    } else {
        let alproto = AppProto::from_name(name).ok_or_else(|| {
            RuleError::Parse(format!(
                "protocol \"{name}\" cannot be used in a signature: detection for it is not \
                 supported or has been disabled"
            ))
        })?;
        if config
            .disabled_app_protos
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name) || p.eq_ignore_ascii_case(alproto.name()))
        {
            return Err(RuleError::Parse(format!(
                "protocol \"{name}\" cannot be used in a signature: detection for it is not \
                 supported or has been disabled"
            )));
        }
        sig.alproto = alproto;
        sig.flags |= SIG_FLAG_APPLAYER;
        alproto.supported_ipprotos(&mut sig.proto);
        if let Some(h) = hook {
            parse_app_hook(sig, h, tables)?;
        }
    }

    if sig.proto.flags & PROTO_ONLY_PKT != 0 {
        sig.flags |= SIG_FLAG_REQUIRE_PACKET;
    } else if sig.proto.flags & PROTO_ONLY_STREAM != 0 {
        sig.flags |= SIG_FLAG_REQUIRE_STREAM;
    }
    Ok(())
}

fn parse_rule_address(sig: &mut Signature, addr: &str, dst_side: bool) -> Result<()> {
    if addr.eq_ignore_ascii_case("any") {
        sig.flags |= if dst_side { SIG_FLAG_DST_ANY } else { SIG_FLAG_SRC_ANY };
    }
    let group = parse_address_group(addr).map_err(RuleError::Parse)?;
    if dst_side {
        sig.init_data_mut().dst = group;
    } else {
        sig.init_data_mut().src = group;
    }
    Ok(())
}

fn parse_rule_port(sig: &mut Signature, port: &str, dst_side: bool) -> Result<()> {
    if port.eq_ignore_ascii_case("any") {
        sig.flags |= if dst_side { SIG_FLAG_DP_ANY } else { SIG_FLAG_SP_ANY };
    }
    let group = parse_port_group(port).map_err(RuleError::Parse)?;
    if dst_side {
        sig.dp = group;
    } else {
        sig.sp = group;
    }
    Ok(())
}

/// Interpret the header tokens into the signature. With `swapped`, source
/// and destination change places (the mirrored half of a `<>` rule).
pub fn parse_header(
    sig: &mut Signature,
    parser: &SignatureParser,
    tables: &EngineTables,
    config: &EngineConfig,
    swapped: bool,
) -> Result<()> {
    parse_action(sig, &parser.action, config)?;
    parse_proto(sig, &parser.protocol, tables, config)?;

    match parser.direction.as_str() {
        "->" => {}
        "<>" => sig.init_data_mut().init_flags |= SIG_INIT_BIDIREC,
        "=>" => {
            if sig.flags & SIG_FLAG_FIREWALL != 0 {
                return Err(RuleError::parse(
                    "transactional bidirectional rules not supported for firewall rules",
                ));
            }
            sig.flags |= SIG_FLAG_TXBOTHDIR;
        }
        other => {
            return Err(RuleError::Parse(format!(
                "\"{other}\" is not a valid direction modifier; \"->\", \"<>\" and \"=>\" are \
                 supported"
            )));
        }
    }

    parse_rule_address(sig, &parser.src, swapped)?;
    parse_rule_address(sig, &parser.dst, !swapped)?;
    parse_rule_port(sig, &parser.sp, swapped)?;
    parse_rule_port(sig, &parser.dp, !swapped)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_header_and_options() {
        let p = split_rule("alert tcp 1.2.3.4 any -> !1.2.3.4 any (msg:\"x\"; sid:1;)")
            .expect("splits");
        assert_eq!(p.action, "alert");
        assert_eq!(p.protocol, "tcp");
        assert_eq!(p.src, "1.2.3.4");
        assert_eq!(p.sp, "any");
        assert_eq!(p.direction, "->");
        assert_eq!(p.dst, "!1.2.3.4");
        assert_eq!(p.dp, "any");
        assert_eq!(p.opts, "msg:\"x\"; sid:1;");
    }

    #[test]
    fn bracketed_lists_keep_inner_spaces() {
        let p = split_rule("alert tcp [1.2.3.4, [5.6.7.8, 9.9.9.9]] any -> any [80, 443] (sid:1;)")
            .expect("splits");
        assert_eq!(p.src, "[1.2.3.4, [5.6.7.8, 9.9.9.9]]");
        assert_eq!(p.dp, "[80, 443]");
    }

    #[test]
    fn missing_options_are_refused() {
        assert!(split_rule("alert tcp any any -> any any").is_err());
        assert!(split_rule("alert tcp any any -> any").is_err());
    }

    #[test]
    fn unbalanced_parentheses_are_refused() {
        assert!(split_rule("alert tcp any any -> any any (sid:1;").is_err());
    }

    #[test]
    fn control_characters_are_refused() {
        assert!(split_rule("alert tcp any any -> any any (msg:\"\x07\"; sid:1;)").is_err());
    }
}
