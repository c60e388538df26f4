//! Cross-keyword validation and consolidation, run once after all keyword
//! setups and prefilter selection.

use tracing::debug;

use crate::address::parse_iponly_list;
use crate::engine::EngineTables;
use crate::error::{Result, RuleError};
use crate::keyword::{Kw, KeywordRegistry};
use crate::keywords::flow;
use crate::parse::SignatureParser;
use crate::proto::{AppProto, Direction, IPPROTO_TCP};
use crate::signature::{
    DetectTable, PktHook, SigType, Signature, SignatureHook, LIST_MATCH, LIST_PMATCH,
    SIG_FLAG_APPLAYER, SIG_FLAG_DP_ANY, SIG_FLAG_FILESTORE, SIG_FLAG_FIREWALL,
    SIG_FLAG_REQUIRE_PACKET, SIG_FLAG_REQUIRE_STREAM, SIG_FLAG_SP_ANY, SIG_FLAG_TOCLIENT,
    SIG_FLAG_TOSERVER, SIG_FLAG_TXBOTHDIR, SIG_INIT_FILEDATA,
};

/// Per-buffer direction accounting collected while walking the registered
/// inspection engines.
#[derive(Default)]
struct DirTally {
    ts_excl: usize,
    tc_excl: usize,
    dir_amb: usize,
}

pub fn validate_and_consolidate(
    registry: &KeywordRegistry,
    tables: &EngineTables,
    sig: &mut Signature,
    parser: &SignatureParser,
    swapped: bool,
) -> Result<()> {
    validate_firewall(sig)?;
    validate_packet_stream(sig)?;

    let tally = check_buffers(tables, sig)?;
    consolidate_direction(sig, &tally)?;
    consolidate_tcp_buffer(sig);

    sig.sig_type = signature_type(tables, sig);
    sig.detect_table = detect_table(sig);

    validate_file_handling(sig)?;
    validate_table_compat(registry, sig)?;

    if sig.sig_type == SigType::IpOnly {
        let (src, dst) = if swapped {
            (parser.dst.as_str(), parser.src.as_str())
        } else {
            (parser.src.as_str(), parser.dst.as_str())
        };
        sig.iponly_src = parse_iponly_list(src).map_err(RuleError::Parse)?;
        sig.iponly_dst = parse_iponly_list(dst).map_err(RuleError::Parse)?;
    }
    Ok(())
}

fn validate_firewall(sig: &Signature) -> Result<()> {
    if sig.init_data().firewall_rule && sig.init_data().hook == SignatureHook::None {
        return Err(RuleError::Parse(format!(
            "rule {} is loaded as a firewall rule, but does not specify an explicit hook",
            sig.id
        )));
    }
    Ok(())
}

fn validate_packet_stream(sig: &Signature) -> Result<()> {
    if sig.flags & SIG_FLAG_REQUIRE_PACKET != 0 && sig.flags & SIG_FLAG_REQUIRE_STREAM != 0 {
        return Err(RuleError::parse(
            "can't mix packet keywords with stream-only matching",
        ));
    }
    Ok(())
}

/// Walk every sticky buffer: it must be non-empty, buffer classes must not
/// conflict, and the registered inspection engines decide the per-buffer
/// direction contributions.
fn check_buffers(tables: &EngineTables, sig: &Signature) -> Result<DirTally> {
    let init = sig.init_data();
    let mut tally = DirTally::default();

    if let Some(cb) = init.curbuf {
        if init.buffers[cb].sms.is_empty() {
            let name = tables.buffers.name_by_id(init.buffers[cb].id).unwrap_or("unknown");
            return Err(RuleError::Parse(format!(
                "rule {} set up buffer {name} but didn't add matches to it",
                sig.id
            )));
        }
    }

    let has_pmatch = !init.smlists[LIST_PMATCH as usize].is_empty();
    let mut has_frame = false;
    let mut has_app = false;
    let mut has_pkt = false;

    // per-buffer-id direction counts from engines that are not direction
    // exclusive
    let mut bufdir: Vec<(u32, usize, usize)> = Vec::new();

    for b in &init.buffers {
        let bt = tables
            .buffers
            .get(b.id)
            .ok_or_else(|| RuleError::parse("match attached to an unregistered buffer"))?;

        if b.sms.is_empty() {
            return Err(RuleError::Parse(format!("no matches in sticky buffer {}", bt.name)));
        }

        has_frame |= bt.frame;
        has_app |= !bt.frame && !bt.packet;
        has_pkt |= bt.packet;

        if sig.flags & SIG_FLAG_REQUIRE_PACKET != 0 && !bt.packet {
            return Err(RuleError::parse(
                "rule combines packet-specific matches with app-layer buffer inspection",
            ));
        }

        for engine in tables
            .inspect
            .iter()
            .filter(|e| e.sm_list == b.id)
            .filter(|e| sig.alproto == AppProto::Unknown || e.alproto == sig.alproto)
        {
            if b.only_tc {
                if engine.dir == Direction::ToClient {
                    tally.tc_excl += 1;
                }
            } else if b.only_ts {
                if engine.dir == Direction::ToServer {
                    tally.ts_excl += 1;
                }
            } else {
                let pos = match bufdir.iter().position(|(id, _, _)| *id == b.id) {
                    Some(p) => p,
                    None => {
                        bufdir.push((b.id, 0, 0));
                        bufdir.len() - 1
                    }
                };
                match engine.dir {
                    Direction::ToServer => bufdir[pos].1 += 1,
                    Direction::ToClient => bufdir[pos].2 += 1,
                }
            }

            // a hooked rule may only use engines at the hook's progress
            if let SignatureHook::App(hook) = init.hook {
                if sig.flags & SIG_FLAG_TOSERVER != 0
                    && engine.dir == Direction::ToServer
                    && engine.progress != hook.progress
                {
                    return Err(RuleError::Parse(format!(
                        "engine progress value {} doesn't match hook {}",
                        engine.progress, hook.progress
                    )));
                }
                if sig.flags & SIG_FLAG_TOCLIENT != 0
                    && engine.dir == Direction::ToClient
                    && engine.progress != hook.progress
                {
                    return Err(RuleError::Parse(format!(
                        "engine progress value {} doesn't match hook {}",
                        engine.progress, hook.progress
                    )));
                }
            }
        }
    }

    if has_pmatch && has_frame {
        return Err(RuleError::parse("can't mix pure content and frame inspection"));
    }
    if has_app && has_frame {
        return Err(RuleError::parse("can't mix app-layer buffer and frame inspection"));
    }
    if has_pkt && has_frame {
        return Err(RuleError::parse("can't mix pkt buffer and frame inspection"));
    }

    for (_, ts, tc) in bufdir {
        tally.ts_excl += usize::from(ts > 0 && tc == 0);
        tally.tc_excl += usize::from(ts == 0 && tc > 0);
        tally.dir_amb += usize::from(ts > 0 && tc > 0);
    }

    Ok(tally)
}

fn consolidate_direction(sig: &mut Signature, tally: &DirTally) -> Result<()> {
    if sig.flags & SIG_FLAG_TXBOTHDIR != 0 {
        if tally.ts_excl == 0 || tally.tc_excl == 0 {
            return Err(RuleError::Parse(format!(
                "rule {} should use both directions, but does not",
                sig.id
            )));
        }
        if tally.dir_amb > 0 {
            return Err(RuleError::Parse(format!(
                "rule {} means to use both directions, cannot have keywords ambiguous about \
                 directions",
                sig.id
            )));
        }
    } else if tally.ts_excl > 0 && tally.tc_excl > 0 {
        return Err(RuleError::Parse(format!(
            "rule {} mixes keywords with conflicting directions; a transactional rule with => \
             should be used",
            sig.id
        )));
    } else if tally.ts_excl > 0 {
        debug!(sid = sig.id, "implied rule direction is toserver");
        flow::setup_implicit(sig, SIG_FLAG_TOSERVER).map_err(|_| {
            RuleError::Parse(format!("rule {} mixes keywords with conflicting directions", sig.id))
        })?;
    } else if tally.tc_excl > 0 {
        debug!(sid = sig.id, "implied rule direction is toclient");
        flow::setup_implicit(sig, SIG_FLAG_TOCLIENT).map_err(|_| {
            RuleError::Parse(format!("rule {} mixes keywords with conflicting directions", sig.id))
        })?;
    } else if tally.dir_amb > 0 {
        debug!(sid = sig.id, "rule direction cannot be deduced from keywords");
    }
    Ok(())
}

/// TCP rules with payload content default to stream matching; depth/offset
/// anchoring and stream_size checks additionally need packets.
fn consolidate_tcp_buffer(sig: &mut Signature) {
    if !sig.proto.contains(IPPROTO_TCP) {
        return;
    }
    let init = sig.init_data();
    if init.smlists[LIST_PMATCH as usize].is_empty() {
        return;
    }
    if sig.flags & (SIG_FLAG_REQUIRE_PACKET | SIG_FLAG_REQUIRE_STREAM) != 0 {
        return;
    }

    let mut flags = SIG_FLAG_REQUIRE_STREAM;
    for &h in &init.smlists[LIST_PMATCH as usize] {
        let sm = init.store.get(h);
        if sm.kw == Kw::Content {
            if let Some(cd) = sm.ctx.as_content() {
                if cd.depth.is_some() || cd.offset.is_some() {
                    flags |= SIG_FLAG_REQUIRE_PACKET;
                    break;
                }
            }
        }
    }
    if init.smlists[LIST_MATCH as usize]
        .iter()
        .any(|h| init.store.get(*h).kw == Kw::StreamSize)
    {
        flags |= SIG_FLAG_REQUIRE_PACKET;
    }
    sig.flags |= flags;
}

/// Derive the broad execution class from flags and keyword composition.
fn signature_type(tables: &EngineTables, sig: &Signature) -> SigType {
    let init = sig.init_data();

    let uses_app_buffer = init.buffers.iter().any(|b| {
        tables
            .buffers
            .get(b.id)
            .map(|bt| !bt.packet && !bt.frame)
            .unwrap_or(false)
    });
    if sig.flags & SIG_FLAG_APPLAYER != 0
        || sig.alproto != AppProto::Unknown
        || uses_app_buffer
        || matches!(init.hook, SignatureHook::App(_))
    {
        return SigType::AppTx;
    }

    let require_packet = sig.flags & SIG_FLAG_REQUIRE_PACKET != 0;
    let require_stream = sig.flags & SIG_FLAG_REQUIRE_STREAM != 0;
    if require_packet && require_stream {
        return SigType::PktStream;
    }
    if require_stream {
        return SigType::Stream;
    }

    let no_matches =
        init.smlists.iter().all(|l| l.is_empty()) && init.buffers.is_empty();
    if no_matches
        && sig.flags & SIG_FLAG_SP_ANY != 0
        && sig.flags & SIG_FLAG_DP_ANY != 0
        && init.hook == SignatureHook::None
        && sig.flags & SIG_FLAG_TXBOTHDIR == 0
    {
        return SigType::IpOnly;
    }

    SigType::Pkt
}

/// Map (firewall, type, hook) onto the execution plane.
fn detect_table(sig: &Signature) -> DetectTable {
    if sig.flags & SIG_FLAG_FIREWALL != 0 {
        if sig.sig_type == SigType::AppTx {
            return DetectTable::AppFilter;
        }
        return match sig.init_data().hook {
            SignatureHook::Pkt(PktHook::PreStream) => DetectTable::PacketPreStream,
            SignatureHook::Pkt(PktHook::PreFlow) => DetectTable::PacketPreFlow,
            _ => DetectTable::PacketFilter,
        };
    }
    if sig.sig_type == SigType::AppTx {
        DetectTable::AppTd
    } else {
        DetectTable::PacketTd
    }
}

fn inspects_files(sig: &Signature) -> bool {
    sig.flags & SIG_FLAG_FILESTORE != 0
        || sig.file_flags != 0
        || sig.init_data().init_flags & SIG_INIT_FILEDATA != 0
}

fn validate_file_handling(sig: &Signature) -> Result<()> {
    if !inspects_files(sig) {
        return Ok(());
    }

    if sig.alproto != AppProto::Unknown && !sig.alproto.supports_files() {
        return Err(RuleError::Parse(format!(
            "protocol {} doesn't support file matching",
            sig.alproto.name()
        )));
    }
    let alprotos = &sig.init_data().alprotos;
    if alprotos[0] != AppProto::Unknown
        && !alprotos
            .iter()
            .filter(|p| **p != AppProto::Unknown)
            .any(|p| p.supports_files())
    {
        return Err(RuleError::parse("no protocol in the rule supports file matching"));
    }
    if sig.alproto == AppProto::Http2
        && sig.file_flags & crate::signature::FILE_NEED_FILENAME != 0
    {
        return Err(RuleError::parse("protocol http2 doesn't support file name matching"));
    }
    Ok(())
}

/// Every keyword in the packet match list must accept the signature's
/// detect table.
fn validate_table_compat(registry: &KeywordRegistry, sig: &Signature) -> Result<()> {
    if sig.detect_table == DetectTable::NotSet {
        return Ok(());
    }
    let table_flag = sig.detect_table.as_flag();
    let init = sig.init_data();
    for &h in &init.smlists[LIST_MATCH as usize] {
        let kw = init.store.get(h).kw;
        let supported = registry.spec(kw).tables;
        if supported != 0 && supported & table_flag == 0 {
            return Err(RuleError::Parse(format!(
                "rule {} uses hook \"{}\", but keyword \"{}\" doesn't support this hook",
                sig.id,
                sig.detect_table.name(),
                registry.name_of(kw)
            )));
        }
    }
    Ok(())
}
