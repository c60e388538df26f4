//! The signature data model: the rule being built, its transient build
//! state, and the compiled artifacts the detection engine consumes.

use crate::address::{AddressGroup, IpOnlyCidr};
use crate::keyword::Kw;
use crate::ports::PortGroup;
use crate::proto::{AppProto, ProtoSet, SIG_ALPROTO_MAX};
use crate::sigmatch::{MatchCtx, MatchStore, SmHandle};

pub const SIG_FLAG_SRC_ANY: u32 = 1 << 0;
pub const SIG_FLAG_DST_ANY: u32 = 1 << 1;
pub const SIG_FLAG_SP_ANY: u32 = 1 << 2;
pub const SIG_FLAG_DP_ANY: u32 = 1 << 3;
pub const SIG_FLAG_TOSERVER: u32 = 1 << 4;
pub const SIG_FLAG_TOCLIENT: u32 = 1 << 5;
/// Transactional rule evaluated against both directions (`=>`).
pub const SIG_FLAG_TXBOTHDIR: u32 = 1 << 6;
pub const SIG_FLAG_APPLAYER: u32 = 1 << 7;
pub const SIG_FLAG_REQUIRE_PACKET: u32 = 1 << 8;
pub const SIG_FLAG_REQUIRE_STREAM: u32 = 1 << 9;
pub const SIG_FLAG_FIREWALL: u32 = 1 << 10;
pub const SIG_FLAG_PREFILTER: u32 = 1 << 11;
pub const SIG_FLAG_FILESTORE: u32 = 1 << 12;

pub const SIG_INIT_BIDIREC: u32 = 1 << 0;
pub const SIG_INIT_PACKET: u32 = 1 << 1;
pub const SIG_INIT_FLOW: u32 = 1 << 2;
pub const SIG_INIT_FILEDATA: u32 = 1 << 3;
pub const SIG_INIT_FORCE_TOSERVER: u32 = 1 << 4;
pub const SIG_INIT_FORCE_TOCLIENT: u32 = 1 << 5;
pub const SIG_INIT_PRIO_EXPLICIT: u32 = 1 << 6;

pub const ACTION_ALERT: u8 = 1 << 0;
pub const ACTION_DROP: u8 = 1 << 1;
pub const ACTION_PASS: u8 = 1 << 2;
pub const ACTION_REJECT: u8 = 1 << 3;
pub const ACTION_REJECT_DST: u8 = 1 << 4;
pub const ACTION_REJECT_BOTH: u8 = 1 << 5;
pub const ACTION_CONFIG: u8 = 1 << 6;
pub const ACTION_ACCEPT: u8 = 1 << 7;
pub const ACTION_REJECT_ANY: u8 = ACTION_REJECT | ACTION_REJECT_DST | ACTION_REJECT_BOTH;

pub const FILE_NEED_FILENAME: u8 = 1 << 0;

/// Classical (fixed-slot) match list ids. Dynamically registered buffer
/// types take ids starting at [`LIST_MAX`].
pub const LIST_MATCH: u32 = 0;
pub const LIST_PMATCH: u32 = 1;
pub const LIST_POSTMATCH: u32 = 2;
pub const LIST_MAX: u32 = 3;

pub const DEFAULT_PRIO: i32 = 3;

/// How far an authoritative action reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionScope {
    #[default]
    NotSet,
    Packet,
    Flow,
    Tx,
    Hook,
}

/// Packet-level execution points a rule can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PktHook {
    FlowStart,
    PreFlow,
    PreStream,
    All,
}

impl PktHook {
    pub fn from_name(s: &str) -> Option<PktHook> {
        match s {
            "flow_start" => Some(PktHook::FlowStart),
            "pre_flow" => Some(PktHook::PreFlow),
            "pre_stream" => Some(PktHook::PreStream),
            "all" => Some(PktHook::All),
            _ => None,
        }
    }
}

/// App-level execution point: a protocol state at a given transaction
/// progress, backed by a generic inspection list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppHook {
    pub alproto: AppProto,
    pub progress: u8,
    pub list: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureHook {
    #[default]
    None,
    Pkt(PktHook),
    App(AppHook),
}

/// Broad execution class a finished signature falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigType {
    #[default]
    NotSet,
    IpOnly,
    Pkt,
    Stream,
    PktStream,
    AppTx,
}

/// Execution plane the engine schedules a signature on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DetectTable {
    #[default]
    NotSet = 0,
    PacketPreFlow = 1,
    PacketPreStream = 2,
    PacketFilter = 3,
    PacketTd = 4,
    AppFilter = 5,
    AppTd = 6,
}

impl DetectTable {
    pub const fn as_flag(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            DetectTable::NotSet => "not_set",
            DetectTable::PacketPreFlow => "packet_pre_flow",
            DetectTable::PacketPreStream => "packet_pre_stream",
            DetectTable::PacketFilter => "packet_filter",
            DetectTable::PacketTd => "packet_td",
            DetectTable::AppFilter => "app_filter",
            DetectTable::AppTd => "app_td",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub scheme: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub entries: Vec<(String, String)>,
    pub json: String,
}

/// One compiled match instance in a flattened per-list array. The keyword
/// context is moved here from the build-time store; insertion order is kept
/// in `idx`.
#[derive(Debug)]
pub struct SigMatchData {
    pub kw: Kw,
    pub idx: u32,
    pub ctx: MatchCtx,
}

/// A sticky buffer under construction: one dynamically-registered buffer
/// type holding an ordered run of match instances.
#[derive(Debug, Default)]
pub struct InitBuffer {
    pub id: u32,
    pub sms: Vec<SmHandle>,
    /// Buffer was opened by a match append rather than a sticky keyword.
    pub sm_init: bool,
    pub only_ts: bool,
    pub only_tc: bool,
    pub multi_capable: bool,
}

/// Transient state owned by a signature while it is being parsed. Dropped
/// once the match lists are flattened.
#[derive(Debug)]
pub struct SignatureInitData {
    pub store: MatchStore,
    pub smlists: [Vec<SmHandle>; LIST_MAX as usize],
    pub buffers: Vec<InitBuffer>,
    /// Index into `buffers` of the currently open sticky buffer.
    pub curbuf: Option<usize>,
    /// Sticky list id set by the most recent sticky-buffer keyword.
    pub list: Option<u32>,
    pub init_flags: u32,
    /// Set for the keyword currently being parsed when its value was
    /// negated; cleared after each setup call.
    pub negated: bool,
    pub hook: SignatureHook,
    pub firewall_rule: bool,
    pub has_possible_prefilter: bool,
    pub prefilter_sm: Option<SmHandle>,
    pub mpm_sm: Option<SmHandle>,
    pub mpm_sm_list: Option<u32>,
    /// Alternative app protocols; populated only while more than one is
    /// still possible.
    pub alprotos: [AppProto; SIG_ALPROTO_MAX],
    pub src: AddressGroup,
    pub dst: AddressGroup,
    pub max_content_list_id: u32,
}

impl Default for SignatureInitData {
    fn default() -> Self {
        SignatureInitData {
            store: MatchStore::default(),
            smlists: Default::default(),
            buffers: Vec::with_capacity(8),
            curbuf: None,
            list: None,
            init_flags: 0,
            negated: false,
            hook: SignatureHook::None,
            firewall_rule: false,
            has_possible_prefilter: false,
            prefilter_sm: None,
            mpm_sm: None,
            mpm_sm_list: None,
            alprotos: [AppProto::Unknown; SIG_ALPROTO_MAX],
            src: AddressGroup::default(),
            dst: AddressGroup::default(),
            max_content_list_id: 0,
        }
    }
}

/// A parsed detection rule.
#[derive(Debug)]
pub struct Signature {
    pub id: u32,
    pub gid: u32,
    pub rev: u32,
    /// Internal id, assigned in engine load order.
    pub iid: u32,
    pub action: u8,
    pub action_scope: ActionScope,
    pub flags: u32,
    pub proto: ProtoSet,
    pub alproto: AppProto,
    pub app_progress_hook: u8,
    pub prio: i32,
    pub msg: Option<String>,
    pub references: Vec<Reference>,
    pub metadata: Option<Metadata>,
    pub sp: PortGroup,
    pub dp: PortGroup,
    pub addr_src_match4: Vec<(u32, u32)>,
    pub addr_dst_match4: Vec<(u32, u32)>,
    pub addr_src_match6: Vec<(u128, u128)>,
    pub addr_dst_match6: Vec<(u128, u128)>,
    pub sig_type: SigType,
    pub detect_table: DetectTable,
    pub file_flags: u8,
    /// Flattened classical lists, indexed by list id.
    pub matches: Vec<Vec<SigMatchData>>,
    /// Flattened sticky buffers as (buffer id, matches) pairs.
    pub buffer_matches: Vec<(u32, Vec<SigMatchData>)>,
    pub iponly_src: Vec<IpOnlyCidr>,
    pub iponly_dst: Vec<IpOnlyCidr>,
    /// Half of a mirrored `<>` pair.
    pub bidirectional: bool,
    pub rule: String,
    pub init: Option<Box<SignatureInitData>>,
}

impl Signature {
    pub fn new(rule: &str) -> Self {
        Signature {
            id: 0,
            gid: 1,
            rev: 0,
            iid: 0,
            action: 0,
            action_scope: ActionScope::NotSet,
            flags: 0,
            proto: ProtoSet::new(),
            alproto: AppProto::Unknown,
            app_progress_hook: 0,
            // overwritten by priority/classtype; -1 marks "not set" so the
            // default can be applied after parsing
            prio: -1,
            msg: None,
            references: Vec::new(),
            metadata: None,
            sp: PortGroup::default(),
            dp: PortGroup::default(),
            addr_src_match4: Vec::new(),
            addr_dst_match4: Vec::new(),
            addr_src_match6: Vec::new(),
            addr_dst_match6: Vec::new(),
            sig_type: SigType::NotSet,
            detect_table: DetectTable::NotSet,
            file_flags: 0,
            matches: Vec::new(),
            buffer_matches: Vec::new(),
            iponly_src: Vec::new(),
            iponly_dst: Vec::new(),
            bidirectional: false,
            rule: rule.to_string(),
            init: Some(Box::new(SignatureInitData::default())),
        }
    }

    pub fn init_data(&self) -> &SignatureInitData {
        self.init.as_ref().expect("signature is still being built")
    }

    pub fn init_data_mut(&mut self) -> &mut SignatureInitData {
        self.init.as_mut().expect("signature is still being built")
    }

    pub fn is_bidirectional(&self) -> bool {
        self.init
            .as_ref()
            .map(|i| i.init_flags & SIG_INIT_BIDIREC != 0)
            .unwrap_or(false)
    }

    /// Set the single app protocol for this rule, reconciling with a
    /// possibly narrowed multi-protocol set.
    pub fn set_app_proto(&mut self, alproto: AppProto) -> Result<(), String> {
        if !alproto.is_valid() {
            return Err(format!("invalid app protocol {alproto:?}"));
        }

        if self.init_data().alprotos[0] != AppProto::Unknown {
            let found = self.init_data().alprotos.contains(&alproto);
            if !found {
                return Err(format!(
                    "app protocol {} is not in the rule's protocol set",
                    alproto.name()
                ));
            }
            // narrow the multi-protocol set down to the scalar
            self.init_data_mut().alprotos = [AppProto::Unknown; SIG_ALPROTO_MAX];
        }

        if self.alproto != AppProto::Unknown && self.alproto != alproto {
            return Err(format!(
                "can't set rule app proto to {}: already set to {}",
                alproto.name(),
                self.alproto.name()
            ));
        }

        self.alproto = alproto;
        self.flags |= SIG_FLAG_APPLAYER;
        Ok(())
    }

    /// Register a set of alternative app protocols (e.g. a fingerprint
    /// buffer valid for both tls and quic). A later scalar assignment must
    /// pick one of them; two sets intersect, and a singleton intersection
    /// collapses into the scalar protocol.
    pub fn set_multi_app_protos(&mut self, alprotos: &[AppProto]) -> Result<(), String> {
        if self.alproto != AppProto::Unknown {
            if alprotos.contains(&self.alproto) {
                return Ok(());
            }
            return Err(format!(
                "app protocol already set to {}, not part of the proposed set",
                self.alproto.name()
            ));
        }

        if self.init_data().alprotos[0] != AppProto::Unknown {
            let current = self.init_data().alprotos;
            let mut next = [AppProto::Unknown; SIG_ALPROTO_MAX];
            let mut n = 0;
            for p in current.iter().filter(|p| **p != AppProto::Unknown) {
                if alprotos.contains(p) {
                    next[n] = *p;
                    n += 1;
                }
            }
            match n {
                0 => return Err("app protocol sets do not intersect".into()),
                1 => {
                    self.init_data_mut().alprotos = [AppProto::Unknown; SIG_ALPROTO_MAX];
                    return self.set_app_proto(next[0]).map_err(|e| e.to_string());
                }
                _ => self.init_data_mut().alprotos = next,
            }
            return Ok(());
        }

        match alprotos.len() {
            0 => Err("empty app protocol set".into()),
            1 => self.set_app_proto(alprotos[0]),
            _ => {
                let mut set = [AppProto::Unknown; SIG_ALPROTO_MAX];
                for (slot, p) in set.iter_mut().zip(alprotos.iter()) {
                    *slot = *p;
                }
                self.init_data_mut().alprotos = set;
                Ok(())
            }
        }
    }

    /// Build the compact per-family address match tables from the parsed
    /// groups.
    pub fn build_address_match_arrays(&mut self) {
        let init = self.init.as_ref().expect("signature is still being built");
        self.addr_src_match4 = init.src.v4.clone();
        self.addr_dst_match4 = init.dst.v4.clone();
        self.addr_src_match6 = init.src.v6.clone();
        self.addr_dst_match6 = init.dst.v6.clone();
    }

    /// Flatten the classical lists and sticky buffers into compact arrays,
    /// transferring each keyword context out of the build-time store.
    pub fn flatten_matches(&mut self) {
        let init = self.init.as_mut().expect("signature is still being built");
        let SignatureInitData { ref mut store, ref smlists, ref buffers, .. } = **init;

        let mut matches = Vec::with_capacity(LIST_MAX as usize);
        for list in smlists.iter() {
            matches.push(
                list.iter()
                    .map(|h| store.take_as_data(*h))
                    .collect::<Vec<_>>(),
            );
        }
        self.matches = matches;

        self.buffer_matches = buffers
            .iter()
            .map(|b| {
                (
                    b.id,
                    b.sms.iter().map(|h| store.take_as_data(*h)).collect::<Vec<_>>(),
                )
            })
            .collect();
    }

    /// Whether source and destination provably cover the same endpoints.
    /// Decides if a `<>` rule really needs a mirrored clone.
    pub fn has_same_source_and_destination(&self) -> bool {
        if self.flags & SIG_FLAG_SP_ANY == 0 || self.flags & SIG_FLAG_DP_ANY == 0 {
            if !self.sp.same_coverage(&self.dp) {
                return false;
            }
        }
        if self.flags & SIG_FLAG_SRC_ANY == 0 || self.flags & SIG_FLAG_DST_ANY == 0 {
            let init = self.init_data();
            if !init.src.same_coverage(&init.dst) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_alproto_then_matching_scalar_narrows() {
        let mut s = Signature::new("test");
        s.set_multi_app_protos(&[AppProto::Tls, AppProto::Quic]).expect("set");
        assert_eq!(s.alproto, AppProto::Unknown);
        assert_eq!(s.init_data().alprotos[0], AppProto::Tls);

        s.set_app_proto(AppProto::Tls).expect("narrow");
        assert_eq!(s.alproto, AppProto::Tls);
        assert_eq!(s.init_data().alprotos[0], AppProto::Unknown);
    }

    #[test]
    fn multi_alproto_then_foreign_scalar_fails() {
        let mut s = Signature::new("test");
        s.set_multi_app_protos(&[AppProto::Tls, AppProto::Quic]).expect("set");
        assert!(s.set_app_proto(AppProto::Dns).is_err());
    }

    #[test]
    fn multi_alproto_intersection() {
        let mut s = Signature::new("test");
        s.set_multi_app_protos(&[AppProto::Tls, AppProto::Quic, AppProto::Dns]).expect("set");
        s.set_multi_app_protos(&[AppProto::Quic, AppProto::Dns]).expect("intersect");
        let live: Vec<_> = s
            .init_data()
            .alprotos
            .iter()
            .filter(|p| **p != AppProto::Unknown)
            .copied()
            .collect();
        assert_eq!(live, vec![AppProto::Quic, AppProto::Dns]);
    }

    #[test]
    fn multi_alproto_singleton_intersection_collapses() {
        let mut s = Signature::new("test");
        s.set_multi_app_protos(&[AppProto::Tls, AppProto::Quic]).expect("set");
        s.set_multi_app_protos(&[AppProto::Quic, AppProto::Dns]).expect("intersect");
        assert_eq!(s.alproto, AppProto::Quic);
        assert_eq!(s.init_data().alprotos[0], AppProto::Unknown);
        assert!(s.flags & SIG_FLAG_APPLAYER != 0);
    }

    #[test]
    fn multi_alproto_disjoint_intersection_fails() {
        let mut s = Signature::new("test");
        s.set_multi_app_protos(&[AppProto::Tls, AppProto::Quic]).expect("set");
        assert!(s.set_multi_app_protos(&[AppProto::Dns, AppProto::Smtp]).is_err());
    }

    #[test]
    fn scalar_then_matching_multi_is_a_no_op() {
        let mut s = Signature::new("test");
        s.set_app_proto(AppProto::Tls).expect("set");
        s.set_multi_app_protos(&[AppProto::Tls, AppProto::Quic]).expect("compatible");
        assert_eq!(s.alproto, AppProto::Tls);
    }

    #[test]
    fn scalar_conflicts_with_other_scalar() {
        let mut s = Signature::new("test");
        s.set_app_proto(AppProto::Tls).expect("set");
        assert!(s.set_app_proto(AppProto::Dns).is_err());
    }

    #[test]
    fn empty_multi_set_is_refused() {
        let mut s = Signature::new("test");
        assert!(s.set_multi_app_protos(&[]).is_err());
    }
}
