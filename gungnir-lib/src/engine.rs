//! The detection engine build context: registries, the signature list and
//! duplicate resolution.

use ahash::{AHashMap, AHashSet};
use tracing::{info, warn};

use crate::buffers::{register_app_hook_lists, register_builtin, BufferRegistry, InspectEngine};
use crate::config::EngineConfig;
use crate::error::{Result, RuleError};
use crate::keyword::{Kw, KeywordRegistry};
use crate::options::{OptionParser, Pass};
use crate::parse::{parse_header, split_rule};
use crate::prefilter::setup_prefilter;
use crate::proto::{AppProto, PROTO_ANY};
use crate::signature::{
    PktHook, Signature, SignatureHook, DEFAULT_PRIO, LIST_MATCH, SIG_FLAG_APPLAYER,
    SIG_FLAG_FIREWALL, SIG_FLAG_TOCLIENT, SIG_FLAG_TOSERVER, SIG_INIT_BIDIREC, SIG_INIT_FLOW,
    SIG_INIT_PACKET,
};
use crate::validate::validate_and_consolidate;

/// One entry of the classification table: a classtype name mapped to its
/// description and default priority.
#[derive(Debug, Clone)]
pub struct Classification {
    pub description: String,
    pub priority: i32,
}

/// Read-only lookup tables shared by all keyword setups during a build.
pub struct EngineTables {
    pub buffers: BufferRegistry,
    pub inspect: Vec<InspectEngine>,
    pub classifications: AHashMap<String, Classification>,
}

impl EngineTables {
    pub fn new() -> Self {
        let mut buffers = BufferRegistry::new();
        let mut inspect = Vec::new();
        register_builtin(&mut buffers, &mut inspect);
        register_app_hook_lists(&mut buffers, &mut inspect);
        EngineTables { buffers, inspect, classifications: builtin_classifications() }
    }
}

impl Default for EngineTables {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_classifications() -> AHashMap<String, Classification> {
    let entries = [
        ("not-suspicious", "Not Suspicious Traffic", 3),
        ("unknown", "Unknown Traffic", 3),
        ("bad-unknown", "Potentially Bad Traffic", 2),
        ("attempted-recon", "Attempted Information Leak", 2),
        ("successful-recon-limited", "Information Leak", 2),
        ("attempted-dos", "Attempted Denial of Service", 2),
        ("successful-dos", "Denial of Service", 2),
        ("attempted-user", "Attempted User Privilege Gain", 1),
        ("attempted-admin", "Attempted Administrator Privilege Gain", 1),
        ("trojan-activity", "A Network Trojan was Detected", 1),
        ("web-application-attack", "Web Application Attack", 1),
        ("misc-attack", "Misc Attack", 2),
        ("misc-activity", "Misc activity", 3),
        ("policy-violation", "Potential Corporate Privacy Violation", 1),
    ];
    entries
        .into_iter()
        .map(|(name, description, priority)| {
            (
                name.to_string(),
                Classification { description: description.to_string(), priority },
            )
        })
        .collect()
}

/// A freshly parsed rule: the signature and, for asymmetric `<>` rules, its
/// mirrored companion.
pub struct SigChain {
    pub main: Signature,
    pub companion: Option<Signature>,
}

/// Per-build detection engine context. Single-threaded: one engine builds
/// its signature list from one thread; the keyword registry it holds is
/// read-only after construction.
pub struct DetectEngine {
    config: EngineConfig,
    registry: KeywordRegistry,
    pub tables: EngineTables,
    /// Installed signatures, newest first.
    sigs: Vec<Signature>,
    /// Revision of the installed signature per (gid, sid).
    dup: AHashMap<(u32, u32), u32>,
    signum: u32,
    /// Keywords whose silent-error diagnostic has already been emitted.
    silent_seen: AHashSet<Kw>,
}

impl DetectEngine {
    pub fn new(config: EngineConfig) -> Self {
        let mut registry = KeywordRegistry::builtin();
        registry.apply_strict(&config.strict_keywords);
        DetectEngine {
            config,
            registry,
            tables: EngineTables::new(),
            sigs: Vec::new(),
            dup: AHashMap::new(),
            signum: 0,
            silent_seen: AHashSet::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &KeywordRegistry {
        &self.registry
    }

    /// Installed signatures, newest first.
    pub fn signatures(&self) -> &[Signature] {
        &self.sigs
    }

    /// Parse a rule and install it, resolving `(gid, sid)` duplicates by
    /// revision. Returns the head of the installed chain.
    pub fn append_rule(&mut self, rule: &str) -> Result<&Signature> {
        let chain = self.sig_init(rule)?;

        let key = (chain.main.gid, chain.main.id);
        match self.dup.get(&key).copied() {
            None => {
                self.dup.insert(key, chain.main.rev);
            }
            Some(old_rev) if chain.main.rev <= old_rev => {
                warn!(gid = key.0, sid = key.1, "duplicate signature, dropping");
                return Err(RuleError::Duplicate { gid: key.0, sid: key.1 });
            }
            Some(_) => {
                warn!(
                    gid = key.0,
                    sid = key.1,
                    rev = chain.main.rev,
                    "signature with newer revision replaces the older one"
                );
                self.sigs.retain(|s| !(s.gid == key.0 && s.id == key.1));
                self.dup.insert(key, chain.main.rev);
            }
        }

        let SigChain { mut main, companion } = chain;
        main.init = None;
        if let Some(mut c) = companion {
            c.init = None;
            self.sigs.insert(0, c);
        }
        self.sigs.insert(0, main);
        Ok(&self.sigs[0])
    }

    /// Parse a rule into a signature chain without installing it. For `<>`
    /// rules with distinct endpoints the chain carries the mirrored clone;
    /// symmetric rules are downgraded to unidirectional.
    pub fn sig_init(&mut self, rule: &str) -> Result<SigChain> {
        let old_signum = self.signum;
        let result = self.sig_init_do(rule);
        if result.is_err() {
            // rejected rules must not leak internal ids
            self.signum = old_signum;
        }
        result
    }

    fn sig_init_do(&mut self, rule: &str) -> Result<SigChain> {
        let mut main = self.sig_init_helper(rule, false)?;

        if main.is_bidirectional() {
            if main.has_same_source_and_destination() {
                info!(
                    sid = main.id,
                    "rule is bidirectional, but source and destination are the same; treating \
                     the rule as unidirectional"
                );
                main.init_data_mut().init_flags &= !SIG_INIT_BIDIREC;
            } else {
                main.bidirectional = true;
                let mut companion = self.sig_init_helper(rule, true)?;
                companion.bidirectional = true;
                return Ok(SigChain { main, companion: Some(companion) });
            }
        }
        Ok(SigChain { main, companion: None })
    }

    /// Build one signature from the rule text: scan pass, build pass, and
    /// the consolidation pipeline.
    fn sig_init_helper(&mut self, rule: &str, swapped: bool) -> Result<Signature> {
        let DetectEngine {
            ref config,
            ref registry,
            ref tables,
            ref mut silent_seen,
            ref mut signum,
            ..
        } = *self;

        let mut sig = Signature::new(rule);
        if config.firewall {
            sig.init_data_mut().firewall_rule = true;
            sig.flags |= SIG_FLAG_FIREWALL;
        }

        let parser = split_rule(rule)?;

        // scan pass: only requires and sid run, so unmet requirements are
        // detected before any stateful keyword setup
        let mut options = OptionParser { registry, tables, config, silent_seen };
        options.parse(&mut sig, &parser.opts, Pass::Scan)?;

        if sig.id == 0 {
            return Err(RuleError::parse("signature missing required value \"sid\""));
        }

        parse_header(&mut sig, &parser, tables, config, swapped)?;
        options.parse(&mut sig, &parser.opts, Pass::Build)?;

        if sig.prio == -1 {
            sig.prio = DEFAULT_PRIO;
        }
        sig.iid = *signum;
        *signum += 1;

        // reconcile the IP protocol set with an app protocol a keyword set
        if sig.alproto != AppProto::Unknown {
            let override_needed = if sig.proto.flags & PROTO_ANY != 0 {
                sig.proto.flags &= !PROTO_ANY;
                sig.proto.clear();
                true
            } else {
                sig.proto.is_empty()
            };
            if override_needed {
                sig.alproto.supported_ipprotos(&mut sig.proto);
            }
        }

        // rules without app-layer matching default to packet evaluation
        if sig.flags & SIG_FLAG_APPLAYER == 0 {
            let packet_eval = {
                let init = sig.init_data();
                let match_list = &init.smlists[LIST_MATCH as usize];
                match_list.is_empty()
                    || match_list
                        .iter()
                        .any(|h| registry.spec(init.store.get(*h).kw).packet_match)
            };
            if packet_eval {
                sig.init_data_mut().init_flags |= SIG_INIT_PACKET;
            }
        }

        if sig.init_data().hook == SignatureHook::Pkt(PktHook::FlowStart)
            && sig.flags & SIG_FLAG_TOSERVER != 0
        {
            sig.init_data_mut().init_flags |= SIG_INIT_FLOW;
        }

        if sig.init_data().init_flags & SIG_INIT_FLOW == 0
            && sig.flags & (SIG_FLAG_TOSERVER | SIG_FLAG_TOCLIENT) == 0
        {
            sig.flags |= SIG_FLAG_TOSERVER | SIG_FLAG_TOCLIENT;
        }

        sig.build_address_match_arrays();

        setup_prefilter(registry, tables, config, &mut sig);

        validate_and_consolidate(registry, tables, &mut sig, &parser, swapped)?;

        sig.flatten_matches();
        Ok(sig)
    }
}
