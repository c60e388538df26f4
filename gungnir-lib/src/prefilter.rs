//! Prefilter and fast-pattern selection.
//!
//! Each signature gets at most one prefilter: the match the engine
//! evaluates as a cheap pre-check. Content patterns go through the
//! fast-pattern picker; other keywords can be promoted when the engine
//! allows automatic prefilters.

use tracing::debug;

use crate::config::{EngineConfig, PrefilterSetting};
use crate::engine::EngineTables;
use crate::keyword::{Kw, KeywordRegistry};
use crate::signature::{Signature, LIST_PMATCH, SIG_FLAG_PREFILTER};

/// Pick the fast pattern for a signature: an explicitly flagged content if
/// any, otherwise the longest content across MPM-capable lists, latest
/// attachment winning ties. Populates the selected handle and list.
pub fn retrieve_fast_pattern(tables: &EngineTables, sig: &mut Signature) {
    struct Candidate {
        handle: usize,
        list: u32,
        flagged: bool,
        len: usize,
        idx: u32,
    }

    let init = sig.init_data();
    let mut best: Option<Candidate> = None;

    let mut consider = |handle: usize, list: u32| {
        let sm = init.store.get(handle);
        let Some(cd) = sm.ctx.as_content() else { return };
        let cand = Candidate {
            handle,
            list,
            flagged: cd.fast_pattern,
            len: cd.pattern.len(),
            idx: sm.idx,
        };
        let better = match &best {
            None => true,
            Some(b) => {
                (cand.flagged, cand.len, cand.idx) > (b.flagged, b.len, b.idx)
            }
        };
        if better {
            best = Some(cand);
        }
    };

    for &h in &init.smlists[LIST_PMATCH as usize] {
        consider(h, LIST_PMATCH);
    }
    for b in &init.buffers {
        if !tables.buffers.supports_mpm(b.id) {
            continue;
        }
        for &h in &b.sms {
            consider(h, b.id);
        }
    }

    if let Some(c) = best {
        let init = sig.init_data_mut();
        init.mpm_sm = Some(c.handle);
        init.mpm_sm_list = Some(c.list);
    }
}

/// Choose the signature's prefilter, honoring an explicit choice made
/// during keyword setup before falling back to the fast-pattern picker and
/// the automatic promotion of prefilter-capable keywords.
pub fn setup_prefilter(
    registry: &KeywordRegistry,
    tables: &EngineTables,
    config: &EngineConfig,
    sig: &mut Signature,
) {
    if let Some(h) = sig.init_data().prefilter_sm {
        if sig.init_data().store.get(h).kw == Kw::Content {
            retrieve_fast_pattern(tables, sig);
            if sig.init_data().mpm_sm.is_some() {
                sig.flags |= SIG_FLAG_PREFILTER;
                return;
            }
            // fall through when the matcher can't take this pattern
        } else {
            sig.flags |= SIG_FLAG_PREFILTER;
            return;
        }
    } else {
        retrieve_fast_pattern(tables, sig);
        if sig.init_data().mpm_sm.is_some() {
            sig.flags |= SIG_FLAG_PREFILTER;
            return;
        }
    }

    if !sig.init_data().has_possible_prefilter {
        return;
    }
    if config.prefilter != PrefilterSetting::Auto {
        return;
    }

    // promote the prefilter-capable keyword with the lowest id
    let mut chosen: Option<(Kw, usize)> = None;
    for list in sig.init_data().smlists.iter() {
        for &h in list {
            let kw = sig.init_data().store.get(h).kw;
            let Some(supported) = registry.spec(kw).supports_prefilter else {
                continue;
            };
            if !supported(sig) {
                continue;
            }
            match chosen {
                Some((k, _)) if k <= kw => {}
                _ => chosen = Some((kw, h)),
            }
        }
    }
    if let Some((kw, h)) = chosen {
        sig.init_data_mut().prefilter_sm = Some(h);
        sig.flags |= SIG_FLAG_PREFILTER;
        debug!(sid = sig.id, keyword = registry.name_of(kw), "prefilter promoted");
    }
}
