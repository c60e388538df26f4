//! Match-instance storage and the list/buffer attachment model.
//!
//! Keyword setups attach match instances either to one of the classical
//! fixed lists or to a dynamically-indexed sticky buffer. Instances live in
//! a per-signature store; lists hold handles into it, so moving an instance
//! between lists is a handle splice that keeps its insertion index.

use crate::keyword::Kw;
use crate::keywords::content::ContentData;
use crate::keywords::flow::FlowData;
use crate::keywords::packet::{DsizeData, StreamSizeData};
use crate::signature::{
    InitBuffer, SigMatchData, Signature, LIST_MAX, SIG_INIT_FORCE_TOCLIENT,
    SIG_INIT_FORCE_TOSERVER,
};

/// Handle of a match instance inside its signature's store.
pub type SmHandle = usize;

/// Maximum number of sticky buffers a single rule may open.
const BUFFERS_CAP: usize = 64;
const BUFFERS_CHUNK: usize = 8;

/// Keyword-owned context attached to a match instance.
#[derive(Debug, Default)]
pub enum MatchCtx {
    #[default]
    None,
    Content(ContentData),
    Flow(FlowData),
    Dsize(DsizeData),
    StreamSize(StreamSizeData),
}

impl MatchCtx {
    pub fn as_content(&self) -> Option<&ContentData> {
        match self {
            MatchCtx::Content(cd) => Some(cd),
            _ => None,
        }
    }

    pub fn as_content_mut(&mut self) -> Option<&mut ContentData> {
        match self {
            MatchCtx::Content(cd) => Some(cd),
            _ => None,
        }
    }
}

/// One attached keyword instance.
#[derive(Debug)]
pub struct SigMatch {
    pub kw: Kw,
    /// Attachment order across the whole signature; unique and strictly
    /// increasing independent of list membership.
    pub idx: u32,
    pub ctx: MatchCtx,
}

/// Per-signature arena of match instances.
#[derive(Debug, Default)]
pub struct MatchStore {
    pool: Vec<SigMatch>,
    next_idx: u32,
}

impl MatchStore {
    fn alloc(&mut self, kw: Kw, ctx: MatchCtx) -> SmHandle {
        let idx = self.next_idx;
        self.next_idx += 1;
        self.pool.push(SigMatch { kw, idx, ctx });
        self.pool.len() - 1
    }

    pub fn get(&self, h: SmHandle) -> &SigMatch {
        &self.pool[h]
    }

    pub fn get_mut(&mut self, h: SmHandle) -> &mut SigMatch {
        &mut self.pool[h]
    }

    /// Move the instance out into a compiled array entry. The store keeps
    /// an empty slot so handles stay stable.
    pub fn take_as_data(&mut self, h: SmHandle) -> SigMatchData {
        let sm = &mut self.pool[h];
        SigMatchData { kw: sm.kw, idx: sm.idx, ctx: std::mem::take(&mut sm.ctx) }
    }
}

impl Signature {
    /// Attach a match instance to `list`: a classical slot when
    /// `list < LIST_MAX`, otherwise the sticky buffer for that id, reusing
    /// or opening buffers as needed.
    pub fn append_match(&mut self, kw: Kw, ctx: MatchCtx, list: u32) -> Result<SmHandle, String> {
        let init = self.init.as_mut().expect("signature is still being built");

        if kw == Kw::Content {
            init.max_content_list_id = init.max_content_list_id.max(list);
        }

        let h = init.store.alloc(kw, ctx);

        if list < LIST_MAX {
            init.smlists[list as usize].push(h);
            return Ok(h);
        }

        // a change of sticky target resets the active-list marker
        if init.list.is_some() && init.list != Some(list) {
            init.list = None;
        }

        if let Some(cb) = init.curbuf {
            if init.buffers[cb].id != list {
                for (x, b) in init.buffers.iter().enumerate() {
                    if b.id == list && !b.multi_capable {
                        init.curbuf = Some(x);
                        break;
                    }
                }
            }
        }

        let need_new = match init.curbuf {
            Some(cb) => init.buffers[cb].id != list,
            None => true,
        };
        if need_new {
            let force_tc = init.init_flags & SIG_INIT_FORCE_TOCLIENT != 0;
            let force_ts = init.init_flags & SIG_INIT_FORCE_TOSERVER != 0;
            let buf = InitBuffer {
                id: list,
                sm_init: true,
                only_tc: force_tc,
                only_ts: force_ts,
                ..Default::default()
            };
            push_buffer(&mut init.buffers, buf)?;
            init.curbuf = Some(init.buffers.len() - 1);
        }

        let cb = init.curbuf.expect("current buffer was just ensured");
        init.buffers[cb].sms.push(h);
        Ok(h)
    }

    /// Open the sticky buffer `list` for subsequent payload keywords. When a
    /// match append already opened a buffer for the same id, adopt it.
    pub fn set_active_list(&mut self, list: u32, multi_capable: bool) -> Result<(), String> {
        let init = self.init.as_mut().expect("signature is still being built");

        if let Some(cb) = init.curbuf {
            if init.buffers[cb].id == list && init.buffers[cb].sm_init {
                init.buffers[cb].sm_init = false;
                init.list = Some(list);
                return Ok(());
            }
        }

        if !multi_capable {
            if let Some(x) = init.buffers.iter().position(|b| b.id == list) {
                init.curbuf = Some(x);
                init.list = Some(list);
                return Ok(());
            }
        }

        let force_tc = init.init_flags & SIG_INIT_FORCE_TOCLIENT != 0;
        let force_ts = init.init_flags & SIG_INIT_FORCE_TOSERVER != 0;
        let buf = InitBuffer {
            id: list,
            only_tc: force_tc,
            only_ts: force_ts,
            multi_capable,
            ..Default::default()
        };
        push_buffer(&mut init.buffers, buf)?;
        init.curbuf = Some(init.buffers.len() - 1);
        init.list = Some(list);
        Ok(())
    }

    /// Latest instance (by attachment index) of any of the given keyword
    /// types, restricted to the active sticky list when one is set.
    pub fn last_match_of(&self, kinds: &[Kw]) -> Option<SmHandle> {
        let init = self.init_data();
        let mut best: Option<SmHandle> = None;

        for b in &init.buffers {
            if let Some(active) = init.list {
                if active != b.id {
                    continue;
                }
            }
            for &h in &b.sms {
                consider(&mut best, init, h, kinds);
            }
        }

        for (list, sms) in init.smlists.iter().enumerate() {
            if let Some(active) = init.list {
                if active != list as u32 {
                    continue;
                }
            }
            for &h in sms {
                consider(&mut best, init, h, kinds);
            }
        }

        best
    }

    /// Latest instance of the given keyword types in one list, classical or
    /// sticky.
    pub fn last_match_in_list(&self, list: u32, kinds: &[Kw]) -> Option<SmHandle> {
        let init = self.init_data();
        let mut best: Option<SmHandle> = None;
        if list < LIST_MAX {
            for &h in &init.smlists[list as usize] {
                consider(&mut best, init, h, kinds);
            }
        } else {
            for b in init.buffers.iter().filter(|b| b.id == list) {
                for &h in &b.sms {
                    consider(&mut best, init, h, kinds);
                }
            }
        }
        best
    }

    /// Latest instance in the whole signature.
    pub fn last_match(&self) -> Option<SmHandle> {
        let init = self.init_data();
        let mut best: Option<SmHandle> = None;
        for b in &init.buffers {
            for &h in &b.sms {
                if best.is_none()
                    || init.store.get(h).idx > init.store.get(best.expect("set")).idx
                {
                    best = Some(h);
                }
            }
        }
        for sms in init.smlists.iter() {
            for &h in sms {
                if best.is_none()
                    || init.store.get(h).idx > init.store.get(best.expect("set")).idx
                {
                    best = Some(h);
                }
            }
        }
        best
    }

    /// The list a match instance currently belongs to.
    pub fn list_of_match(&self, h: SmHandle) -> Option<u32> {
        let init = self.init_data();
        for b in &init.buffers {
            if b.sms.contains(&h) {
                return Some(b.id);
            }
        }
        for (list, sms) in init.smlists.iter().enumerate() {
            if sms.contains(&h) {
                return Some(list as u32);
            }
        }
        None
    }

    /// Latest content instance across the lists that can feed the
    /// multi-pattern matcher: the payload list and every MPM-capable
    /// sticky buffer.
    pub fn last_mpm_content(
        &self,
        buffers: &crate::buffers::BufferRegistry,
    ) -> Option<SmHandle> {
        let init = self.init_data();
        let mut best: Option<SmHandle> = None;
        for b in &init.buffers {
            if !buffers.supports_mpm(b.id) {
                continue;
            }
            for &h in &b.sms {
                consider(&mut best, init, h, &[Kw::Content]);
            }
        }
        for &h in &init.smlists[crate::signature::LIST_PMATCH as usize] {
            consider(&mut best, init, h, &[Kw::Content]);
        }
        best
    }

    /// Latest instance of the given keyword types that precedes `before` in
    /// the list both share.
    pub fn last_match_before(&self, before: SmHandle, kinds: &[Kw]) -> Option<SmHandle> {
        let list = self.list_of_match(before)?;
        let init = self.init_data();
        let limit = init.store.get(before).idx;
        let mut best: Option<SmHandle> = None;
        let mut scan = |h: SmHandle| {
            let sm = init.store.get(h);
            if sm.idx >= limit || !kinds.contains(&sm.kw) {
                return;
            }
            match best {
                Some(b) if init.store.get(b).idx >= sm.idx => {}
                _ => best = Some(h),
            }
        };
        if list < LIST_MAX {
            for &h in &init.smlists[list as usize] {
                scan(h);
            }
        } else {
            for b in init.buffers.iter().filter(|b| b.id == list) {
                for &h in &b.sms {
                    scan(h);
                }
            }
        }
        best
    }

    /// Select or open the buffer a content modifier moves its pattern into.
    /// Unlike sticky-keyword selection this reuses any buffer with the
    /// right id, but refuses to abandon an open buffer that has no matches
    /// yet.
    pub fn select_modifier_buffer(&mut self, list: u32) -> Result<(), String> {
        let init = self.init.as_mut().expect("signature is still being built");
        if let Some(cb) = init.curbuf {
            if init.buffers[cb].id == list {
                return Ok(());
            }
            if init.buffers[cb].sms.is_empty() {
                return Err("no matches for previous buffer".to_string());
            }
        }
        if let Some(x) = init.buffers.iter().position(|b| b.id == list) {
            init.curbuf = Some(x);
            return Ok(());
        }
        push_buffer(&mut init.buffers, InitBuffer { id: list, ..Default::default() })?;
        init.curbuf = Some(init.buffers.len() - 1);
        Ok(())
    }

    /// Move one instance from a classical list into the current buffer,
    /// preserving its attachment index.
    pub fn transfer_match_to_curbuf(&mut self, h: SmHandle, from: u32) -> Result<(), String> {
        let init = self.init.as_mut().expect("signature is still being built");
        let cb = init
            .curbuf
            .ok_or_else(|| "no open buffer to transfer into".to_string())?;
        let src = &mut init.smlists[from as usize];
        let pos = src
            .iter()
            .position(|x| *x == h)
            .ok_or_else(|| "match instance is not in the source list".to_string())?;
        src.remove(pos);
        init.buffers[cb].sms.push(h);
        Ok(())
    }

    /// Remove an instance from a classical list. The store slot stays
    /// behind and is dropped with the build state.
    pub fn remove_match(&mut self, h: SmHandle, list: u32) {
        let init = self.init.as_mut().expect("signature is still being built");
        init.smlists[list as usize].retain(|x| *x != h);
    }
}

fn consider(
    best: &mut Option<SmHandle>,
    init: &crate::signature::SignatureInitData,
    h: SmHandle,
    kinds: &[Kw],
) {
    let sm = init.store.get(h);
    if !kinds.contains(&sm.kw) {
        return;
    }
    match best {
        Some(b) if init.store.get(*b).idx >= sm.idx => {}
        _ => *best = Some(h),
    }
}

fn push_buffer(buffers: &mut Vec<InitBuffer>, buf: InitBuffer) -> Result<(), String> {
    if buffers.len() >= BUFFERS_CAP {
        return Err("failed to expand rule buffer array".to_string());
    }
    if buffers.len() == buffers.capacity() {
        buffers.reserve(BUFFERS_CHUNK);
    }
    buffers.push(buf);
    Ok(())
}
