//! The `flow` keyword: flow state and direction requirements.

use crate::keyword::{Kw, SetupCtx, SetupError, SetupResult};
use crate::signature::{
    Signature, LIST_MATCH, SIG_FLAG_REQUIRE_PACKET, SIG_FLAG_REQUIRE_STREAM, SIG_FLAG_TOCLIENT,
    SIG_FLAG_TOSERVER,
};
use crate::sigmatch::MatchCtx;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FlowData {
    pub established: bool,
    pub not_established: bool,
    pub stateless: bool,
    pub only_stream: bool,
    pub no_stream: bool,
    pub only_frag: bool,
    pub no_frag: bool,
}

impl FlowData {
    fn has_match_state(&self) -> bool {
        *self != FlowData::default()
    }
}

pub fn setup_flow(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");

    let mut data = FlowData::default();
    let mut dir: u32 = 0;

    for term in value.split(',') {
        match term.trim().to_ascii_lowercase().as_str() {
            "to_server" | "from_client" => dir |= SIG_FLAG_TOSERVER,
            "to_client" | "from_server" => dir |= SIG_FLAG_TOCLIENT,
            "established" => data.established = true,
            "not_established" => data.not_established = true,
            "stateless" => data.stateless = true,
            "only_stream" => data.only_stream = true,
            "no_stream" => data.no_stream = true,
            "only_frag" => data.only_frag = true,
            "no_frag" => data.no_frag = true,
            other => {
                return Err(SetupError::Parse(format!("invalid flow option \"{other}\"")));
            }
        }
    }

    if dir == (SIG_FLAG_TOSERVER | SIG_FLAG_TOCLIENT) {
        return Err(SetupError::parse("flow cannot set both directions"));
    }
    if data.established && data.not_established {
        return Err(SetupError::parse(
            "flow cannot be both established and not_established",
        ));
    }
    if data.established && data.stateless {
        return Err(SetupError::parse("flow cannot be both established and stateless"));
    }
    if data.only_stream && data.no_stream {
        return Err(SetupError::parse("flow cannot use only_stream with no_stream"));
    }
    if data.only_frag && data.no_frag {
        return Err(SetupError::parse("flow cannot use only_frag with no_frag"));
    }

    if dir & SIG_FLAG_TOSERVER != 0 && ctx.sig.flags & SIG_FLAG_TOCLIENT != 0
        || dir & SIG_FLAG_TOCLIENT != 0 && ctx.sig.flags & SIG_FLAG_TOSERVER != 0
    {
        return Err(SetupError::parse("flow direction contradicts the rule direction"));
    }
    ctx.sig.flags |= dir;

    if data.only_stream {
        ctx.sig.flags |= SIG_FLAG_REQUIRE_STREAM;
    }
    if data.no_stream {
        ctx.sig.flags |= SIG_FLAG_REQUIRE_PACKET;
    }

    // a pure direction constraint needs no match instance
    if data.has_match_state() {
        ctx.sig
            .append_match(Kw::Flow, MatchCtx::Flow(data), LIST_MATCH)
            .map_err(SetupError::Parse)?;
    }
    Ok(())
}

/// Apply a direction inferred from buffer accounting, the same way an
/// explicit `flow` direction would be. The default both-directions state
/// narrows down to the inferred one; an explicit opposite direction is a
/// conflict.
pub fn setup_implicit(sig: &mut Signature, dir: u32) -> Result<(), String> {
    debug_assert!(dir == SIG_FLAG_TOSERVER || dir == SIG_FLAG_TOCLIENT);
    let both = SIG_FLAG_TOSERVER | SIG_FLAG_TOCLIENT;
    let opposite = both & !dir;
    if sig.flags & both == both {
        sig.flags &= !opposite;
    } else if sig.flags & opposite != 0 {
        return Err("rule direction conflicts with keyword directions".to_string());
    }
    sig.flags |= dir;
    Ok(())
}
