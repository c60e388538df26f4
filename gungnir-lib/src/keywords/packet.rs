//! Packet-level match keywords: `dsize` and `stream_size`.

use crate::keyword::{Kw, SetupCtx, SetupError, SetupResult};
use crate::proto::Direction;
use crate::signature::{Signature, LIST_MATCH, SIG_FLAG_REQUIRE_PACKET};
use crate::sigmatch::MatchCtx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsizeMode {
    Exact,
    Not,
    LessThan,
    GreaterThan,
    Range,
}

/// Payload size check against the raw packet.
#[derive(Debug)]
pub struct DsizeData {
    pub mode: DsizeMode,
    pub lo: u16,
    pub hi: u16,
}

fn parse_dsize(value: &str) -> Result<DsizeData, String> {
    let v = value.trim();
    let err = || format!("invalid dsize value \"{value}\"");

    if let Some((lo, hi)) = v.split_once("<>") {
        let lo: u16 = lo.trim().parse().map_err(|_| err())?;
        let hi: u16 = hi.trim().parse().map_err(|_| err())?;
        if lo >= hi {
            return Err(format!("empty dsize range \"{value}\""));
        }
        return Ok(DsizeData { mode: DsizeMode::Range, lo, hi });
    }
    if let Some(rest) = v.strip_prefix('<') {
        let n: u16 = rest.trim().parse().map_err(|_| err())?;
        return Ok(DsizeData { mode: DsizeMode::LessThan, lo: n, hi: 0 });
    }
    if let Some(rest) = v.strip_prefix('>') {
        let n: u16 = rest.trim().parse().map_err(|_| err())?;
        return Ok(DsizeData { mode: DsizeMode::GreaterThan, lo: n, hi: 0 });
    }
    if let Some(rest) = v.strip_prefix('!') {
        let n: u16 = rest.trim().parse().map_err(|_| err())?;
        return Ok(DsizeData { mode: DsizeMode::Not, lo: n, hi: 0 });
    }
    let n: u16 = v.parse().map_err(|_| err())?;
    Ok(DsizeData { mode: DsizeMode::Exact, lo: n, hi: 0 })
}

pub fn setup_dsize(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    let data = parse_dsize(value).map_err(SetupError::Parse)?;
    ctx.sig
        .append_match(Kw::Dsize, MatchCtx::Dsize(data), LIST_MATCH)
        .map_err(SetupError::Parse)?;
    ctx.sig.flags |= SIG_FLAG_REQUIRE_PACKET;
    Ok(())
}

/// Whether a rule can use its dsize check as a prefilter: only when the
/// packet is all there is to look at.
pub fn dsize_supports_prefilter(sig: &Signature) -> bool {
    sig.flags & SIG_FLAG_REQUIRE_PACKET != 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSizeOp {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
}

/// Stream byte-count check, `stream_size: <dir>,<op>,<bytes>`.
#[derive(Debug)]
pub struct StreamSizeData {
    pub dir: Option<Direction>,
    pub op: StreamSizeOp,
    pub bytes: u64,
}

fn parse_stream_size(value: &str) -> Result<StreamSizeData, String> {
    let err = || format!("invalid stream_size value \"{value}\"");
    let mut parts = value.split(',').map(str::trim);

    let dir = match parts.next().ok_or_else(err)? {
        "server" => Some(Direction::ToServer),
        "client" => Some(Direction::ToClient),
        "both" | "either" => None,
        _ => return Err(err()),
    };
    let op = match parts.next().ok_or_else(err)? {
        "=" => StreamSizeOp::Equal,
        "!=" => StreamSizeOp::NotEqual,
        "<" => StreamSizeOp::LessThan,
        ">" => StreamSizeOp::GreaterThan,
        _ => return Err(err()),
    };
    let bytes: u64 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    if parts.next().is_some() {
        return Err(err());
    }
    Ok(StreamSizeData { dir, op, bytes })
}

pub fn setup_stream_size(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    let data = parse_stream_size(value).map_err(SetupError::Parse)?;
    ctx.sig
        .append_match(Kw::StreamSize, MatchCtx::StreamSize(data), LIST_MATCH)
        .map_err(SetupError::Parse)?;
    Ok(())
}
