//! The `content` keyword and its modifiers.

use crate::keyword::{Kw, SetupCtx, SetupError, SetupResult};
use crate::signature::{Signature, LIST_PMATCH};
use crate::sigmatch::{MatchCtx, SmHandle};

/// A parsed content pattern with its modifier state.
#[derive(Debug, Default)]
pub struct ContentData {
    pub pattern: Vec<u8>,
    pub nocase: bool,
    pub negated: bool,
    pub rawbytes: bool,
    pub fast_pattern: bool,
    pub offset: Option<u16>,
    pub depth: Option<u16>,
    pub distance: Option<i32>,
    pub within: Option<i32>,
    /// The next match in the list is anchored relative to this one.
    pub relative_next: bool,
}

impl ContentData {
    pub fn is_relative(&self) -> bool {
        self.distance.is_some() || self.within.is_some()
    }
}

/// Decode a content pattern: literal bytes with `|41 42|` hex runs and
/// backslash escapes for `" ; : \ |`.
pub fn parse_pattern(value: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    let mut in_hex = false;
    let mut hex = String::new();

    while let Some(c) = chars.next() {
        if in_hex {
            match c {
                '|' => {
                    let digits: String = hex.split_whitespace().collect();
                    if digits.len() % 2 != 0 {
                        return Err(format!("odd number of hex digits in \"{value}\""));
                    }
                    for pair in digits.as_bytes().chunks(2) {
                        let s = std::str::from_utf8(pair).expect("hex digits are ascii");
                        let byte = u8::from_str_radix(s, 16)
                            .map_err(|_| format!("invalid hex content \"{value}\""))?;
                        out.push(byte);
                    }
                    hex.clear();
                    in_hex = false;
                }
                c if c.is_ascii_hexdigit() || c.is_ascii_whitespace() => hex.push(c),
                _ => return Err(format!("invalid hex content \"{value}\"")),
            }
            continue;
        }
        match c {
            '|' => in_hex = true,
            '\\' => match chars.next() {
                Some(e @ ('"' | ';' | ':' | '\\' | '|')) => out.push(e as u8),
                Some(other) => {
                    return Err(format!("invalid escape \"\\{other}\" in content"));
                }
                None => return Err("content ends with a dangling backslash".into()),
            },
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    if in_hex {
        return Err(format!("unbalanced \"|\" in content \"{value}\""));
    }
    if out.is_empty() {
        return Err("empty content pattern".into());
    }
    Ok(out)
}

pub fn setup_content(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("content value presence is enforced by the option parser");
    let pattern = parse_pattern(value).map_err(SetupError::Parse)?;

    let cd = ContentData {
        pattern,
        negated: ctx.sig.init_data().negated,
        ..Default::default()
    };
    let list = ctx.sig.init_data().list.unwrap_or(LIST_PMATCH);
    ctx.sig
        .append_match(Kw::Content, MatchCtx::Content(cd), list)
        .map_err(SetupError::Parse)?;
    Ok(())
}

fn last_content(ctx: &SetupCtx<'_>, keyword: &str) -> Result<SmHandle, SetupError> {
    ctx.sig.last_match_of(&[Kw::Content]).ok_or_else(|| {
        SetupError::Parse(format!(
            "\"{keyword}\" needs a preceding content option"
        ))
    })
}

fn content_data_mut<'a>(sig: &'a mut Signature, h: SmHandle) -> &'a mut ContentData {
    sig.init_data_mut()
        .store
        .get_mut(h)
        .ctx
        .as_content_mut()
        .expect("handle points at a content match")
}

pub fn setup_nocase(ctx: &mut SetupCtx<'_>, _value: Option<&str>) -> SetupResult {
    let h = last_content(ctx, "nocase")?;
    content_data_mut(ctx.sig, h).nocase = true;
    Ok(())
}

pub fn setup_offset(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    let offset: u16 = value
        .trim()
        .parse()
        .map_err(|_| SetupError::Parse(format!("invalid offset value \"{value}\"")))?;
    let h = last_content(ctx, "offset")?;
    content_data_mut(ctx.sig, h).offset = Some(offset);
    Ok(())
}

pub fn setup_depth(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    let depth: u16 = value
        .trim()
        .parse()
        .map_err(|_| SetupError::Parse(format!("invalid depth value \"{value}\"")))?;
    let h = last_content(ctx, "depth")?;
    let cd = content_data_mut(ctx.sig, h);
    if (depth as usize) < cd.pattern.len() {
        return Err(SetupError::Parse(format!(
            "depth {depth} is smaller than the content length {}",
            cd.pattern.len()
        )));
    }
    cd.depth = Some(depth);
    Ok(())
}

fn setup_relative(
    ctx: &mut SetupCtx<'_>,
    keyword: &str,
    value: &str,
    within: bool,
) -> SetupResult {
    let v: i32 = value
        .trim()
        .parse()
        .map_err(|_| SetupError::Parse(format!("invalid {keyword} value \"{value}\"")))?;
    let h = last_content(ctx, keyword)?;
    if within {
        let cd = content_data_mut(ctx.sig, h);
        if v >= 0 && (v as usize) < cd.pattern.len() {
            return Err(SetupError::Parse(format!(
                "within {v} is smaller than the content length {}",
                cd.pattern.len()
            )));
        }
        cd.within = Some(v);
    } else {
        content_data_mut(ctx.sig, h).distance = Some(v);
    }
    // anchor the previous match in the same list
    if let Some(prev) = ctx.sig.last_match_before(h, &[Kw::Content]) {
        content_data_mut(ctx.sig, prev).relative_next = true;
    }
    Ok(())
}

pub fn setup_distance(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    setup_relative(ctx, "distance", value, false)
}

pub fn setup_within(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    setup_relative(ctx, "within", value, true)
}

pub fn setup_rawbytes(ctx: &mut SetupCtx<'_>, _value: Option<&str>) -> SetupResult {
    let h = last_content(ctx, "rawbytes")?;
    match ctx.sig.list_of_match(h) {
        Some(LIST_PMATCH) => {}
        Some(list) => {
            let name = ctx
                .tables
                .buffers
                .name_by_id(list)
                .unwrap_or("buffer")
                .to_string();
            return Err(SetupError::Parse(format!(
                "rawbytes cannot be used on content inspecting the {name} buffer"
            )));
        }
        None => return Err(SetupError::parse("rawbytes needs a preceding content option")),
    }
    content_data_mut(ctx.sig, h).rawbytes = true;
    Ok(())
}

pub fn setup_fast_pattern(ctx: &mut SetupCtx<'_>, _value: Option<&str>) -> SetupResult {
    let h = ctx.sig.last_mpm_content(&ctx.tables.buffers).ok_or_else(|| {
        SetupError::parse("fast_pattern needs a preceding content option")
    })?;
    content_data_mut(ctx.sig, h).fast_pattern = true;
    Ok(())
}

/// Mark the latest match instance as the rule's explicit prefilter.
pub fn setup_prefilter_marker(ctx: &mut SetupCtx<'_>, _value: Option<&str>) -> SetupResult {
    let h = ctx
        .sig
        .last_match()
        .ok_or_else(|| SetupError::parse("prefilter needs a preceding keyword to promote"))?;
    ctx.sig.init_data_mut().prefilter_sm = Some(h);
    Ok(())
}
