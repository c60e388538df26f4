//! Rule metadata keywords: identity, message, classification and
//! references. None of these attach match instances.

use tracing::warn;

use crate::keyword::{SetupCtx, SetupError, SetupResult};
use crate::signature::{Metadata, Reference, SIG_INIT_PRIO_EXPLICIT};

fn parse_u32(keyword: &str, value: &str) -> Result<u32, SetupError> {
    value.trim().parse::<u32>().map_err(|_| {
        SetupError::Parse(format!(
            "invalid {keyword} value \"{value}\": must fit an unsigned 32-bit integer"
        ))
    })
}

pub fn setup_sid(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    let sid = parse_u32("sid", value)?;
    if sid == 0 {
        return Err(SetupError::parse("sid 0 is not allowed"));
    }
    ctx.sig.id = sid;
    Ok(())
}

pub fn setup_gid(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    ctx.sig.gid = parse_u32("gid", value)?;
    Ok(())
}

pub fn setup_rev(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    ctx.sig.rev = parse_u32("rev", value)?;
    Ok(())
}

pub fn setup_msg(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    ctx.sig.msg = Some(value.to_string());
    Ok(())
}

pub fn setup_priority(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    let prio: u8 = value.trim().parse().map_err(|_| {
        SetupError::Parse(format!("invalid priority value \"{value}\": must be 0-255"))
    })?;
    ctx.sig.prio = i32::from(prio);
    ctx.sig.init_data_mut().init_flags |= SIG_INIT_PRIO_EXPLICIT;
    Ok(())
}

pub fn setup_classtype(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser").trim();
    match ctx.tables.classifications.get(value) {
        Some(class) => {
            if ctx.sig.init_data().init_flags & SIG_INIT_PRIO_EXPLICIT == 0 {
                ctx.sig.prio = class.priority;
            }
        }
        None => {
            if ctx.strict {
                return Err(SetupError::Parse(format!("unknown classtype \"{value}\"")));
            }
            warn!(classtype = %value, "unknown classtype, using the default priority");
        }
    }
    Ok(())
}

pub fn setup_metadata(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");

    let mut entries = Vec::new();
    for item in value.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        match item.split_once(char::is_whitespace) {
            Some((k, v)) => entries.push((k.trim().to_string(), v.trim().to_string())),
            None => {
                return Err(SetupError::Parse(format!(
                    "metadata entry \"{item}\" is missing a value"
                )))
            }
        }
    }
    if entries.is_empty() {
        return Err(SetupError::parse("empty metadata"));
    }

    let md = ctx.sig.metadata.get_or_insert_with(Metadata::default);
    md.entries.extend(entries);

    let mut map = serde_json::Map::new();
    for (k, v) in &md.entries {
        map.entry(k.clone())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()))
            .as_array_mut()
            .expect("entries are inserted as arrays")
            .push(serde_json::Value::String(v.clone()));
    }
    md.json = serde_json::Value::Object(map).to_string();
    Ok(())
}

pub fn setup_reference(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    let (scheme, id) = value.split_once(',').ok_or_else(|| {
        SetupError::Parse(format!("invalid reference \"{value}\": expected scheme,id"))
    })?;
    let scheme = scheme.trim();
    let id = id.trim();
    if scheme.is_empty() || id.is_empty() {
        return Err(SetupError::Parse(format!("invalid reference \"{value}\"")));
    }
    ctx.sig.references.push(Reference { scheme: scheme.to_string(), id: id.to_string() });
    Ok(())
}
