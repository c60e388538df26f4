//! HTTP buffer keywords: the `http.uri` sticky buffer and its legacy
//! content-modifier form `http_uri`.

use crate::buffers::BUFFER_HTTP_URI;
use crate::keyword::{Kw, SetupCtx, SetupError, SetupResult};
use crate::proto::AppProto;

pub fn setup_http_uri(ctx: &mut SetupCtx<'_>, _value: Option<&str>) -> SetupResult {
    let list = ctx
        .tables
        .buffers
        .id_by_name(BUFFER_HTTP_URI)
        .expect("built-in buffer is registered");
    ctx.sig
        .set_app_proto(AppProto::Http1)
        .map_err(SetupError::Parse)?;
    let multi = ctx.tables.buffers.is_multi_instance(list);
    ctx.sig.set_active_list(list, multi).map_err(SetupError::Parse)?;
    Ok(())
}

pub fn setup_http_uri_modifier(ctx: &mut SetupCtx<'_>, _value: Option<&str>) -> SetupResult {
    let list = ctx
        .tables
        .buffers
        .id_by_name(BUFFER_HTTP_URI)
        .expect("built-in buffer is registered");
    content_modifier_buffer_setup(ctx, "http_uri", list, AppProto::Http1)
}

/// Move the most recent payload content into an app-layer buffer list. This
/// is the shared implementation behind the legacy `http_*` modifier
/// keywords.
pub fn content_modifier_buffer_setup(
    ctx: &mut SetupCtx<'_>,
    keyword: &str,
    list: u32,
    alproto: AppProto,
) -> SetupResult {
    if ctx.sig.init_data().list.is_some() {
        return Err(SetupError::Parse(format!(
            "\"{keyword}\" keyword seen with a sticky buffer still set"
        )));
    }
    if ctx.sig.alproto.is_valid() && ctx.sig.alproto != alproto {
        return Err(SetupError::parse("rule contains conflicting app protocols"));
    }

    let sm = ctx
        .sig
        .last_match_in_list(crate::signature::LIST_PMATCH, &[Kw::Content])
        .ok_or_else(|| {
            SetupError::Parse(format!(
                "\"{keyword}\" found without a content context; use a \"content\" keyword first"
            ))
        })?;

    {
        let cd = ctx
            .sig
            .init_data()
            .store
            .get(sm)
            .ctx
            .as_content()
            .expect("payload list content has content data");
        if cd.rawbytes {
            return Err(SetupError::Parse(format!(
                "\"{keyword}\" cannot be used with the rawbytes keyword"
            )));
        }
    }

    // a relative pattern no longer anchors to the payload list once moved
    let is_relative = ctx
        .sig
        .init_data()
        .store
        .get(sm)
        .ctx
        .as_content()
        .map(|cd| cd.is_relative())
        .unwrap_or(false);
    if is_relative {
        if let Some(prev) = ctx.sig.last_match_before(sm, &[Kw::Content]) {
            if let Some(cd) = ctx.sig.init_data_mut().store.get_mut(prev).ctx.as_content_mut() {
                cd.relative_next = false;
            }
        }
        let anchor = {
            let init = ctx.sig.init_data();
            init.curbuf
                .filter(|cb| init.buffers[*cb].id == list)
                .and_then(|cb| init.buffers[cb].sms.last().copied())
        };
        if let Some(prev) = anchor {
            if let Some(cd) = ctx.sig.init_data_mut().store.get_mut(prev).ctx.as_content_mut() {
                cd.relative_next = true;
            }
        }
    }

    ctx.sig.set_app_proto(alproto).map_err(SetupError::Parse)?;
    ctx.sig.select_modifier_buffer(list).map_err(SetupError::Parse)?;
    ctx.sig
        .transfer_match_to_curbuf(sm, crate::signature::LIST_PMATCH)
        .map_err(SetupError::Parse)?;

    let init = ctx.sig.init_data_mut();
    init.max_content_list_id = init.max_content_list_id.max(list);
    Ok(())
}
