//! File inspection buffers: `file.data` and `file.name`.

use crate::buffers::{BUFFER_FILE_DATA, BUFFER_FILE_NAME};
use crate::keyword::{SetupCtx, SetupError, SetupResult};
use crate::signature::{FILE_NEED_FILENAME, SIG_INIT_FILEDATA};

pub fn setup_file_data(ctx: &mut SetupCtx<'_>, _value: Option<&str>) -> SetupResult {
    if ctx.sig.alproto.is_valid() && !ctx.sig.alproto.supports_files() {
        return Err(SetupError::Parse(format!(
            "protocol {} does not support file matching",
            ctx.sig.alproto.name()
        )));
    }

    let list = ctx
        .tables
        .buffers
        .id_by_name(BUFFER_FILE_DATA)
        .expect("built-in buffer is registered");
    let multi = ctx.tables.buffers.is_multi_instance(list);
    ctx.sig.set_active_list(list, multi).map_err(SetupError::Parse)?;
    ctx.sig.init_data_mut().init_flags |= SIG_INIT_FILEDATA;
    Ok(())
}

pub fn setup_file_name(ctx: &mut SetupCtx<'_>, _value: Option<&str>) -> SetupResult {
    if ctx.sig.alproto.is_valid() && !ctx.sig.alproto.supports_files() {
        return Err(SetupError::Parse(format!(
            "protocol {} does not support file matching",
            ctx.sig.alproto.name()
        )));
    }

    let list = ctx
        .tables
        .buffers
        .id_by_name(BUFFER_FILE_NAME)
        .expect("built-in buffer is registered");
    let multi = ctx.tables.buffers.is_multi_instance(list);
    ctx.sig.set_active_list(list, multi).map_err(SetupError::Parse)?;
    ctx.sig.file_flags |= FILE_NEED_FILENAME;
    Ok(())
}
