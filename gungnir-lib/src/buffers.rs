//! Buffer-type registry and the app-inspection engine table.
//!
//! Sticky buffers are dynamically registered: each name gets a dense list
//! id starting right after the classical slots. The inspection-engine table
//! records, per buffer, which app protocol and direction can feed it and at
//! what transaction progress; the validator uses it for direction
//! accounting and hook/progress checks.

use ahash::AHashMap;

use crate::proto::{AppProto, Direction};
use crate::signature::LIST_MAX;

pub const BUFFER_HTTP_URI: &str = "http.uri";
pub const BUFFER_FILE_DATA: &str = "file.data";
pub const BUFFER_FILE_NAME: &str = "file.name";

/// One registered sticky-buffer type.
#[derive(Debug)]
pub struct BufferType {
    pub id: u32,
    pub name: String,
    /// Inspects raw packet data rather than app-layer state.
    pub packet: bool,
    /// Inspects protocol frames.
    pub frame: bool,
    /// Patterns in this buffer can feed the multi-pattern matcher.
    pub mpm: bool,
    /// Several independent instances of this buffer may exist per rule.
    pub multi_instance: bool,
}

#[derive(Debug, Default)]
pub struct BufferRegistry {
    types: Vec<BufferType>,
    by_name: AHashMap<String, u32>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer type, returning its stable id. Re-registering a
    /// name returns the existing id.
    pub fn register(
        &mut self,
        name: &str,
        packet: bool,
        frame: bool,
        mpm: bool,
        multi_instance: bool,
    ) -> u32 {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = LIST_MAX + self.types.len() as u32;
        self.types.push(BufferType {
            id,
            name: name.to_string(),
            packet,
            frame,
            mpm,
            multi_instance,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn id_by_name(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: u32) -> Option<&BufferType> {
        id.checked_sub(LIST_MAX)
            .and_then(|i| self.types.get(i as usize))
    }

    pub fn name_by_id(&self, id: u32) -> Option<&str> {
        self.get(id).map(|b| b.name.as_str())
    }

    pub fn is_multi_instance(&self, id: u32) -> bool {
        self.get(id).map(|b| b.multi_instance).unwrap_or(false)
    }

    pub fn supports_mpm(&self, id: u32) -> bool {
        self.get(id).map(|b| b.mpm).unwrap_or(false)
    }
}

/// One app-layer inspection engine: a buffer fed by one protocol in one
/// direction at a given transaction progress.
#[derive(Debug)]
pub struct InspectEngine {
    pub alproto: AppProto,
    pub dir: Direction,
    pub progress: u8,
    pub sm_list: u32,
}

/// Register the built-in buffer types and their inspection engines.
pub fn register_builtin(registry: &mut BufferRegistry, engines: &mut Vec<InspectEngine>) {
    let http_uri = registry.register(BUFFER_HTTP_URI, false, false, true, false);
    engines.push(InspectEngine {
        alproto: AppProto::Http1,
        dir: Direction::ToServer,
        progress: 1,
        sm_list: http_uri,
    });

    let file_data = registry.register(BUFFER_FILE_DATA, false, false, true, false);
    for (alproto, dir, progress) in [
        (AppProto::Http1, Direction::ToServer, 3),
        (AppProto::Http1, Direction::ToClient, 3),
        (AppProto::Smtp, Direction::ToServer, 2),
    ] {
        engines.push(InspectEngine { alproto, dir, progress, sm_list: file_data });
    }

    let file_name = registry.register(BUFFER_FILE_NAME, false, false, true, true);
    for (alproto, dir, progress) in [
        (AppProto::Http1, Direction::ToServer, 2),
        (AppProto::Http1, Direction::ToClient, 2),
        (AppProto::Http2, Direction::ToServer, 1),
        (AppProto::Smtp, Direction::ToServer, 2),
        (AppProto::Smb, Direction::ToServer, 1),
        (AppProto::Smb, Direction::ToClient, 1),
    ] {
        engines.push(InspectEngine { alproto, dir, progress, sm_list: file_name });
    }
}

/// Register every app hook as a generic inspection list, named
/// `<proto>:<hook>:generic`, so rules can attach to protocol progress
/// points without a dedicated buffer keyword.
pub fn register_app_hook_lists(registry: &mut BufferRegistry, engines: &mut Vec<InspectEngine>) {
    for alproto in AppProto::all() {
        let name = alproto.name();

        let mut add = |hook: &str, dir: Direction, progress: u8| {
            let list = registry.register(&format!("{name}:{hook}:generic"), false, false, false, false);
            engines.push(InspectEngine { alproto, dir, progress, sm_list: list });
        };

        add("request_started", Direction::ToServer, 0);
        add("response_started", Direction::ToClient, 0);
        add(
            "request_complete",
            Direction::ToServer,
            alproto.completion_progress(Direction::ToServer),
        );
        add(
            "response_complete",
            Direction::ToClient,
            alproto.completion_progress(Direction::ToClient),
        );

        for (state, progress) in alproto.states(Direction::ToServer) {
            add(state, Direction::ToServer, *progress);
        }
        for (state, progress) in alproto.states(Direction::ToClient) {
            add(state, Direction::ToClient, *progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_start_after_classical_lists() {
        let mut reg = BufferRegistry::new();
        let a = reg.register("a", false, false, true, false);
        let b = reg.register("b", false, false, false, false);
        assert_eq!(a, LIST_MAX);
        assert_eq!(b, LIST_MAX + 1);
        assert_eq!(reg.register("a", false, false, true, false), a);
        assert_eq!(reg.name_by_id(b), Some("b"));
        assert!(reg.get(0).is_none());
    }

    #[test]
    fn builtin_buffers_register() {
        let mut reg = BufferRegistry::new();
        let mut engines = Vec::new();
        register_builtin(&mut reg, &mut engines);
        assert!(reg.id_by_name(BUFFER_HTTP_URI).is_some());
        assert!(reg.is_multi_instance(reg.id_by_name(BUFFER_FILE_NAME).expect("registered")));
        assert!(!engines.is_empty());
    }

    #[test]
    fn hook_lists_cover_builtin_hooks() {
        let mut reg = BufferRegistry::new();
        let mut engines = Vec::new();
        register_app_hook_lists(&mut reg, &mut engines);
        let list = reg.id_by_name("dns:request_complete:generic").expect("registered");
        let engine = engines
            .iter()
            .find(|e| e.sm_list == list)
            .expect("engine registered with the list");
        assert_eq!(engine.alproto, AppProto::Dns);
        assert_eq!(engine.progress, 1);
        assert!(reg.id_by_name("http:request_line:generic").is_some());
    }
}
