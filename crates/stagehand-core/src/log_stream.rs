//! App log stream emission.

use crate::Guid;

/// Emits operator- and user-visible app events onto the external log
/// stream, keyed by the owning record's guid. Fire-and-forget.
pub trait AppLogEmitter: Send + Sync {
    fn emit_error(&self, guid: &Guid, message: &str);
}
