//! Session id extraction from the handshake cookie.
//!
//! The HTTP layer signs its session cookie as
//! `connect.sid=s%3A<id>.<signature>`; only `<id>` is used for lookups.

const SESSION_FIELD: &str = "connect.sid=s%3A";

/// Returns the session id carried by `header`, if the field is present and
/// well formed (non-empty id followed by a `.` and the signature).
///
/// Only a whole cookie named `connect.sid` counts; `xconnect.sid=...` does not.
pub fn session_id(header: &str) -> Option<&str> {
    let value = header
        .split(';')
        .map(str::trim_start)
        .find_map(|pair| pair.strip_prefix(SESSION_FIELD))?;
    let (id, _signature) = value.split_once('.')?;

    if id.is_empty() { None } else { Some(id) }
}
