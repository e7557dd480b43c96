//! Common code shared between `detect_server` and `snap_sender`.
pub mod protocol;
