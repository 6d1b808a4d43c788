//! Intervention builders. Each submodule builds one kind of intervention and the campaign event
//! that distributes it; `common` holds the event wrappers they share.
pub mod carrier_clear;
pub mod common;
pub mod outbreak;
pub mod utils;
