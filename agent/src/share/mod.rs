//! Share-link resolution for the third-party app distribution service

pub mod manifest;
pub mod markers;
pub mod protocol;
pub mod signature;

pub use protocol::ShareLinkResolver;
