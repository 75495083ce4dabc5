//! Device access: android through adb, iOS through usbmux

pub mod android;
pub mod gateway;
pub mod handle;
pub mod ios;
pub mod model;
pub mod shell;
