//! Upstream Gateway (spec §4.8): the HTTP and stdio frontends. Both share
//! the one [`crate::dispatcher::dispatch`] entry point and register their
//! outbound sinks with the Hub's [`crate::relay::NotificationRelay`] (spec
//! §4.6's two-sink design) so downstream notifications reach whichever
//! surface is attached.

pub mod http;
pub mod stdio;
