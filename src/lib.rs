//! Media playback observation for documents, relayed to native messaging hosts.
//!
//! The page side ([`page`], [`observer`]) watches a [`dom::Dom`] and reports
//! change-sets for the page and each media or script node in it. The
//! coordinator side ([`relay`]) batches those reports across pages, sends
//! them to native hosts, and keeps pages in step with their tabs.

pub mod config;
pub mod dom;
pub mod error;
pub mod ids;
pub mod observer;
pub mod page;
pub mod protocol;
pub mod relay;
pub mod scenario;
