//! Camup Core Library
//!
//! Camera uploads tracking: configuration, media discovery, reconciliation
//! against the record store, and upload outcome reporting.

pub mod config;
pub mod cipher;
pub mod media;
pub mod fingerprint;
pub mod mapper;
pub mod repository;
pub mod reconciler;
pub mod transport;
pub mod colored_logger;
