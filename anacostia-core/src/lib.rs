//! Anacostia Core
//!
//! Core types and abstractions for the Anacostia pipeline system.
//!
//! This crate contains:
//! - Domain types: Core business entities (nodes, runs, artifacts, metrics, signals)
//! - DTOs: Data transfer objects for the connector protocol and RPC surface

pub mod domain;
pub mod dto;
