//! Floodgate - In-process Admission Control
//!
//! This crate decides, for each incoming unit of work, whether it may
//! proceed now or must be rejected. It provides three interchangeable
//! limiters (fixed-window counter, leaky bucket, token bucket) behind a
//! shared [`AdmissionPolicy`](ratelimit::AdmissionPolicy) contract, a
//! registry that owns one limiter per resource and caller key, and a gRPC
//! service exposing those decisions.

pub mod config;
pub mod error;
pub mod grpc;
pub mod ratelimit;
