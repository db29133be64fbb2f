//! Subscription Service - plan catalog, subscription lifecycle, billing
//! previews, usage tracking and lifecycle sweeps for a multi-tenant platform.

pub mod config;
pub mod dtos;
pub mod models;
pub mod services;
pub mod startup;
