//! KYC Wizard — state and verification engine for company onboarding.

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
