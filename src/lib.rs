//! Rental Operations API Library
//!
//! This library provides the core functionality for the rental operations API:
//! business records, equipment inventory, SMS notifications (Twilio), card
//! payments (Stripe) and AI-assisted business profiles (Anthropic).
//!
//! # Modules
//!
//! - `api`: API-layer namespace (handlers and router).
//! - `core`: Domain-layer namespace (dispatch, templates, errors, models).
//! - `data`: Data access namespace (stores and database pool).
//! - `integrations`: External service integrations.
//! - `analysis`: Website analysis and profile generation.
//! - `business_store`: Business record storage.
//! - `config`: Configuration management.
//! - `db`: Database connection and migrations.
//! - `dispatch`: Paced bulk SMS dispatch.
//! - `equipment_store`: Equipment inventory storage.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and shared state.
//! - `models`: Business and equipment data models.
//! - `notification_handler`: SMS notification endpoints.
//! - `notification_models`: SMS request/response models.
//! - `payment_handler`: Payment intent and webhook endpoints.
//! - `payment_models`: Payment request/response and event models.
//! - `payments`: Stripe client and webhook verification.
//! - `routes`: Router assembly.
//! - `sms`: Twilio transport.
//! - `templates`: Notification message templates.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

// Re-export primary modules for shared use in tests and the binary
pub mod analysis;
pub mod business_store;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod equipment_store;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notification_handler;
pub mod notification_models;
pub mod payment_handler;
pub mod payment_models;
pub mod payments;
pub mod routes;
pub mod sms;
pub mod templates;
