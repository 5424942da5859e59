/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `clubs`: Club creation and management endpoints
/// - `licenses`: License creation and lifecycle endpoints

pub mod clubs;
pub mod health;
pub mod licenses;
