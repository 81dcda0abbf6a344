// Core anti-raid module - velocity/mention detection and incident response.
// Following the same pattern as the other core modules.

pub mod antiraid_models;
pub mod antiraid_service;
pub mod guard_policy;
pub mod incident_responder;
pub mod mention_counter;
pub mod raid_detector;
pub mod window_tracker;

pub use antiraid_models::*;
pub use antiraid_service::*;
pub use incident_responder::{ActionError, Messaging, ModerationActions};
