// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "antiraid/mod.rs"]
pub mod antiraid;
