// Discord adapters for the anti-raid core.

pub mod commands;
pub mod events;
pub mod formatter;
pub mod gateway;
