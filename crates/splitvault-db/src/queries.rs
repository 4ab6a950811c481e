//! Database query functions organized by domain.

pub mod events;
pub mod state;
