//! Data models for the Convivencia discipline-tracking backend.
//!
//! These models match the frontend TypeScript interfaces exactly for seamless interoperability.

mod caso;
mod falta;
mod school;
mod sync;

pub use caso::*;
pub use falta::*;
pub use school::*;
pub use sync::*;
