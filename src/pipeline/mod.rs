pub mod drafting;
pub mod audit;
pub mod inference;
pub mod diagnostic; // Error-context artifact written on every failed generation
pub mod image_gate;
pub mod image_prep;
