pub mod assessments;
pub mod backup;
pub mod core;
pub mod entities;
pub mod entries;
pub mod logic;
pub mod reports;
pub mod search;
pub mod setup;
