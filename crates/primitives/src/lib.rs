//! This crate contains the data model shared by every other crate in the watchtower workspace:
//! locators, appointments and their identifiers.
//!
//! It lies at the bottom of the crate-hierarchy in this workspace i.e., it does not depend on any
//! other crate in this workspace.

pub mod appointment;
pub mod errors;
pub mod locator;
pub mod types;
