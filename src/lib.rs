//! Applies Red Faction Guerrilla mods: XML tree merges into files inside
//! `.vpp_pc` archives, user-selectable options, and provenance-tracked
//! backups of every game file a mod touches.

pub mod archive;
pub mod backup;
pub mod config;
pub mod error;
pub mod game;
pub mod install;
pub mod known;
pub mod merge;
pub mod modinfo;
pub mod operations;
pub mod options;
pub mod package;
pub mod target;
pub mod user_input;
pub mod xml;

pub use error::{Error, Result};
