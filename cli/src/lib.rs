//! A3S Manifest CLI - build and push multi-platform manifest lists.

pub mod commands;
pub mod output;
