//! Utility modules for Newsprint Fetch
//!
//! This module contains helpers shared by the pipeline stages:
//! - `files`: Local name derivation, directory snapshots and cleanup
//! - `images`: Resize, crop and JPEG encoding
//! - `http`: HTTP client and streaming downloads

pub mod files;
pub mod http;
pub mod images;
