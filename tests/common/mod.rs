//! Common test utilities for dvrip-dl integration tests

#[allow(dead_code)]
pub mod fake_camera;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use fake_camera::*;
#[allow(unused_imports)]
pub use fixtures::*;
