//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! through a [`Session`](iotile_ble::Session) wired to a scripted mock
//! device.  Everything runs on the host; no radio required.

mod mock_channel;
mod rpc_pipeline_tests;
mod streaming_tests;
