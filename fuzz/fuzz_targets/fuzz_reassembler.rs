//! Fuzz target: `ReportReassembler::fix_out_of_order_chunks`
//!
//! Any bytes that pass the layout checks are run through the packet
//! reorder search.  It must never panic, and a report it claims to have
//! fixed must verify.
//!
//! cargo fuzz run fuzz_reassembler

#![no_main]

use iotile_ble::reports::ReportReassembler;
use iotile_ble::signature;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut fixer) = ReportReassembler::new(data.to_vec()) else {
        return;
    };
    if fixer.fix_out_of_order_chunks() {
        let fixed = fixer.into_fixed_report();
        assert!(fixed.is_some_and(|raw| raw.len() == data.len() && signature::verify_trailing(&raw)));
    }
});
