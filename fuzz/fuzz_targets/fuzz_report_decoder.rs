//! Fuzz target: `ReportDecoder::push_data`
//!
//! Splits arbitrary bytes into notification-sized chunks (the first byte
//! picks the chunk size) and feeds them to a fixed-size decoder.  The
//! decoder must never panic, must stay broken once it reports an error,
//! and must accept data again after a reset.
//!
//! cargo fuzz run fuzz_report_decoder

#![no_main]

use iotile_ble::ReportDecoder;
use iotile_ble::error::DecodeError;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, body)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(split % 64) + 1;
    let mut decoder = ReportDecoder::new(256, false);

    let mut broken = false;
    for piece in body.chunks(chunk) {
        match decoder.push_data(piece) {
            Ok(reports) => {
                assert!(!broken, "decoder produced reports after an error");
                for report in reports {
                    assert!(report.readings().len() <= usize::from(u16::MAX) / 16);
                }
            }
            Err(DecodeError::Stopped) => assert!(broken || decoder.is_broken()),
            Err(DecodeError::InsufficientSpace { .. }) => {}
            Err(DecodeError::UnrecoverableParse(_)) => broken = true,
        }
        let _ = decoder.pop_last_event();
    }

    decoder.reset();
    assert!(!decoder.is_broken());
    assert_eq!(decoder.buffered(), 0);
});
