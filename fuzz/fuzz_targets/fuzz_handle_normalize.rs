#![no_main]

use libfuzzer_sys::fuzz_target;

use sentient_race::avatar::{Handle, MAX_HANDLE_LEN};

fuzz_target!(|data: &str| {
    let handle = Handle::normalize(data);
    let s = handle.as_str();

    assert!(s.chars().count() <= MAX_HANDLE_LEN);
    assert!(s
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-')));
    assert_eq!(Handle::normalize(s), handle);
});
