#![no_main]

use libfuzzer_sys::fuzz_target;

use sentient_race::avatar::{rewrite_size, SizeToken};

fuzz_target!(|data: &str| {
    // The regex and URL parser must never panic or hang on hostile input.
    for size in SizeToken::ALL {
        let rewritten = rewrite_size(data, size);
        let _ = rewrite_size(&rewritten, SizeToken::Original);
    }
});
