#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing may fail but must never panic
    if let Ok(ds) = particle_bridge::star::StarDataset::parse(text, Path::new("fuzz.star")) {
        let _ = ds.dangling_group_refs();
        let _ = particle_bridge::dataset::Dataset::identity_keys(
            &ds,
            particle_bridge::identity::IdentityRule::BASENAME,
        );
        let _ = ds.to_star_string();
    }
});
