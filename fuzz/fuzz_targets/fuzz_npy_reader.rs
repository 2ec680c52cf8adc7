#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Header parsing and record decoding must fail gracefully
    if let Ok(array) = particle_bridge::cs::StructuredArray::from_reader(data) {
        let names: Vec<String> = array
            .layout()
            .fields()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        for name in names {
            let _ = array.field_text(&name);
        }
        let mut buf = Vec::new();
        let _ = array.to_writer(&mut buf);
    }
});
