// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use libfuzzer_sys::fuzz_target;

use emotiscope::pipeline::{allowed_file, safe_base_name, secure_filename};

fuzz_target!(|filename: &str| {
    let secured = secure_filename(filename);
    assert!(!secured.contains(['/', '\\', '\0']));
    assert!(!secured.starts_with('.'));

    let allowed: Vec<String> = ["png", "jpg", "jpeg"].iter().map(|e| e.to_string()).collect();
    if let Some(extension) = allowed_file(filename, &allowed) {
        let base = safe_base_name(filename, &extension);
        assert!(!base.contains(['/', '\\']));
        assert!(base.to_lowercase().ends_with(&format!(".{}", extension)));
    }
});
