//! Settings command implementation.

use tally_codec::DEFAULT_SETTINGS;

/// Prints every declared setting key with its default.
pub fn run() {
    for def in DEFAULT_SETTINGS {
        let default = if def.default.is_empty() {
            "(empty)"
        } else {
            def.default
        };
        let note = if def.ghost { "  [not exported]" } else { "" };
        println!("{:<44} {default}{note}", def.key);
    }
}
