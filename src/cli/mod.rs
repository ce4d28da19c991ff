pub mod classify;
pub mod generate;

use std::path::Path;
use std::process;

use kforge::mechanism::Mechanism;

/// Unwrap a library result or exit with its message.
pub fn or_exit<T>(result: kforge::Result<T>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

pub fn load_mechanism(input: &Path) -> Mechanism {
    match Mechanism::load(input) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: cannot load '{}': {}", input.display(), e);
            process::exit(1);
        }
    }
}
