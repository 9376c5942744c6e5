//! Process exit codes of the `pi` binary.

use pi_core::DataError;

pub const SUCCESS: i32 = 0;
pub const FAILED: i32 = 1; // Operation ran and failed
pub const CONFIG_ERROR: i32 = 2;

/// Data layer errors carry their own code; anything else failed during setup.
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<DataError>() {
        Some(data) => data.exit_code(),
        None => CONFIG_ERROR,
    }
}
