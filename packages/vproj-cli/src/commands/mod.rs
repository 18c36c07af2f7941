pub mod filter;
pub mod project;

use vproj_rs::VprojError;

/// Report a failed run on stderr and pick its exit code.
fn fail(err: &VprojError) -> i32 {
    eprintln!("Error: {}", err);
    err.exit_code()
}
