//! adboard - Local-first classified ads with a category tree

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = adboard::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
