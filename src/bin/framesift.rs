//! Frame curation CLI tool
//!
//! Extracts every Nth frame from one video or a directory of videos, then
//! deletes blurry and near-duplicate frames.

#[cfg(feature = "cli")]
use framesift::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> std::process::ExitCode {
    match cli::main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::ExitCode::FAILURE
        },
    }
}

#[cfg(not(feature = "cli"))]
fn main() -> std::process::ExitCode {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::ExitCode::FAILURE
}
