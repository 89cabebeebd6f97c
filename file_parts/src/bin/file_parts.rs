use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use error_printer::ErrorPrinter;
use file_parts::app::FilePartsApp;

fn main() -> Result<ExitCode> {
    let app = FilePartsApp::parse();
    app.init_logging();

    let complete = app.run().log_error("file-parts failed")?;

    Ok(if complete { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
