// ABOUTME: assemble-diff binary
// ABOUTME: Exit 0 on success, 2 on any error

use std::process::ExitCode;

use osm_changefeed::commands::{self, assemble_diff};

#[tokio::main]
async fn main() -> ExitCode {
    let args: assemble_diff::AssembleDiffArgs = match commands::parse_args(2) {
        Ok(args) => args,
        Err(code) => return code,
    };
    args.common.init_logging();

    match assemble_diff::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::report(&e);
            ExitCode::from(2)
        }
    }
}
